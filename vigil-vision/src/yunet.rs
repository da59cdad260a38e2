//! YuNet post-processing.
//!
//! The 2023mar export emits twelve tensors, four heads per stride in the order
//! cls(8,16,32), obj(8,16,32), bbox(8,16,32), kps(8,16,32). Each head has shape
//! `[1, H*W, C]` where `H = W = input_size / stride`.
//!
//! Decoding follows the OpenCV reference:
//! - score = sqrt(clamp(cls) * clamp(obj))
//! - cx = (col + dx) * stride, cy = (row + dy) * stride
//! - w = exp(dw) * stride, h = exp(dh) * stride
//! - landmark = (col + lx) * stride, (row + ly) * stride

use anyhow::{bail, Result};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A decoded face in input-canvas pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

type Output<'a> = (&'a [i64], &'a [f32]);

fn head<'a>(
    outputs: &[Output<'a>],
    index: usize,
    cells: usize,
    channels: i64,
) -> Result<&'a [f32]> {
    let Some(&(shape, data)) = outputs.get(index) else {
        bail!("missing yunet output {}", index);
    };
    if shape.len() != 3 || shape[0] != 1 || shape[1] as usize != cells || shape[2] != channels {
        bail!(
            "yunet output {} has shape {:?}, expected [1, {}, {}]",
            index,
            shape,
            cells,
            channels
        );
    }
    Ok(data)
}

pub fn decode(
    outputs: &[Output<'_>],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<RawDetection>> {
    if outputs.len() != 12 {
        bail!("yunet produced {} outputs, expected 12", outputs.len());
    }

    let mut detections = Vec::new();
    for (level, &stride) in STRIDES.iter().enumerate() {
        let cols = input_size / stride;
        let cells = cols * cols;
        let cls = head(outputs, level, cells, 1)?;
        let obj = head(outputs, level + 3, cells, 1)?;
        let bbox = head(outputs, level + 6, cells, 4)?;
        let kps = head(outputs, level + 9, cells, 10)?;
        let s = stride as f32;

        for idx in 0..cells {
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            if score < score_threshold {
                continue;
            }
            let row = (idx / cols) as f32;
            let col = (idx % cols) as f32;

            let b = &bbox[idx * 4..idx * 4 + 4];
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;

            let mut landmarks = [0.0f32; 10];
            for (k, pair) in kps[idx * 10..idx * 10 + 10].chunks_exact(2).enumerate() {
                landmarks[k * 2] = (col + pair[0]) * s;
                landmarks[k * 2 + 1] = (row + pair[1]) * s;
            }

            detections.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    Ok(detections)
}
