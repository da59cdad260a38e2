use crate::yunet;
use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// YuNet input edge length.
pub const DETECTOR_INPUT: u32 = 640;
/// SFace input edge length.
pub const ENCODER_INPUT: u32 = 112;

/// Detection in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // eyes, nose tip, mouth corners
}

/// Placement of the source image inside the square detector input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }
}

fn letterbox(img: &DynamicImage, size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = size as f32 / w.max(h).max(1) as f32;
    let new_w = ((w as f32 * scale) as u32).clamp(1, size);
    let new_h = ((h as f32 * scale) as u32).clamp(1, size);
    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle).to_rgb8();

    let mut canvas = RgbImage::new(size, size);
    let offset_x = (size - new_w) / 2;
    let offset_y = (size - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Planar BGR tensor `[1, 3, H, W]` with values in [0, 255].
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Run YuNet over an image of any size.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, placement) = letterbox(img, DETECTOR_INPUT);
    let input = Value::from_array(bgr_tensor(&canvas)?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::with_capacity(outputs.len());
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = tensors
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let raw = yunet::decode(&refs, DETECTOR_INPUT as usize, score_threshold)
        .context("decoding detector output")?;

    let detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let (x, y) = placement.to_source(d.bbox[0], d.bbox[1]);
            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                let (lx, ly) = placement.to_source(d.landmarks[k * 2], d.landmarks[k * 2 + 1]);
                landmarks[k * 2] = lx;
                landmarks[k * 2 + 1] = ly;
            }
            Detection {
                bbox: [
                    x,
                    y,
                    d.bbox[2] / placement.scale,
                    d.bbox[3] / placement.scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    Ok(nms(&detections, nms_threshold))
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let corners = [
        (img.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (img.get_pixel(x1, y0), fx * (1.0 - fy)),
        (img.get_pixel(x0, y1), (1.0 - fx) * fy),
        (img.get_pixel(x1, y1), fx * fy),
    ];
    let mut out = [0.0f32; 3];
    for (px, weight) in corners {
        for c in 0..3 {
            out[c] += px[c] as f32 * weight;
        }
    }
    Some(Rgb(out.map(|v| v.round().clamp(0.0, 255.0) as u8)))
}

/// Rotate, scale and crop so the eyes land on the ArcFace reference points.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<RgbImage> {
    const REF_LEFT_EYE: (f32, f32) = (38.2946, 51.6963);
    const REF_RIGHT_EYE: (f32, f32) = (73.5318, 51.5014);

    let src = img.to_rgb8();
    let k = size as f32 / ENCODER_INPUT as f32;
    let (lx, ly) = (detection.landmarks[0], detection.landmarks[1]);
    let (rx, ry) = (detection.landmarks[2], detection.landmarks[3]);

    let eye_dist = ((rx - lx).powi(2) + (ry - ly).powi(2)).sqrt();
    if eye_dist < f32::EPSILON {
        anyhow::bail!("degenerate landmarks, eyes coincide");
    }
    let ref_dist = (REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).hypot(REF_RIGHT_EYE.1 - REF_LEFT_EYE.1) * k;
    let angle = (ry - ly).atan2(rx - lx);
    let scale = ref_dist / eye_dist;

    let src_center = ((lx + rx) / 2.0, (ly + ry) / 2.0);
    let dst_center = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * k,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * k,
    );
    let (sin, cos) = angle.sin_cos();

    // inverse mapping: output pixel -> source pixel
    let mut out = RgbImage::new(size, size);
    for (ox, oy, px) in out.enumerate_pixels_mut() {
        let dx = (ox as f32 - dst_center.0) / scale;
        let dy = (oy as f32 - dst_center.1) / scale;
        let sx = src_center.0 + dx * cos - dy * sin;
        let sy = src_center.1 + dx * sin + dy * cos;
        if let Some(sampled) = sample_bilinear(&src, sx, sy) {
            *px = sampled;
        }
    }
    Ok(out)
}

/// Encode an aligned face with SFace into an L2-normalised descriptor.
pub fn encode_face(session: &mut Session, face: &RgbImage) -> Result<Vec<f32>> {
    let face = if face.dimensions() == (ENCODER_INPUT, ENCODER_INPUT) {
        face.clone()
    } else {
        image::imageops::resize(face, ENCODER_INPUT, ENCODER_INPUT, FilterType::Triangle)
    };
    let input = Value::from_array(bgr_tensor(&face)?)?;
    let outputs = session.run(ort::inputs![input])?;
    let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    let mut descriptor = data.to_vec();
    let norm = descriptor.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        descriptor.iter_mut().for_each(|x| *x /= norm);
    }
    Ok(descriptor)
}
