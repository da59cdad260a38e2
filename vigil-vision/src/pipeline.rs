use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, ENCODER_INPUT};
use crate::model::{self, ModelPaths};

/// A detected face, optionally carrying its descriptor.
#[derive(Debug, Clone)]
pub struct Face {
    pub detection: Detection,
    pub descriptor: Option<Vec<f32>>,
}

/// Best face of a reference photo plus how many faces the detector saw.
#[derive(Debug, Clone)]
pub struct SingleFace {
    pub face: Face,
    pub faces_found: usize,
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    detector: Session,
    encoder: Session,
    nms_threshold: f32,
}

impl Pipeline {
    pub fn new(paths: &ModelPaths, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths)?,
            encoder: model::recog_session(paths)?,
            nms_threshold,
        })
    }

    fn describe(&mut self, img: &DynamicImage, detection: &Detection) -> Result<Vec<f32>> {
        let aligned = face::align_face(img, detection, ENCODER_INPUT).context("aligning face")?;
        face::encode_face(&mut self.encoder, &aligned).context("encoding face")
    }

    /// Every face in the image; descriptors are computed only on request.
    pub fn detect_all(
        &mut self,
        img: &DynamicImage,
        score_threshold: f32,
        with_descriptors: bool,
    ) -> Result<Vec<Face>> {
        let detections =
            face::detect_faces(&mut self.detector, img, score_threshold, self.nms_threshold)
                .context("detecting faces")?;

        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            let descriptor = if with_descriptors {
                match self.describe(img, &detection) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        log::debug!("no descriptor for face at {:?}: {:#}", detection.bbox, e);
                        None
                    }
                }
            } else {
                None
            };
            faces.push(Face {
                detection,
                descriptor,
            });
        }
        Ok(faces)
    }

    /// Highest-scoring face with its descriptor, or `None` when no face is found.
    pub fn detect_single(
        &mut self,
        img: &DynamicImage,
        score_threshold: f32,
    ) -> Result<Option<SingleFace>> {
        let detections =
            face::detect_faces(&mut self.detector, img, score_threshold, self.nms_threshold)
                .context("detecting faces")?;
        let faces_found = detections.len();

        // nms returns detections sorted by score
        let Some(best) = detections.into_iter().next() else {
            return Ok(None);
        };
        let descriptor = self.describe(img, &best)?;
        Ok(Some(SingleFace {
            face: Face {
                detection: best,
                descriptor: Some(descriptor),
            },
            faces_found,
        }))
    }
}
