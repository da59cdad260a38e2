use anyhow::Result;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};

use crate::geometry::{BoundingBox, Point, Scale};

/// Identity embedding of a single face.
pub type Descriptor = Vec<f32>;

/// A decoded video frame at native resolution.
pub type Frame = RgbImage;

/// One detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub bbox: BoundingBox,
    pub score: f32,
    pub descriptor: Option<Descriptor>,
    pub landmarks: Vec<Point>,
}

impl DetectionResult {
    pub fn scaled(&self, scale: &Scale) -> Self {
        Self {
            bbox: scale.bbox(self.bbox),
            score: self.score,
            descriptor: self.descriptor.clone(),
            landmarks: self.landmarks.iter().map(|p| scale.point(*p)).collect(),
        }
    }
}

/// Result of single-face extraction on a reference photo.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFace {
    pub descriptor: Descriptor,
    pub score: f32,
    /// Faces the detector saw; the descriptor belongs to the best one.
    pub faces_found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub min_confidence: f32,
    pub with_landmarks: bool,
    pub with_descriptors: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            with_landmarks: true,
            with_descriptors: true,
        }
    }
}

/// Face detection and recognition backend.
#[async_trait]
pub trait FaceInference: Send + Sync {
    /// All faces in a live frame, in native-frame coordinates.
    async fn detect_all(&self, frame: Frame, options: DetectOptions)
        -> Result<Vec<DetectionResult>>;

    /// At most one face with its descriptor. Consumes the decoded image.
    async fn detect_single(&self, image: DynamicImage) -> Result<Option<ReferenceFace>>;
}
