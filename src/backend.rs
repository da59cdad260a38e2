//! Engine traits implemented on top of `vigil-vision`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, Rgba};
use vigil_vision::{Canvas, CameraFeed, Face, FeedStatus, ModelPaths, Pipeline};

use crate::config::DetectorConfig;
use crate::geometry::{BoundingBox, Point, Size};
use crate::inference::{DetectOptions, DetectionResult, FaceInference, Frame, ReferenceFace};
use crate::overlay::{BoxStyle, Surface};
use crate::video::{PlaybackState, VideoSource};

/// YuNet + SFace running on ONNX Runtime.
pub struct OnnxInference {
    pipeline: Arc<Mutex<Pipeline>>,
    score_threshold: f32,
}

impl OnnxInference {
    pub fn load(paths: &ModelPaths, detector: &DetectorConfig) -> Result<Self> {
        let missing = paths.missing();
        if !missing.is_empty() {
            anyhow::bail!("model files not found: {:?}", missing);
        }
        let pipeline = Pipeline::new(paths, detector.nms_threshold)
            .context("Failed to initialize face recognition pipeline")?;
        Ok(Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            score_threshold: detector.score_threshold,
        })
    }

    /// Run `f` against the pipeline on the blocking pool.
    async fn with_pipeline<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Pipeline) -> Result<T> + Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            let mut guard = pipeline
                .lock()
                .map_err(|_| anyhow!("inference pipeline poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("inference task")?
    }
}

fn to_result(face: Face, with_landmarks: bool) -> DetectionResult {
    let [x, y, width, height] = face.detection.bbox;
    let landmarks = if with_landmarks {
        face.detection
            .landmarks
            .chunks_exact(2)
            .map(|p| Point { x: p[0], y: p[1] })
            .collect()
    } else {
        Vec::new()
    };
    DetectionResult {
        bbox: BoundingBox {
            x,
            y,
            width,
            height,
        },
        score: face.detection.score,
        descriptor: face.descriptor,
        landmarks,
    }
}

#[async_trait]
impl FaceInference for OnnxInference {
    async fn detect_all(
        &self,
        frame: Frame,
        options: DetectOptions,
    ) -> Result<Vec<DetectionResult>> {
        let faces = self
            .with_pipeline(move |pipeline| {
                let img = DynamicImage::ImageRgb8(frame);
                pipeline.detect_all(&img, options.min_confidence, options.with_descriptors)
            })
            .await?;
        Ok(faces
            .into_iter()
            .map(|f| to_result(f, options.with_landmarks))
            .collect())
    }

    async fn detect_single(&self, image: DynamicImage) -> Result<Option<ReferenceFace>> {
        let score_threshold = self.score_threshold;
        let single = self
            .with_pipeline(move |pipeline| pipeline.detect_single(&image, score_threshold))
            .await?;
        Ok(single.and_then(|s| {
            let score = s.face.detection.score;
            s.face.descriptor.map(|descriptor| ReferenceFace {
                descriptor,
                score,
                faces_found: s.faces_found,
            })
        }))
    }
}

/// V4L2 camera shown in a fixed-size layout box.
pub struct CameraVideo {
    feed: CameraFeed,
    display: Mutex<Size>,
}

impl CameraVideo {
    pub fn open(device: &str, display: Size) -> Result<Self> {
        let feed =
            CameraFeed::start(device).with_context(|| format!("Failed to open camera {device}"))?;
        Ok(Self {
            feed,
            display: Mutex::new(display),
        })
    }

    /// Change the layout box; the overlay follows on its next tick.
    pub fn set_display_size(&self, size: Size) {
        if let Ok(mut display) = self.display.lock() {
            *display = size;
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.feed.set_paused(paused);
    }
}

impl VideoSource for CameraVideo {
    fn display_size(&self) -> Size {
        self.display.lock().map(|d| *d).unwrap_or_default()
    }

    fn native_size(&self) -> Size {
        let (width, height) = self.feed.dimensions();
        Size::new(width, height)
    }

    fn playback_state(&self) -> PlaybackState {
        match self.feed.status() {
            FeedStatus::Streaming => PlaybackState::Playing,
            FeedStatus::Paused => PlaybackState::Paused,
            FeedStatus::Stopped => PlaybackState::Ended,
        }
    }

    fn current_frame(&self) -> Option<Frame> {
        self.feed.latest_frame()
    }
}

/// Raster surface whose pixels stay readable while a session draws on it.
#[derive(Clone)]
pub struct SharedCanvas(Arc<Mutex<Canvas>>);

impl SharedCanvas {
    pub fn new(size: Size) -> Self {
        Self(Arc::new(Mutex::new(Canvas::new(size.width, size.height))))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let canvas = self
            .0
            .lock()
            .map_err(|_| anyhow!("overlay canvas poisoned"))?;
        canvas.save(path)
    }

    pub fn captions(&self) -> Vec<String> {
        self.0
            .lock()
            .map(|c| c.captions().iter().map(|c| c.text.clone()).collect())
            .unwrap_or_default()
    }
}

impl Surface for SharedCanvas {
    fn size(&self) -> Size {
        self.0
            .lock()
            .map(|c| {
                let (width, height) = c.dimensions();
                Size::new(width, height)
            })
            .unwrap_or_default()
    }

    fn resize(&mut self, size: Size) {
        if let Ok(mut canvas) = self.0.lock() {
            canvas.resize(size.width, size.height);
        }
    }

    fn clear(&mut self) {
        if let Ok(mut canvas) = self.0.lock() {
            canvas.clear();
        }
    }

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, style: &BoxStyle) {
        let Ok(mut canvas) = self.0.lock() else {
            return;
        };
        canvas.stroke_rect(
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
            style.line_width,
            style.color,
        );

        // label sits on a bar above the box, or inside it at the top edge
        let pad = style.label_padding as f32;
        let bar_h = style.font_size as f32 + 2.0 * pad;
        let bar_w = label.chars().count() as f32 * style.font_size as f32 * 0.6 + 2.0 * pad;
        let bar_y = if bbox.y >= bar_h { bbox.y - bar_h } else { bbox.y };
        canvas.fill_rect(bbox.x, bar_y, bar_w, bar_h, label_background(style.color));
        canvas.caption(bbox.x + pad, bar_y + pad, label);
    }
}

fn label_background(color: Rgba<u8>) -> Rgba<u8> {
    let Rgba([r, g, b, _]) = color;
    Rgba([r / 4, g / 4, b / 4, 160])
}
