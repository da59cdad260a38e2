#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use vigil::{
    BoundingBox, BoxStyle, DetectOptions, DetectionResult, FaceInference, Frame, PlaybackState,
    ReferenceFace, Size, Surface, VideoSource,
};

/// Video source whose geometry and playback state tests can change at will.
pub struct FakeVideo {
    state: Mutex<(Size, Size, PlaybackState)>,
}

impl FakeVideo {
    pub fn new(display: Size, native: Size) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((display, native, PlaybackState::Playing)),
        })
    }

    pub fn set_display(&self, size: Size) {
        self.state.lock().unwrap().0 = size;
    }

    pub fn set_native(&self, size: Size) {
        self.state.lock().unwrap().1 = size;
    }

    pub fn set_playback(&self, playback: PlaybackState) {
        self.state.lock().unwrap().2 = playback;
    }
}

impl VideoSource for FakeVideo {
    fn display_size(&self) -> Size {
        self.state.lock().unwrap().0
    }

    fn native_size(&self) -> Size {
        self.state.lock().unwrap().1
    }

    fn playback_state(&self) -> PlaybackState {
        self.state.lock().unwrap().2
    }

    fn current_frame(&self) -> Option<Frame> {
        let native = self.native_size();
        Some(RgbImage::new(native.width, native.height))
    }
}

/// Inference double. Live frames take `delay` and return `results`; reference
/// images are identified by the colour of their top-left pixel.
pub struct FakeInference {
    delay: Duration,
    results: Mutex<Vec<DetectionResult>>,
    fail: Mutex<bool>,
    references: HashMap<[u8; 3], (Vec<f32>, usize)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeInference {
    pub fn new(delay: Duration, results: Vec<DetectionResult>) -> Self {
        Self {
            delay,
            results: Mutex::new(results),
            fail: Mutex::new(false),
            references: HashMap::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Reference photos filled with `color` yield `descriptor`, seen among
    /// `faces` faces.
    pub fn with_reference(mut self, color: [u8; 3], descriptor: Vec<f32>, faces: usize) -> Self {
        self.references.insert(color, (descriptor, faces));
        self
    }

    pub fn set_results(&self, results: Vec<DetectionResult>) {
        *self.results.lock().unwrap() = results;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the call is aborted.
struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FaceInference for FakeInference {
    async fn detect_all(
        &self,
        _frame: Frame,
        _options: DetectOptions,
    ) -> Result<Vec<DetectionResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _pending = Pending(&self.in_flight);
        tokio::time::sleep(self.delay).await;

        if *self.fail.lock().unwrap() {
            bail!("inference backend unavailable");
        }
        Ok(self.results.lock().unwrap().clone())
    }

    async fn detect_single(&self, image: DynamicImage) -> Result<Option<ReferenceFace>> {
        let rgb = image.to_rgb8();
        let Rgb(color) = *rgb.get_pixel(0, 0);
        Ok(self
            .references
            .get(&color)
            .map(|(descriptor, faces)| ReferenceFace {
                descriptor: descriptor.clone(),
                score: 0.95,
                faces_found: *faces,
            }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Resize(Size),
    Clear,
    Box(BoundingBox, String),
}

/// Surface that records every call.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    inner: Arc<Mutex<(Size, Vec<Op>)>>,
    explode: Arc<AtomicBool>,
}

impl RecordingSurface {
    /// The next `draw_box` panics instead of recording.
    pub fn panic_on_next_draw(&self) {
        self.explode.store(true, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.inner.lock().unwrap().1.clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut self.inner.lock().unwrap().1)
    }

    pub fn boxes(&self) -> Vec<(BoundingBox, String)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Box(b, l) => Some((b, l)),
                _ => None,
            })
            .collect()
    }

    pub fn last_op(&self) -> Option<Op> {
        self.inner.lock().unwrap().1.last().cloned()
    }

    pub fn current_size(&self) -> Size {
        self.inner.lock().unwrap().0
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Size {
        self.inner.lock().unwrap().0
    }

    fn resize(&mut self, size: Size) {
        let mut inner = self.inner.lock().unwrap();
        inner.0 = size;
        inner.1.push(Op::Resize(size));
    }

    fn clear(&mut self) {
        self.inner.lock().unwrap().1.push(Op::Clear);
    }

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, _style: &BoxStyle) {
        if self.explode.swap(false, Ordering::SeqCst) {
            panic!("surface went away mid-draw");
        }
        self.inner
            .lock()
            .unwrap()
            .1
            .push(Op::Box(*bbox, label.to_string()));
    }
}

pub fn face_at(x: f32, y: f32, w: f32, h: f32, score: f32) -> DetectionResult {
    DetectionResult {
        bbox: BoundingBox {
            x,
            y,
            width: w,
            height: h,
        },
        score,
        descriptor: None,
        landmarks: Vec::new(),
    }
}

/// PNG bytes of a small image filled with `color`.
pub fn png(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}
