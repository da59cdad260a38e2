//! Keeps the drawing surface matched to the video's layout box.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::Rgba;
use log::debug;

use crate::geometry::{BoundingBox, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStyle {
    pub color: Rgba<u8>,
    pub line_width: u32,
    pub font_size: u32,
    pub label_padding: u32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            color: Rgba([0, 255, 0, 128]),
            line_width: 1,
            font_size: 10,
            label_padding: 2,
        }
    }
}

/// A 2D surface sized in display pixels.
pub trait Surface: Send {
    fn size(&self) -> Size;
    /// Reallocate the backing store; contents are lost.
    fn resize(&mut self, size: Size);
    fn clear(&mut self);
    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, style: &BoxStyle);
}

/// Shared handle to one surface. Every clone draws onto the same target, so
/// the owner keeps its surface whatever happens to the session drawing on it.
#[derive(Clone)]
pub struct SurfaceSlot(Arc<Mutex<Box<dyn Surface>>>);

impl SurfaceSlot {
    pub fn new(surface: Box<dyn Surface>) -> Self {
        Self(Arc::new(Mutex::new(surface)))
    }

    // a panic mid-draw leaves the surface usable; the next clear resets it
    fn lock(&self) -> MutexGuard<'_, Box<dyn Surface>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Surface for SurfaceSlot {
    fn size(&self) -> Size {
        self.lock().size()
    }

    fn resize(&mut self, size: Size) {
        self.lock().resize(size);
    }

    fn clear(&mut self) {
        self.lock().clear();
    }

    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, style: &BoxStyle) {
        self.lock().draw_box(bbox, label, style);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Boxes and labels for one tick, already in display coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub display: Size,
    pub items: Vec<OverlayItem>,
}

pub struct OverlayRenderer {
    surface: Box<dyn Surface>,
    synced: Option<Size>,
    style: BoxStyle,
}

impl OverlayRenderer {
    pub fn new(surface: Box<dyn Surface>) -> Self {
        Self::with_style(surface, BoxStyle::default())
    }

    pub fn with_style(surface: Box<dyn Surface>, style: BoxStyle) -> Self {
        Self {
            surface,
            synced: None,
            style,
        }
    }

    /// Resynchronise the surface with the current display size.
    ///
    /// Returns `true` if the surface was resized. A zero-sized display leaves
    /// the renderer unsynced, which suppresses drawing.
    pub fn observe(&mut self, display: Size) -> bool {
        if self.synced == Some(display) {
            return false;
        }
        if display.is_empty() {
            self.surface.clear();
            self.synced = None;
            return false;
        }
        debug!("overlay resync {} -> {}", self.surface.size(), display);
        self.surface.resize(display);
        self.surface.clear();
        self.synced = Some(display);
        true
    }

    pub fn synced_size(&self) -> Option<Size> {
        self.synced
    }

    /// Clear and paint `frame`. Skipped unless the surface is synced to the
    /// display size the frame was scaled for.
    pub fn draw(&mut self, frame: &OverlayFrame) -> bool {
        if self.synced != Some(frame.display) {
            debug!(
                "overlay draw suppressed: frame for {}, surface synced to {:?}",
                frame.display, self.synced
            );
            return false;
        }
        self.surface.clear();
        for item in &frame.items {
            self.surface.draw_box(&item.bbox, &item.label, &self.style);
        }
        true
    }

    pub fn clear(&mut self) {
        self.surface.clear();
    }
}
