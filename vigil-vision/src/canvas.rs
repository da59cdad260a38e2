use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};

/// Text placed on the canvas. Glyphs are not rasterised; callers read these back.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

/// Transparent RGBA overlay buffer.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
    captions: Vec<Caption>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            captions: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Reallocates the pixel buffer; contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
        self.captions.clear();
    }

    pub fn clear(&mut self) {
        self.image.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        self.captions.clear();
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn captions(&self) -> &[Caption] {
        &self.captions
    }

    /// Source-over blend of a single pixel; out-of-bounds writes are ignored.
    fn blend(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return;
        }
        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let a = color[3] as f32 / 255.0;
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = a + dst_a * (1.0 - a);
        if out_a <= 0.0 {
            return;
        }
        for c in 0..3 {
            let v = (color[c] as f32 * a + dst[c] as f32 * dst_a * (1.0 - a)) / out_a;
            dst[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        let x0 = (x.floor() as i64).clamp(0, w as i64);
        let y0 = (y.floor() as i64).clamp(0, h as i64);
        let x1 = ((x + width).ceil() as i64).clamp(0, w as i64);
        let y1 = ((y + height).ceil() as i64).clamp(0, h as i64);
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend(px, py, color);
            }
        }
    }

    /// Rectangle outline whose stroke grows inward from the given edge.
    pub fn stroke_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        line_width: u32,
        color: Rgba<u8>,
    ) {
        let lw = line_width.max(1) as f32;
        let lw_x = lw.min(width / 2.0).max(0.0);
        let lw_y = lw.min(height / 2.0).max(0.0);
        self.fill_rect(x, y, width, lw_y, color);
        self.fill_rect(x, y + height - lw_y, width, lw_y, color);
        self.fill_rect(x, y + lw_y, lw_x, height - 2.0 * lw_y, color);
        self.fill_rect(x + width - lw_x, y + lw_y, lw_x, height - 2.0 * lw_y, color);
    }

    pub fn caption(&mut self, x: f32, y: f32, text: &str) {
        self.captions.push(Caption {
            x: x.round() as i32,
            y: y.round() as i32,
            text: text.to_string(),
        });
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("writing overlay to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    #[test]
    fn test_stroke_rect_outline_only() {
        let mut canvas = Canvas::new(20, 20);
        canvas.stroke_rect(2.0, 2.0, 10.0, 10.0, 1, GREEN);
        assert_eq!(canvas.image().get_pixel(2, 2), &GREEN);
        assert_eq!(canvas.image().get_pixel(11, 11), &GREEN);
        assert_eq!(canvas.image().get_pixel(6, 6)[3], 0);
        assert_eq!(canvas.image().get_pixel(12, 12)[3], 0);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut canvas = Canvas::new(8, 8);
        canvas.fill_rect(0.0, 0.0, 8.0, 8.0, GREEN);
        canvas.caption(1.0, 1.0, "alice (0.31)");
        canvas.clear();
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
        assert!(canvas.captions().is_empty());

        canvas.resize(16, 4);
        assert_eq!(canvas.dimensions(), (16, 4));
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(-10.0, -10.0, 100.0, 100.0, Rgba([0, 255, 0, 128]));
        assert!(canvas.image().pixels().all(|p| p[1] == 255 && p[3] == 128));
    }

    #[test]
    fn test_huge_rect_touches_only_the_canvas() {
        let mut canvas = Canvas::new(4, 4);
        canvas.fill_rect(-1.0e9, -1.0e9, 2.0e9, 2.0e9, GREEN);
        assert!(canvas.image().pixels().all(|p| *p == GREEN));

        canvas.clear();
        canvas.fill_rect(1.0e9, 1.0e9, 1.0e9, 1.0e9, GREEN);
        canvas.stroke_rect(-5.0e8, 2.0, 1.0e9, 1.0e9, 1, GREEN);
        assert!(canvas.image().pixels().all(|p| p[3] == 0 || *p == GREEN));
        assert_eq!(canvas.image().get_pixel(0, 0)[3], 0);
    }
}
