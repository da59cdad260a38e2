use std::fmt;

/// Pixel dimensions of a frame, a layout box or a drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-axis factors mapping one resolution onto another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Scale {
    /// `None` when `from` has a zero dimension.
    pub fn between(from: Size, to: Size) -> Option<Self> {
        if from.is_empty() {
            return None;
        }
        Some(Self {
            x: to.width as f32 / from.width as f32,
            y: to.height as f32 / from.height as f32,
        })
    }

    pub fn point(&self, p: Point) -> Point {
        Point {
            x: p.x * self.x,
            y: p.y * self.y,
        }
    }

    pub fn bbox(&self, b: BoundingBox) -> BoundingBox {
        BoundingBox {
            x: b.x * self.x,
            y: b.y * self.y,
            width: b.width * self.x,
            height: b.height * self.y,
        }
    }
}
