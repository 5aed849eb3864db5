use std::fmt;

/// Axis-aligned tile rectangle in the coordinate space of one raster.
///
/// `x0`/`y0` are inclusive, `x1`/`y1` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl TileRect {
    pub const fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rectangle of `width` x `height` with its top-left corner at `(x, y)`.
    pub const fn from_origin(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub const fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub const fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Midpoint as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (f64::from(self.x0) + f64::from(self.x1)) / 2.0,
            (f64::from(self.y0) + f64::from(self.y1)) / 2.0,
        )
    }

    /// Corners as `(x, y)` in the order top-left, top-right, bottom-right,
    /// bottom-left.
    pub const fn corners(&self) -> [(u32, u32); 4] {
        [
            (self.x0, self.y0),
            (self.x1, self.y0),
            (self.x1, self.y1),
            (self.x0, self.y1),
        ]
    }

    /// Whether pixel column `x`, row `y` lies inside the rectangle.
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

impl fmt::Display for TileRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})-({}, {})", self.x0, self.y0, self.x1, self.y1)
    }
}
