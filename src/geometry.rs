use serde::{Deserialize, Serialize};

/// Pixel dimensions of a screen, sensor or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count, overflow-safe for any realistic sensor.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    /// The same dimensions with width and height swapped.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Aspect ratio normalized to larger/smaller, so portrait and landscape
    /// renditions of the same sensor compare equal.
    pub fn normalized_aspect_ratio(&self) -> f64 {
        let larger = self.width.max(self.height) as f64;
        let smaller = self.width.min(self.height).max(1) as f64;
        larger / smaller
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    /// A width x height rectangle centered inside `outer`.
    pub fn centered_in(outer: Size, width: u32, height: u32) -> Self {
        let left = (outer.width.saturating_sub(width) / 2) as i32;
        let top = (outer.height.saturating_sub(height) / 2) as i32;
        Self::new(left, top, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.left, self.top, self.width, self.height
        )
    }
}

/// Clockwise rotation of the display relative to the device's natural
/// orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayRotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl DisplayRotation {
    pub fn degrees(&self) -> u32 {
        match self {
            DisplayRotation::Deg0 => 0,
            DisplayRotation::Deg90 => 90,
            DisplayRotation::Deg180 => 180,
            DisplayRotation::Deg270 => 270,
        }
    }

    /// Accepts any multiple of 90, including negatives some displays report.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(DisplayRotation::Deg0),
            90 => Some(DisplayRotation::Deg90),
            180 => Some(DisplayRotation::Deg180),
            270 => Some(DisplayRotation::Deg270),
            _ => None,
        }
    }
}

/// Which way a camera sensor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Back,
    Front,
}
