//! Coordinate-space tagged points
//!
//! Every point in the engine belongs to exactly one of two spaces:
//! - Image space: pixel coordinates of the original, unscaled photo
//! - Viewport space: pixel coordinates of the rendering surface as currently
//!   zoomed and panned
//!
//! The two spaces are separate types. The only way to move a point from one
//! space to the other is through [`crate::transform::Viewport`].

use serde::{Deserialize, Serialize};

/// Point in image space (pixels of the unscaled photo)
///
/// Origin (0, 0) is the top-left corner of the image, X grows to the right
/// and Y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    /// Create a new image-space point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another image-space point
    pub fn distance_to(&self, other: &ImagePoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Midpoint between two image-space points
    pub fn midpoint(&self, other: &ImagePoint) -> ImagePoint {
        ImagePoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Offset this point by a delta in image pixels
    pub fn offset(&self, dx: f64, dy: f64) -> ImagePoint {
        ImagePoint::new(self.x + dx, self.y + dy)
    }

    /// Whether both components are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Point in viewport space (pixels of the rendering surface)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewportPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewportPoint {
    /// Create a new viewport-space point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another viewport-space point
    pub fn distance_to(&self, other: &ViewportPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Midpoint between two viewport-space points
    pub fn midpoint(&self, other: &ViewportPoint) -> ViewportPoint {
        ViewportPoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Normalized image-fraction coordinate in [0, 1] as produced by landmark
/// detectors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whether the point lies inside the unit square
    pub fn is_in_bounds(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Scale to image pixels for an image of the given size
    pub fn to_image(&self, image_width: f64, image_height: f64) -> ImagePoint {
        ImagePoint::new(self.x * image_width, self.y * image_height)
    }
}
