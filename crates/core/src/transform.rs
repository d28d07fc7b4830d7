//! Image ↔ viewport coordinate transform
//!
//! The viewport shows the photo scaled by a *fit scale* (largest scale at which
//! the whole image is contained in the container) multiplied by `zoom`. The
//! scaled image is centered in the container and then shifted by `pan`:
//!
//! ```text
//! viewport = (container / 2 + pan) + (image - image_size / 2) * fit * zoom
//! ```
//!
//! The fit scale is recomputed from the current container and image sizes on
//! every call, so resizing the container never leaves a stale transform. A
//! viewport whose container or image has no area yet is "not ready" and maps
//! points through unchanged.

use crate::geometry::{ImagePoint, ViewportPoint};
use serde::{Deserialize, Serialize};

/// Zoom/pan state of the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Multiplier relative to the fit scale
    pub zoom: f64,
    /// Horizontal offset in viewport pixels applied after centering
    pub pan_x: f64,
    /// Vertical offset in viewport pixels applied after centering
    pub pan_y: f64,
    /// Container width in viewport pixels
    pub width: f64,
    /// Container height in viewport pixels
    pub height: f64,
    /// Natural image width in pixels
    pub image_width: f64,
    /// Natural image height in pixels
    pub image_height: f64,
}

impl Viewport {
    /// Create a viewport at zoom 1 with no pan
    pub fn new(width: f64, height: f64, image_width: f64, image_height: f64) -> Self {
        Self { zoom: 1.0, pan_x: 0.0, pan_y: 0.0, width, height, image_width, image_height }
    }

    /// Whether the container and image both have a usable area
    pub fn is_ready(&self) -> bool {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        usable(self.width)
            && usable(self.height)
            && usable(self.image_width)
            && usable(self.image_height)
            && usable(self.zoom)
    }

    /// Scale at which the whole image fits the container, or `None` when not ready
    pub fn fit_scale(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        Some((self.width / self.image_width).min(self.height / self.image_height))
    }

    /// Viewport pixels per image pixel (fit scale × zoom), or `None` when not ready
    pub fn effective_scale(&self) -> Option<f64> {
        self.fit_scale().map(|fit| fit * self.zoom)
    }

    /// Viewport position of the image center
    fn origin(&self) -> (f64, f64) {
        (self.width / 2.0 + self.pan_x, self.height / 2.0 + self.pan_y)
    }

    /// Map an image-space point into viewport space
    pub fn image_to_viewport(&self, p: ImagePoint) -> ViewportPoint {
        let Some(scale) = self.effective_scale() else {
            log::debug!("viewport not ready, image_to_viewport is identity");
            return ViewportPoint::new(p.x, p.y);
        };
        let (ox, oy) = self.origin();
        ViewportPoint::new(
            ox + (p.x - self.image_width / 2.0) * scale,
            oy + (p.y - self.image_height / 2.0) * scale,
        )
    }

    /// Map a viewport-space point into image space
    pub fn viewport_to_image(&self, p: ViewportPoint) -> ImagePoint {
        let Some(scale) = self.effective_scale() else {
            log::debug!("viewport not ready, viewport_to_image is identity");
            return ImagePoint::new(p.x, p.y);
        };
        let (ox, oy) = self.origin();
        ImagePoint::new(
            (p.x - ox) / scale + self.image_width / 2.0,
            (p.y - oy) / scale + self.image_height / 2.0,
        )
    }

    /// Convert an image-space length to viewport pixels
    pub fn image_length_to_viewport(&self, length: f64) -> f64 {
        self.effective_scale().map_or(length, |scale| length * scale)
    }

    /// Convert a viewport-space length to image pixels
    pub fn viewport_length_to_image(&self, length: f64) -> f64 {
        self.effective_scale().map_or(length, |scale| length / scale)
    }

    /// Update the container size (call on layout/resize)
    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    /// Update the natural image size
    pub fn set_image_size(&mut self, image_width: f64, image_height: f64) {
        self.image_width = image_width;
        self.image_height = image_height;
    }

    /// Shift the view by a viewport-space delta
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Back to the fitted, centered view
    pub fn reset_view(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Zoom to `new_zoom` keeping the image point under `anchor` fixed on screen.
    ///
    /// `new_zoom` is clamped to `[min_zoom, max_zoom]` before the pan is solved,
    /// so the anchor stays put even when the requested zoom was out of range.
    /// Returns `true` if the zoom changed.
    pub fn zoom_at(
        &mut self,
        anchor: ViewportPoint,
        new_zoom: f64,
        min_zoom: f64,
        max_zoom: f64,
    ) -> bool {
        if !self.is_ready() || !new_zoom.is_finite() {
            return false;
        }

        let old_zoom = self.zoom;
        let new_zoom = new_zoom.clamp(min_zoom, max_zoom);
        if (new_zoom - old_zoom).abs() <= f64::EPSILON * old_zoom {
            return false;
        }

        let ratio = new_zoom / old_zoom;
        let (ox, oy) = self.origin();
        let new_ox = anchor.x - (anchor.x - ox) * ratio;
        let new_oy = anchor.y - (anchor.y - oy) * ratio;

        self.zoom = new_zoom;
        self.pan_x = new_ox - self.width / 2.0;
        self.pan_y = new_oy - self.height / 2.0;
        true
    }

    /// Viewport center, used as the anchor for keyboard/button zoom
    pub fn center(&self) -> ViewportPoint {
        ViewportPoint::new(self.width / 2.0, self.height / 2.0)
    }
}
