//! Anchor model
//!
//! Anchors are the named points the operator drags over the photo: the two
//! calibration endpoints, the pupils, the nasal reference and (in glasses
//! mode) the frame-bottom points below each pupil. Positions are always stored
//! in image space.

use crate::geometry::ImagePoint;
use serde::{Deserialize, Serialize};

/// Role an anchor plays in calibration or measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRole {
    CalibrationStart,
    CalibrationEnd,
    PupilLeft,
    PupilRight,
    NasalReference,
    FrameBottomLeft,
    FrameBottomRight,
}

impl AnchorRole {
    /// Stable identifier used as the anchor id
    pub fn id(self) -> &'static str {
        match self {
            AnchorRole::CalibrationStart => "calibration-start",
            AnchorRole::CalibrationEnd => "calibration-end",
            AnchorRole::PupilLeft => "pupil-left",
            AnchorRole::PupilRight => "pupil-right",
            AnchorRole::NasalReference => "nasal-reference",
            AnchorRole::FrameBottomLeft => "frame-bottom-left",
            AnchorRole::FrameBottomRight => "frame-bottom-right",
        }
    }

    /// Whether this anchor is one of the calibration endpoints
    pub fn is_calibration(self) -> bool {
        matches!(self, AnchorRole::CalibrationStart | AnchorRole::CalibrationEnd)
    }

    /// Whether this anchor only exists in glasses mode
    pub fn is_frame(self) -> bool {
        matches!(self, AnchorRole::FrameBottomLeft | AnchorRole::FrameBottomRight)
    }
}

/// A named, possibly draggable point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub role: AnchorRole,
    pub position: ImagePoint,
    /// Detector confidence in [0, 1]; 0 for heuristic placement
    pub confidence: f64,
    pub draggable: bool,
}

impl Anchor {
    /// Create a draggable anchor whose id is derived from its role
    pub fn new(role: AnchorRole, position: ImagePoint, confidence: f64) -> Self {
        Self {
            id: role.id().to_string(),
            role,
            position,
            confidence: confidence.clamp(0.0, 1.0),
            draggable: true,
        }
    }

    /// Make this anchor fixed (not draggable)
    pub fn locked(mut self) -> Self {
        self.draggable = false;
        self
    }
}

/// Errors raised by anchor mutations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnchorError {
    #[error("no anchor with id {0}")]
    NotFound(String),
    #[error("anchor {0} is not draggable")]
    NotDraggable(String),
}

/// Anthropometric default placement for a W×H face photo
///
/// Pupils sit at a quarter of the width either side of center at 42% of the
/// height; the nasal reference sits between them.
pub fn heuristic_pupils(image_width: f64, image_height: f64) -> (ImagePoint, ImagePoint) {
    let y = 0.42 * image_height;
    (
        ImagePoint::new(0.5 * image_width - 0.25 * image_width, y),
        ImagePoint::new(0.5 * image_width + 0.25 * image_width, y),
    )
}

/// The anchors of one measurement session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
    image_width: f64,
    image_height: f64,
    /// Set once the operator has moved any anchor
    manually_adjusted: bool,
}

impl AnchorSet {
    /// Empty set bound to an image size (positions are clamped to it)
    pub fn new(image_width: f64, image_height: f64) -> Self {
        Self { anchors: Vec::new(), image_width, image_height, manually_adjusted: false }
    }

    /// Heuristic measurement anchors (pupils, nasal reference, optional frame
    /// anchors) plus the given calibration endpoints. All get confidence 0.
    pub fn heuristic(
        image_width: f64,
        image_height: f64,
        calibration: (ImagePoint, ImagePoint),
        glasses: bool,
        frame_drop_fraction: f64,
    ) -> Self {
        let mut set = Self::new(image_width, image_height);
        let (left, right) = heuristic_pupils(image_width, image_height);

        set.insert(Anchor::new(AnchorRole::CalibrationStart, calibration.0, 0.0));
        set.insert(Anchor::new(AnchorRole::CalibrationEnd, calibration.1, 0.0));
        set.insert(Anchor::new(AnchorRole::PupilLeft, left, 0.0));
        set.insert(Anchor::new(AnchorRole::PupilRight, right, 0.0));
        set.insert(Anchor::new(AnchorRole::NasalReference, left.midpoint(&right), 0.0));

        if glasses {
            set.set_glasses_mode(true, frame_drop_fraction);
        }
        set
    }

    /// Insert or replace the anchor with the same id
    pub fn insert(&mut self, anchor: Anchor) {
        match self.anchors.iter_mut().find(|a| a.id == anchor.id) {
            Some(existing) => *existing = anchor,
            None => self.anchors.push(anchor),
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.id == id)
    }

    pub fn by_role(&self, role: AnchorRole) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.role == role)
    }

    pub fn position(&self, role: AnchorRole) -> Option<ImagePoint> {
        self.by_role(role).map(|a| a.position)
    }

    /// Whether the operator has moved any anchor
    pub fn manually_adjusted(&self) -> bool {
        self.manually_adjusted
    }

    /// Whether frame-bottom anchors are present
    pub fn has_glasses(&self) -> bool {
        self.anchors.iter().any(|a| a.role.is_frame())
    }

    /// Nearest draggable anchor within `radius` image pixels of `point`
    pub fn hit_test(&self, point: ImagePoint, radius: f64) -> Option<&Anchor> {
        self.anchors
            .iter()
            .filter(|a| a.draggable)
            .map(|a| (a, a.position.distance_to(&point)))
            .filter(|(_, distance)| *distance <= radius)
            .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
            .map(|(a, _)| a)
    }

    fn clamp_to_image(&self, p: ImagePoint) -> ImagePoint {
        if self.image_width <= 0.0 || self.image_height <= 0.0 {
            return p;
        }
        ImagePoint::new(p.x.clamp(0.0, self.image_width), p.y.clamp(0.0, self.image_height))
    }

    /// Move a draggable anchor (operator action). The position is clamped to
    /// the image bounds.
    pub fn move_anchor(
        &mut self,
        id: &str,
        position: ImagePoint,
    ) -> Result<ImagePoint, AnchorError> {
        let clamped = self.clamp_to_image(position);
        let anchor = self
            .anchors
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AnchorError::NotFound(id.to_string()))?;

        if !anchor.draggable {
            return Err(AnchorError::NotDraggable(id.to_string()));
        }

        anchor.position = clamped;
        self.manually_adjusted = true;
        Ok(clamped)
    }

    /// Shift a draggable anchor by an image-space delta (keyboard nudge)
    pub fn nudge(&mut self, id: &str, dx: f64, dy: f64) -> Result<ImagePoint, AnchorError> {
        let current = self.get(id).ok_or_else(|| AnchorError::NotFound(id.to_string()))?.position;
        self.move_anchor(id, current.offset(dx, dy))
    }

    /// Place an anchor from a detection result at setup time. Does not count
    /// as an operator adjustment.
    pub fn seed(&mut self, role: AnchorRole, position: ImagePoint, confidence: f64) {
        let position = self.clamp_to_image(position);
        match self.anchors.iter_mut().find(|a| a.role == role) {
            Some(anchor) => {
                anchor.position = position;
                anchor.confidence = confidence.clamp(0.0, 1.0);
            }
            None => self.anchors.push(Anchor::new(role, position, confidence)),
        }
    }

    /// Add or remove the frame-bottom anchors. No other anchor is touched.
    ///
    /// New frame anchors are dropped below their pupil by
    /// `frame_drop_fraction × image height`.
    pub fn set_glasses_mode(&mut self, enabled: bool, frame_drop_fraction: f64) {
        if !enabled {
            self.anchors.retain(|a| !a.role.is_frame());
            return;
        }

        let drop = frame_drop_fraction * self.image_height;
        let pairs = [
            (AnchorRole::PupilLeft, AnchorRole::FrameBottomLeft),
            (AnchorRole::PupilRight, AnchorRole::FrameBottomRight),
        ];
        for (pupil, frame) in pairs {
            if self.by_role(frame).is_some() {
                continue;
            }
            let Some(pupil_position) = self.position(pupil) else {
                continue;
            };
            let position = self.clamp_to_image(pupil_position.offset(0.0, drop));
            self.anchors.push(Anchor::new(frame, position, 0.0));
        }
    }

    /// Confidences of the anchors that feed the measurement (not calibration)
    pub fn measurement_confidences(&self) -> impl Iterator<Item = f64> + '_ {
        self.anchors.iter().filter(|a| !a.role.is_calibration()).map(|a| a.confidence)
    }
}
