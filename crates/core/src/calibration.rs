//! Calibration: pixel → millimeter scale
//!
//! A calibration reference is a pair of anchors plus a known real-world length.
//! The scale is `real_world_distance_mm / pixel_distance` and is undefined
//! until the anchors are far enough apart to make the division meaningful.
//!
//! Plausibility checks on the entered length are advisory. Operators may
//! calibrate against anything (a credit card, a coin, a ruler segment), so a
//! surprising value produces a warning and never blocks the computation.

use crate::anchor::{AnchorRole, AnchorSet};
use crate::geometry::ImagePoint;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Width of an ISO/IEC 7810 ID-1 card (credit card) in millimeters
pub const CREDIT_CARD_WIDTH_MM: f64 = 85.6;

/// Lengths offered to the operator as one-click suggestions
pub const SUGGESTED_LENGTHS_MM: [f64; 3] = [35.0, 50.0, CREDIT_CARD_WIDTH_MM];

/// What the calibration length physically refers to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReferenceKind {
    /// Distance between the inner eye corners
    InnerCanthal,
    /// A known pupillary distance
    PupillaryDistance,
    /// Width of a credit card held against the face
    CreditCard,
    /// Diameter of a coin
    Coin { diameter_mm: f64 },
    /// Segment of a ruler
    Ruler,
    /// Anything else the operator measured by hand
    Custom,
}

impl ReferenceKind {
    /// Range of lengths considered plausible for this kind, if any
    pub fn plausible_range(&self) -> Option<RangeInclusive<f64>> {
        match self {
            ReferenceKind::InnerCanthal => Some(25.0..=40.0),
            ReferenceKind::PupillaryDistance => Some(50.0..=80.0),
            ReferenceKind::CreditCard => Some(84.0..=87.0),
            ReferenceKind::Coin { .. } | ReferenceKind::Ruler | ReferenceKind::Custom => None,
        }
    }

    /// Length the engine starts with for this kind
    pub fn default_length_mm(&self, ruler_default_mm: f64) -> f64 {
        match self {
            ReferenceKind::InnerCanthal => 35.0,
            ReferenceKind::PupillaryDistance => 63.0,
            ReferenceKind::CreditCard => CREDIT_CARD_WIDTH_MM,
            ReferenceKind::Coin { diameter_mm } => *diameter_mm,
            ReferenceKind::Ruler | ReferenceKind::Custom => ruler_default_mm,
        }
    }
}

/// Which entity supplies the calibration reference
///
/// One engine serves every calibration workflow; only the placement of the
/// calibration anchors and the plausibility range differ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum CalibrationSource {
    /// Operator drags a ruler over something of known length
    UserRuler,
    /// Detector-supplied anatomical landmarks (inner eye corners)
    DetectedLandmark,
    /// A physical object visible in the photo
    ReferenceObject { object: ReferenceKind },
}

impl CalibrationSource {
    /// Reference kind used for plausibility checks
    pub fn reference_kind(&self) -> ReferenceKind {
        match self {
            CalibrationSource::UserRuler => ReferenceKind::Ruler,
            CalibrationSource::DetectedLandmark => ReferenceKind::InnerCanthal,
            CalibrationSource::ReferenceObject { object } => *object,
        }
    }

    /// Initial calibration endpoints when nothing was detected
    ///
    /// Rulers and reference objects start as a horizontal segment centered
    /// above the eyes; anatomical landmarks start at typical inner eye corners.
    pub fn default_placement(
        &self,
        image_width: f64,
        image_height: f64,
    ) -> (ImagePoint, ImagePoint) {
        match self {
            CalibrationSource::DetectedLandmark => {
                let y = 0.42 * image_height;
                (
                    ImagePoint::new(0.5 * image_width - 0.08 * image_width, y),
                    ImagePoint::new(0.5 * image_width + 0.08 * image_width, y),
                )
            }
            CalibrationSource::UserRuler | CalibrationSource::ReferenceObject { .. } => {
                let y = 0.15 * image_height;
                (
                    ImagePoint::new(0.5 * image_width - 0.15 * image_width, y),
                    ImagePoint::new(0.5 * image_width + 0.15 * image_width, y),
                )
            }
        }
    }
}

/// Anchor pair plus the real-world length between them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReference {
    pub anchor_start_id: String,
    pub anchor_end_id: String,
    pub real_world_distance_mm: f64,
}

impl CalibrationReference {
    /// Reference over the standard calibration anchors
    pub fn new(real_world_distance_mm: f64) -> Self {
        Self {
            anchor_start_id: AnchorRole::CalibrationStart.id().to_string(),
            anchor_end_id: AnchorRole::CalibrationEnd.id().to_string(),
            real_world_distance_mm,
        }
    }

    /// Pixel distance between the referenced anchors
    pub fn pixel_distance(&self, anchors: &AnchorSet) -> Result<f64, CalibrationError> {
        let start = anchors
            .get(&self.anchor_start_id)
            .ok_or_else(|| CalibrationError::MissingAnchor(self.anchor_start_id.clone()))?;
        let end = anchors
            .get(&self.anchor_end_id)
            .ok_or_else(|| CalibrationError::MissingAnchor(self.anchor_end_id.clone()))?;
        Ok(start.position.distance_to(&end.position))
    }
}

/// Reasons a scale cannot be derived
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("calibration anchors are {distance_px:.1}px apart, need at least {minimum_px:.1}px")]
    InsufficientSeparation { distance_px: f64, minimum_px: f64 },
    #[error("calibration length must be a positive number of millimeters, got {0}")]
    InvalidLength(f64),
    #[error("calibration anchor {0} is missing")]
    MissingAnchor(String),
}

/// Advisory finding on an entered calibration length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationWarning {
    pub reference_kind: ReferenceKind,
    pub distance_mm: f64,
    pub expected_min_mm: f64,
    pub expected_max_mm: f64,
}

impl std::fmt::Display for CalibrationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.1}mm is outside the usual {:.1}-{:.1}mm for {:?}",
            self.distance_mm, self.expected_min_mm, self.expected_max_mm, self.reference_kind
        )
    }
}

/// Derives and validates calibration scales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationService {
    source: CalibrationSource,
    min_separation_px: f64,
}

impl CalibrationService {
    pub fn new(source: CalibrationSource, min_separation_px: f64) -> Self {
        Self { source, min_separation_px }
    }

    pub fn source(&self) -> CalibrationSource {
        self.source
    }

    /// Millimeters per image pixel for the reference
    pub fn derive_scale(
        &self,
        reference: &CalibrationReference,
        anchors: &AnchorSet,
    ) -> Result<f64, CalibrationError> {
        let length = reference.real_world_distance_mm;
        if !(length.is_finite() && length > 0.0) {
            return Err(CalibrationError::InvalidLength(length));
        }

        let distance_px = reference.pixel_distance(anchors)?;
        if !(distance_px >= self.min_separation_px) {
            return Err(CalibrationError::InsufficientSeparation {
                distance_px,
                minimum_px: self.min_separation_px,
            });
        }

        Ok(length / distance_px)
    }

    /// Flag lengths outside the plausible range of the active reference kind
    pub fn validate(&self, distance_mm: f64) -> Option<CalibrationWarning> {
        let kind = self.source.reference_kind();
        let range = kind.plausible_range()?;
        if range.contains(&distance_mm) {
            return None;
        }
        Some(CalibrationWarning {
            reference_kind: kind,
            distance_mm,
            expected_min_mm: *range.start(),
            expected_max_mm: *range.end(),
        })
    }

    /// Scale used when no calibration has ever been valid: assume the face
    /// spans the full image width.
    pub fn fallback_scale(assumed_face_width_mm: f64, image_width: f64) -> f64 {
        if image_width > 0.0 {
            assumed_face_width_mm / image_width
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;

    fn anchors_at(start: (f64, f64), end: (f64, f64)) -> AnchorSet {
        let mut set = AnchorSet::new(2000.0, 2000.0);
        let (start, end) = (ImagePoint::new(start.0, start.1), ImagePoint::new(end.0, end.1));
        set.insert(Anchor::new(AnchorRole::CalibrationStart, start, 0.0));
        set.insert(Anchor::new(AnchorRole::CalibrationEnd, end, 0.0));
        set
    }

    #[test]
    fn test_scale_from_hundred_pixels() {
        let service = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        let anchors = anchors_at((0.0, 0.0), (100.0, 0.0));
        let scale = service.derive_scale(&CalibrationReference::new(50.0), &anchors).unwrap();
        assert_eq!(scale, 0.5);
    }

    #[test]
    fn test_doubling_separation_halves_scale() {
        let service = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        let reference = CalibrationReference::new(50.0);

        let near = service.derive_scale(&reference, &anchors_at((0.0, 0.0), (100.0, 0.0))).unwrap();
        let far = service.derive_scale(&reference, &anchors_at((0.0, 0.0), (200.0, 0.0))).unwrap();
        assert_eq!(far, near / 2.0);
    }

    #[test]
    fn test_insufficient_separation() {
        let service = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        let anchors = anchors_at((5.0, 5.0), (9.0, 8.0));
        let err = service.derive_scale(&CalibrationReference::new(50.0), &anchors).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientSeparation { distance_px: 5.0, minimum_px: 10.0 }
        );

        // Coincident anchors never divide by zero
        let anchors = anchors_at((5.0, 5.0), (5.0, 5.0));
        assert!(service.derive_scale(&CalibrationReference::new(50.0), &anchors).is_err());
    }

    #[test]
    fn test_invalid_length() {
        let service = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        let anchors = anchors_at((0.0, 0.0), (100.0, 0.0));
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                service.derive_scale(&CalibrationReference::new(bad), &anchors),
                Err(CalibrationError::InvalidLength(_))
            ));
        }
    }

    #[test]
    fn test_missing_anchor() {
        let service = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        let anchors = AnchorSet::new(100.0, 100.0);
        assert_eq!(
            service.derive_scale(&CalibrationReference::new(50.0), &anchors),
            Err(CalibrationError::MissingAnchor("calibration-start".to_string()))
        );
    }

    #[test]
    fn test_validate_inner_canthal_range() {
        let service = CalibrationService::new(CalibrationSource::DetectedLandmark, 10.0);
        assert!(service.validate(32.0).is_none());

        let warning = service.validate(45.0).unwrap();
        assert_eq!(warning.reference_kind, ReferenceKind::InnerCanthal);
        assert_eq!((warning.expected_min_mm, warning.expected_max_mm), (25.0, 40.0));
    }

    #[test]
    fn test_validate_pupillary_distance_range() {
        let service = CalibrationService::new(
            CalibrationSource::ReferenceObject { object: ReferenceKind::PupillaryDistance },
            10.0,
        );
        assert!(service.validate(63.0).is_none());
        assert!(service.validate(45.0).is_some());
        assert!(service.validate(85.6).is_some());
    }

    #[test]
    fn test_validate_never_flags_arbitrary_objects() {
        let ruler = CalibrationService::new(CalibrationSource::UserRuler, 10.0);
        assert!(ruler.validate(85.6).is_none());
        assert!(ruler.validate(1.0).is_none());

        let object = ReferenceKind::Coin { diameter_mm: 23.25 };
        let coin = CalibrationService::new(CalibrationSource::ReferenceObject { object }, 10.0);
        assert!(coin.validate(23.25).is_none());
    }

    #[test]
    fn test_default_lengths() {
        assert_eq!(ReferenceKind::CreditCard.default_length_mm(50.0), 85.6);
        assert_eq!(ReferenceKind::InnerCanthal.default_length_mm(50.0), 35.0);
        assert_eq!(ReferenceKind::Ruler.default_length_mm(50.0), 50.0);
        assert_eq!(ReferenceKind::Coin { diameter_mm: 24.0 }.default_length_mm(50.0), 24.0);
    }

    #[test]
    fn test_default_placement_is_separated() {
        for source in [
            CalibrationSource::UserRuler,
            CalibrationSource::DetectedLandmark,
            CalibrationSource::ReferenceObject { object: ReferenceKind::CreditCard },
        ] {
            let (a, b) = source.default_placement(1000.0, 800.0);
            assert!(a.distance_to(&b) > 100.0);
        }
    }

    #[test]
    fn test_fallback_scale() {
        assert_eq!(CalibrationService::fallback_scale(140.0, 1400.0), 0.1);
        assert_eq!(CalibrationService::fallback_scale(140.0, 0.0), 0.0);
    }
}
