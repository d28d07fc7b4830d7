//! Measurement computation
//!
//! Derives every output distance from the current anchor positions and the
//! current scale. `compute` is a pure function: the engine caches its last
//! output but never stores measurements as independent state.
//!
//! The reliability score is a heuristic blend of calibration confidence and
//! the mean anchor confidence. It is not a statistically calibrated
//! probability.

use crate::anchor::{AnchorRole, AnchorSet};
use crate::config::EngineConfig;
use crate::geometry::ImagePoint;
use serde::{Deserialize, Serialize};

/// Scale fed into a computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleInput {
    pub mm_per_pixel: f64,
    /// Whether the scale came from a valid calibration reference
    pub calibrated: bool,
}

/// All derived distances (millimeters) and the reliability score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub pd_binocular: f64,
    pub dnp_left: f64,
    pub dnp_right: f64,
    pub lens_width: f64,
    pub height_left: Option<f64>,
    pub height_right: Option<f64>,
    /// Heuristic reliability in [0, 1]
    pub reliability: f64,
    pub has_glasses: bool,
    pub calibration_used: bool,
    pub scale_mm_per_pixel: f64,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Distance along the pupil line from the nasal reference's projection to
/// each pupil, in pixels.
///
/// Without a nasal reference (or with coincident pupils) the pupil-line
/// midpoint is used, which splits the PD evenly.
fn nasopupillary_px(left: ImagePoint, right: ImagePoint, nasal: Option<ImagePoint>) -> (f64, f64) {
    let pd_px = left.distance_to(&right);
    let Some(nasal) = nasal.filter(|_| pd_px > f64::EPSILON) else {
        return (pd_px / 2.0, pd_px / 2.0);
    };

    let ux = (right.x - left.x) / pd_px;
    let uy = (right.y - left.y) / pd_px;
    let along = |p: ImagePoint| ((p.x - nasal.x) * ux + (p.y - nasal.y) * uy).abs();
    (along(left), along(right))
}

/// Compute the measurement result for the given anchors and scale
pub fn compute(anchors: &AnchorSet, scale: ScaleInput, config: &EngineConfig) -> MeasurementResult {
    let mm = finite_or_zero(scale.mm_per_pixel);

    let left = anchors.position(AnchorRole::PupilLeft);
    let right = anchors.position(AnchorRole::PupilRight);
    let nasal = anchors.position(AnchorRole::NasalReference);

    let (pd_px, dnp_left_px, dnp_right_px) = match (left, right) {
        (Some(l), Some(r)) => {
            let (dl, dr) = nasopupillary_px(l, r, nasal);
            (l.distance_to(&r), dl, dr)
        }
        _ => (0.0, 0.0, 0.0),
    };

    let pd_binocular = finite_or_zero(pd_px * mm);

    let height = |pupil: Option<ImagePoint>, frame: AnchorRole| {
        let frame = anchors.position(frame)?;
        let pupil = pupil?;
        Some(finite_or_zero((frame.y - pupil.y).abs() * mm))
    };
    let has_glasses = anchors.has_glasses();
    let (height_left, height_right) = if has_glasses {
        (height(left, AnchorRole::FrameBottomLeft), height(right, AnchorRole::FrameBottomRight))
    } else {
        (None, None)
    };

    MeasurementResult {
        pd_binocular,
        dnp_left: finite_or_zero(dnp_left_px * mm),
        dnp_right: finite_or_zero(dnp_right_px * mm),
        lens_width: finite_or_zero(pd_binocular * config.lens_width_ratio),
        height_left,
        height_right,
        reliability: reliability(anchors, scale.calibrated, config),
        has_glasses,
        calibration_used: scale.calibrated,
        scale_mm_per_pixel: mm,
    }
}

/// Weighted blend of calibration confidence and mean anchor confidence
pub fn reliability(anchors: &AnchorSet, calibrated: bool, config: &EngineConfig) -> f64 {
    let calibration_confidence =
        if calibrated { config.calibrated_confidence } else { config.uncalibrated_confidence };

    let (sum, count) = anchors
        .measurement_confidences()
        .fold((0.0, 0usize), |(sum, count), c| (sum + c, count + 1));
    let anchor_confidence = if count > 0 { sum / count as f64 } else { 0.0 };

    let score = config.calibration_weight * calibration_confidence
        + config.anchor_weight * anchor_confidence;
    finite_or_zero(score).clamp(0.0, 1.0)
}
