//! Engine warnings
//!
//! Nothing in the engine is fatal. Conditions the operator should know about
//! are collected as warnings on the engine and exported with a committed
//! measurement. Fallible calls use the per-module error enums
//! ([`crate::calibration::CalibrationError`],
//! [`crate::detection::DetectionError`], [`crate::config::ConfigError`]).

use crate::calibration::CalibrationWarning;
use serde::{Deserialize, Serialize};

/// Non-fatal conditions surfaced to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineWarning {
    /// Calibration anchors too close; the last valid scale (or the
    /// uncalibrated fallback) is in use
    InsufficientCalibrationSeparation { distance_px: f64, minimum_px: f64 },
    /// The calibration length is not a positive number
    InvalidCalibrationLength { length_mm: f64 },
    /// Landmark detection failed or timed out; heuristic anchors are in use
    DetectionUnavailable { reason: String },
    /// A detection result arrived after the operator started adjusting anchors
    LateDetectionDiscarded,
    /// The entered calibration length is unusual for the reference kind
    OutOfPlausibleRange(CalibrationWarning),
}

impl std::fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineWarning::InsufficientCalibrationSeparation { distance_px, minimum_px } => write!(
                f,
                "calibration anchors are {distance_px:.1}px apart (minimum {minimum_px:.1}px)"
            ),
            EngineWarning::InvalidCalibrationLength { length_mm } => {
                write!(f, "calibration length {length_mm}mm is not usable")
            }
            EngineWarning::DetectionUnavailable { reason } => {
                write!(f, "landmark detection unavailable: {reason}")
            }
            EngineWarning::LateDetectionDiscarded => {
                write!(f, "late landmark detection discarded after manual adjustment")
            }
            EngineWarning::OutOfPlausibleRange(warning) => write!(f, "{warning}"),
        }
    }
}
