//! Pupilmeter Core Library
//!
//! Calibrated interactive measurement of pupillary distance and related
//! optical measurements on face photos: coordinate transforms, draggable
//! anchors, calibration, the interaction state machine and the measurement
//! computation.

pub mod anchor;
pub mod calibration;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod measurement;
pub mod overlay;
pub mod transform;

pub use anchor::{heuristic_pupils, Anchor, AnchorError, AnchorRole, AnchorSet};
pub use calibration::{
    CalibrationError, CalibrationReference, CalibrationService, CalibrationSource,
    CalibrationWarning, ReferenceKind, CREDIT_CARD_WIDTH_MM, SUGGESTED_LENGTHS_MM,
};
pub use config::{ConfigError, EngineConfig};
pub use detection::{
    DetectedLandmark, DetectionError, DetectionPoll, DetectionTask, FixedLandmarks, ImageInfo,
    LandmarkDetector, LandmarkKind, NoDetector,
};
pub use engine::{
    CalibrationMetadata, CommittedMeasurement, MeasurementEngine, MeasurementSession,
    MeasurementSink,
};
pub use error::EngineWarning;
pub use geometry::{ImagePoint, NormalizedPoint, ViewportPoint};
pub use interaction::{
    InteractionController, InteractionOutcome, InteractionState, TouchPoint, Velocity,
};
pub use measurement::{compute, reliability, MeasurementResult, ScaleInput};
pub use overlay::{GuideKind, GuideLine, OverlayAnchor, OverlayFrame};
pub use transform::Viewport;
