//! Landmark detection seam
//!
//! Facial-landmark inference lives outside this crate. A detector implements
//! [`LandmarkDetector`] and reports zero or more landmarks in normalized
//! image-fraction coordinates. [`DetectionTask`] runs a detector on a worker
//! thread so the UI thread can wait for it with a timeout at load time and
//! keep polling afterwards.

use crate::anchor::AnchorRole;
use crate::geometry::NormalizedPoint;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pixel dimensions of the loaded image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Facial landmarks the engine knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    LeftPupil,
    RightPupil,
    NoseBridge,
    LeftInnerCanthus,
    RightInnerCanthus,
}

impl LandmarkKind {
    /// Anchor seeded from this landmark. Inner eye corners only seed the
    /// calibration anchors when the calibration is landmark-based.
    pub fn anchor_role(self, canthi_calibrate: bool) -> Option<AnchorRole> {
        match self {
            LandmarkKind::LeftPupil => Some(AnchorRole::PupilLeft),
            LandmarkKind::RightPupil => Some(AnchorRole::PupilRight),
            LandmarkKind::NoseBridge => Some(AnchorRole::NasalReference),
            LandmarkKind::LeftInnerCanthus if canthi_calibrate => {
                Some(AnchorRole::CalibrationStart)
            }
            LandmarkKind::RightInnerCanthus if canthi_calibrate => {
                Some(AnchorRole::CalibrationEnd)
            }
            LandmarkKind::LeftInnerCanthus | LandmarkKind::RightInnerCanthus => None,
        }
    }
}

/// One detected landmark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedLandmark {
    pub kind: LandmarkKind,
    pub position: NormalizedPoint,
    pub confidence: f64,
}

impl DetectedLandmark {
    pub fn new(kind: LandmarkKind, x: f64, y: f64, confidence: f64) -> Self {
        Self { kind, position: NormalizedPoint::new(x, y), confidence }
    }

    /// In-bounds position and a finite confidence
    pub fn is_usable(&self) -> bool {
        self.position.is_in_bounds() && self.confidence.is_finite()
    }
}

/// Reasons detection produced nothing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("detector worker stopped without a result")]
    Disconnected,
}

/// External facial-landmark detector
///
/// `detect` runs on a worker thread that is never cancelled. It must return
/// in bounded time; a detector that hangs keeps its thread alive after the
/// session has moved on.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &ImageInfo) -> Result<Vec<DetectedLandmark>, DetectionError>;
}

/// Detector that always reports the same landmarks
#[derive(Debug, Clone, Default)]
pub struct FixedLandmarks {
    landmarks: Vec<DetectedLandmark>,
}

impl FixedLandmarks {
    pub fn new(landmarks: Vec<DetectedLandmark>) -> Self {
        Self { landmarks }
    }
}

impl LandmarkDetector for FixedLandmarks {
    fn detect(&self, _image: &ImageInfo) -> Result<Vec<DetectedLandmark>, DetectionError> {
        Ok(self.landmarks.clone())
    }
}

/// Detector for deployments without landmark inference
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetector;

impl LandmarkDetector for NoDetector {
    fn detect(&self, _image: &ImageInfo) -> Result<Vec<DetectedLandmark>, DetectionError> {
        Err(DetectionError::Unavailable("no detector configured".to_string()))
    }
}

/// Outcome of polling a running detection
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionPoll {
    Pending,
    Ready(Result<Vec<DetectedLandmark>, DetectionError>),
}

/// Detection running on a worker thread
///
/// The result is delivered exactly once; after that the task is finished and
/// further polls report `Disconnected`. Dropping the task does not stop the
/// worker, its late result is simply discarded.
#[derive(Debug)]
pub struct DetectionTask {
    receiver: Receiver<Result<Vec<DetectedLandmark>, DetectionError>>,
    worker: Option<JoinHandle<()>>,
    finished: bool,
}

impl DetectionTask {
    /// Start `detector` on a worker thread
    pub fn spawn(detector: Arc<dyn LandmarkDetector>, image: ImageInfo) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::spawn(move || {
            let result = detector.detect(&image);
            // The session may have been reset; nobody is listening then.
            let _ = sender.send(result);
        });
        Self { receiver, worker: Some(worker), finished: false }
    }

    /// Whether the detector is still executing on its worker thread
    pub fn worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    fn finish(&mut self, result: Result<Vec<DetectedLandmark>, DetectionError>) -> DetectionPoll {
        self.finished = true;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("landmark detector panicked");
            }
        }
        DetectionPoll::Ready(result)
    }

    /// Block for at most `timeout`
    pub fn wait(&mut self, timeout: Duration) -> DetectionPoll {
        if self.finished {
            return DetectionPoll::Ready(Err(DetectionError::Disconnected));
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => self.finish(result),
            Err(RecvTimeoutError::Timeout) => DetectionPoll::Pending,
            Err(RecvTimeoutError::Disconnected) => self.finish(Err(DetectionError::Disconnected)),
        }
    }

    /// Non-blocking check
    pub fn poll(&mut self) -> DetectionPoll {
        if self.finished {
            return DetectionPoll::Ready(Err(DetectionError::Disconnected));
        }
        match self.receiver.try_recv() {
            Ok(result) => self.finish(result),
            Err(TryRecvError::Empty) => DetectionPoll::Pending,
            Err(TryRecvError::Disconnected) => self.finish(Err(DetectionError::Disconnected)),
        }
    }
}
