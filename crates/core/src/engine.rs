//! Measurement engine and session lifecycle
//!
//! A [`MeasurementEngine`] owns everything for one photo: the viewport, the
//! anchors, the interaction state machine and the calibration reference. Every
//! mutation that can change a measurement recomputes the result synchronously
//! and pushes it to the injected [`MeasurementSink`].
//!
//! A [`MeasurementSession`] builds a fresh engine per image load, runs landmark
//! detection with a timeout, applies late detection results when it is still
//! safe to do so, and discards the engine on reset.

use crate::anchor::{AnchorError, AnchorRole, AnchorSet};
use crate::calibration::{
    CalibrationError, CalibrationReference, CalibrationService, CalibrationSource, ReferenceKind,
};
use crate::config::EngineConfig;
use crate::detection::{
    DetectedLandmark, DetectionError, DetectionPoll, DetectionTask, ImageInfo, LandmarkDetector,
};
use crate::error::EngineWarning;
use crate::geometry::ViewportPoint;
use crate::interaction::{InteractionController, InteractionOutcome, InteractionState, TouchPoint};
use crate::measurement::{self, MeasurementResult, ScaleInput};
use crate::overlay::OverlayFrame;
use crate::transform::Viewport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Receives results from an engine
///
/// Sinks are shared with the surrounding application, so they take `&self`.
pub trait MeasurementSink: Send + Sync {
    /// Called after every recompute
    fn on_result(&self, result: &MeasurementResult);

    /// Called when the operator commits the measurement
    fn on_commit(&self, committed: &CommittedMeasurement);
}

/// Calibration details exported with a committed measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    pub source: CalibrationSource,
    pub reference_kind: ReferenceKind,
    pub real_world_distance_mm: f64,
    /// Image-space distance between the calibration anchors
    pub pixel_distance: Option<f64>,
    /// Scale derived from the calibration, `None` if it never became valid
    pub scale_mm_per_pixel: Option<f64>,
    /// Whether the operator or the detector confirmed the calibration
    pub confirmed: bool,
    pub warnings: Vec<EngineWarning>,
}

/// Snapshot handed to the application on commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedMeasurement {
    pub session_id: Uuid,
    /// Unix time in milliseconds
    pub committed_at_ms: u64,
    pub result: MeasurementResult,
    pub anchors: AnchorSet,
    pub calibration: CalibrationMetadata,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Engine for one image
pub struct MeasurementEngine {
    config: EngineConfig,
    session_id: Uuid,
    viewport: Viewport,
    anchors: AnchorSet,
    controller: InteractionController,
    calibration: CalibrationService,
    reference: CalibrationReference,
    /// Last scale derived from a valid calibration
    last_valid_scale: Option<f64>,
    /// The default ruler is provisional until a length is entered, a
    /// calibration anchor is moved, or detected canthi seed it
    calibration_confirmed: bool,
    result: MeasurementResult,
    /// Warnings about the current calibration; rebuilt on every recompute
    calibration_warnings: Vec<EngineWarning>,
    /// Detection warnings; they persist until a detection result is applied
    detection_warnings: Vec<EngineWarning>,
    sink: Option<Arc<dyn MeasurementSink>>,
}

impl MeasurementEngine {
    /// Engine with heuristic anchors. The viewport is not ready until
    /// [`MeasurementEngine::set_container_size`] is called.
    pub fn new(image: ImageInfo, source: CalibrationSource, config: EngineConfig) -> Self {
        let width = f64::from(image.width);
        let height = f64::from(image.height);
        let anchors = AnchorSet::heuristic(
            width,
            height,
            source.default_placement(width, height),
            false,
            config.frame_drop_fraction,
        );
        let length = source.reference_kind().default_length_mm(config.default_ruler_length_mm);

        let mut engine = Self {
            session_id: Uuid::new_v4(),
            viewport: Viewport::new(0.0, 0.0, width, height),
            anchors,
            controller: InteractionController::new(config.clone()),
            calibration: CalibrationService::new(source, config.min_calibration_separation_px),
            reference: CalibrationReference::new(length),
            last_valid_scale: None,
            calibration_confirmed: false,
            result: measurement::compute(
                &AnchorSet::default(),
                ScaleInput { mm_per_pixel: 0.0, calibrated: false },
                &config,
            ),
            calibration_warnings: Vec::new(),
            detection_warnings: Vec::new(),
            sink: None,
            config,
        };
        engine.recompute();
        log::info!(
            "engine {} created for {}x{} image",
            engine.session_id,
            image.width,
            image.height
        );
        engine
    }

    /// Attach a result sink; it immediately receives the current result
    pub fn with_sink(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        sink.on_result(&self.result);
        self.sink = Some(sink);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn result(&self) -> &MeasurementResult {
        &self.result
    }

    pub fn interaction_state(&self) -> &InteractionState {
        self.controller.state()
    }

    pub fn calibration_source(&self) -> CalibrationSource {
        self.calibration.source()
    }

    pub fn calibration_length_mm(&self) -> f64 {
        self.reference.real_world_distance_mm
    }

    /// Scale from the calibration, if it has ever been valid
    pub fn calibrated_scale(&self) -> Option<f64> {
        self.last_valid_scale
    }

    pub fn calibration_confirmed(&self) -> bool {
        self.calibration_confirmed
    }

    /// Current warnings, calibration first
    pub fn warnings(&self) -> Vec<EngineWarning> {
        self.calibration_warnings.iter().chain(&self.detection_warnings).cloned().collect()
    }

    fn scale_input(&self) -> ScaleInput {
        match self.last_valid_scale {
            Some(mm_per_pixel) => {
                ScaleInput { mm_per_pixel, calibrated: self.calibration_confirmed }
            }
            None => ScaleInput {
                mm_per_pixel: CalibrationService::fallback_scale(
                    self.config.assumed_face_width_mm,
                    self.viewport.image_width,
                ),
                calibrated: false,
            },
        }
    }

    /// Re-derive the scale and the measurement from the current state
    fn recompute(&mut self) {
        self.calibration_warnings.clear();
        match self.calibration.derive_scale(&self.reference, &self.anchors) {
            Ok(scale) => self.last_valid_scale = Some(scale),
            Err(CalibrationError::InsufficientSeparation { distance_px, minimum_px }) => {
                log::debug!(
                    "calibration anchors {distance_px:.1}px apart, keeping last valid scale"
                );
                self.calibration_warnings.push(EngineWarning::InsufficientCalibrationSeparation {
                    distance_px,
                    minimum_px,
                });
            }
            Err(CalibrationError::InvalidLength(length_mm)) => {
                self.calibration_warnings
                    .push(EngineWarning::InvalidCalibrationLength { length_mm });
            }
            Err(err @ CalibrationError::MissingAnchor(_)) => log::warn!("{err}"),
        }
        if let Some(warning) = self.calibration.validate(self.reference.real_world_distance_mm) {
            self.calibration_warnings.push(EngineWarning::OutOfPlausibleRange(warning));
        }

        self.result = measurement::compute(&self.anchors, self.scale_input(), &self.config);
        if let Some(sink) = &self.sink {
            sink.on_result(&self.result);
        }
    }

    fn confirm_calibration(&mut self) {
        if !self.calibration_confirmed {
            log::debug!("calibration confirmed for engine {}", self.session_id);
            self.calibration_confirmed = true;
        }
    }

    /// Moving either calibration anchor confirms the calibration
    fn anchor_moved(&mut self, id: &str) {
        if self.anchors.get(id).is_some_and(|anchor| anchor.role.is_calibration()) {
            self.confirm_calibration();
        }
        self.recompute();
    }

    fn after(&mut self, outcome: InteractionOutcome) -> InteractionOutcome {
        if let InteractionOutcome::AnchorMoved(id) = &outcome {
            self.anchor_moved(id);
        }
        outcome
    }

    /// Container resized or laid out for the first time
    pub fn set_container_size(&mut self, width: f64, height: f64) {
        self.viewport.set_container_size(width, height);
    }

    pub fn pointer_down(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
    ) -> InteractionOutcome {
        self.controller.pointer_down(position, timestamp_ms, &self.viewport, &self.anchors)
    }

    pub fn pointer_move(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
    ) -> InteractionOutcome {
        let outcome = self.controller.pointer_move(
            position,
            timestamp_ms,
            &mut self.viewport,
            &mut self.anchors,
        );
        self.after(outcome)
    }

    pub fn pointer_up(&mut self, position: ViewportPoint, timestamp_ms: f64) -> InteractionOutcome {
        let outcome = self.controller.pointer_up(
            position,
            timestamp_ms,
            &mut self.viewport,
            &mut self.anchors,
        );
        self.after(outcome)
    }

    pub fn cancel(&mut self) {
        self.controller.cancel();
    }

    pub fn wheel(&mut self, position: ViewportPoint, delta: f64) -> InteractionOutcome {
        self.controller.wheel(position, delta, &mut self.viewport)
    }

    pub fn touch_start(&mut self, touches: &[TouchPoint], timestamp_ms: f64) -> InteractionOutcome {
        self.controller.touch_start(touches, timestamp_ms, &self.viewport, &self.anchors)
    }

    pub fn touch_move(&mut self, touches: &[TouchPoint], timestamp_ms: f64) -> InteractionOutcome {
        let outcome = self.controller.touch_move(
            touches,
            timestamp_ms,
            &mut self.viewport,
            &mut self.anchors,
        );
        self.after(outcome)
    }

    pub fn touch_end(
        &mut self,
        ended: &TouchPoint,
        remaining: &[TouchPoint],
        timestamp_ms: f64,
    ) -> InteractionOutcome {
        let outcome = self.controller.touch_end(
            ended,
            remaining,
            timestamp_ms,
            &mut self.viewport,
            &mut self.anchors,
        );
        self.after(outcome)
    }

    /// Animation frame
    pub fn tick(&mut self, delta_time: Duration) -> InteractionOutcome {
        self.controller.tick(delta_time, &mut self.viewport)
    }

    pub fn zoom_in(&mut self) -> InteractionOutcome {
        self.controller.zoom_in(&mut self.viewport)
    }

    pub fn zoom_out(&mut self) -> InteractionOutcome {
        self.controller.zoom_out(&mut self.viewport)
    }

    pub fn reset_view(&mut self) -> InteractionOutcome {
        self.controller.reset_view(&mut self.viewport)
    }

    /// Keyboard adjustment of one anchor by an image-space delta
    pub fn nudge_anchor(
        &mut self,
        id: &str,
        dx: f64,
        dy: f64,
    ) -> Result<InteractionOutcome, AnchorError> {
        self.anchors.nudge(id, dx, dy)?;
        self.anchor_moved(id);
        Ok(InteractionOutcome::AnchorMoved(id.to_string()))
    }

    /// Operator entered the real-world calibration length
    ///
    /// Out-of-range values are accepted with a warning. Only a positive
    /// finite length confirms the calibration.
    pub fn set_calibration_length(&mut self, length_mm: f64) {
        self.reference.real_world_distance_mm = length_mm;
        if let Some(warning) = self.calibration.validate(length_mm) {
            log::warn!("{warning}");
        }
        if length_mm.is_finite() && length_mm > 0.0 {
            self.confirm_calibration();
        }
        self.recompute();
    }

    /// Add or remove the frame-bottom anchors
    pub fn set_glasses_mode(&mut self, enabled: bool) {
        if enabled == self.anchors.has_glasses() {
            return;
        }
        self.anchors.set_glasses_mode(enabled, self.config.frame_drop_fraction);
        self.recompute();
    }

    /// Record that detection produced nothing usable
    pub fn mark_detection_unavailable(&mut self, error: &DetectionError) {
        log::warn!("{error}; using heuristic anchors");
        self.detection_warnings
            .push(EngineWarning::DetectionUnavailable { reason: error.to_string() });
    }

    /// Seed anchors from a detection result
    ///
    /// Returns `true` if anchors were updated. A result is discarded once the
    /// operator has moved any anchor.
    pub fn apply_detection(
        &mut self,
        detection: Result<Vec<DetectedLandmark>, DetectionError>,
    ) -> bool {
        if self.anchors.manually_adjusted() {
            log::warn!("discarding landmark detection: anchors were adjusted manually");
            self.detection_warnings.push(EngineWarning::LateDetectionDiscarded);
            return false;
        }

        let landmarks: Vec<DetectedLandmark> = match detection {
            Ok(landmarks) => landmarks.into_iter().filter(DetectedLandmark::is_usable).collect(),
            Err(err) => {
                self.mark_detection_unavailable(&err);
                return false;
            }
        };
        if landmarks.is_empty() {
            let error = DetectionError::Unavailable("no usable landmarks".to_string());
            self.mark_detection_unavailable(&error);
            return false;
        }

        let canthi_calibrate = self.calibration.source() == CalibrationSource::DetectedLandmark;
        let (width, height) = (self.viewport.image_width, self.viewport.image_height);
        let mut nasal_seen = false;
        let (mut start_seen, mut end_seen) = (false, false);
        for landmark in &landmarks {
            let Some(role) = landmark.kind.anchor_role(canthi_calibrate) else {
                continue;
            };
            nasal_seen |= role == AnchorRole::NasalReference;
            start_seen |= role == AnchorRole::CalibrationStart;
            end_seen |= role == AnchorRole::CalibrationEnd;
            self.anchors.seed(role, landmark.position.to_image(width, height), landmark.confidence);
        }
        if start_seen && end_seen {
            self.confirm_calibration();
        }

        if !nasal_seen {
            let left = self.anchors.position(AnchorRole::PupilLeft);
            let right = self.anchors.position(AnchorRole::PupilRight);
            if let (Some(left), Some(right)) = (left, right) {
                self.anchors.seed(AnchorRole::NasalReference, left.midpoint(&right), 0.0);
            }
        }
        if self.anchors.has_glasses() {
            // Re-drop the frame anchors below the detected pupils
            self.anchors.set_glasses_mode(false, self.config.frame_drop_fraction);
            self.anchors.set_glasses_mode(true, self.config.frame_drop_fraction);
        }

        self.detection_warnings
            .retain(|w| !matches!(w, EngineWarning::DetectionUnavailable { .. }));
        log::info!("applied {} detected landmarks", landmarks.len());
        self.recompute();
        true
    }

    /// Snapshot for the renderer
    pub fn overlay_frame(&self) -> OverlayFrame {
        OverlayFrame::build(&self.viewport, &self.anchors, self.config.hit_radius_px)
    }

    /// Freeze the current measurement and hand it to the sink
    pub fn commit(&self) -> CommittedMeasurement {
        let warnings = self.warnings();
        let committed = CommittedMeasurement {
            session_id: self.session_id,
            committed_at_ms: now_ms(),
            result: self.result.clone(),
            anchors: self.anchors.clone(),
            calibration: CalibrationMetadata {
                source: self.calibration.source(),
                reference_kind: self.calibration.source().reference_kind(),
                real_world_distance_mm: self.reference.real_world_distance_mm,
                pixel_distance: self.reference.pixel_distance(&self.anchors).ok(),
                scale_mm_per_pixel: self.last_valid_scale,
                confirmed: self.calibration_confirmed,
                warnings,
            },
        };
        log::info!(
            "committed measurement {}: pd {:.1}mm (calibrated: {})",
            committed.session_id,
            committed.result.pd_binocular,
            committed.result.calibration_used
        );
        if let Some(sink) = &self.sink {
            sink.on_commit(&committed);
        }
        committed
    }
}

/// Lifecycle owner: one engine per loaded image
pub struct MeasurementSession {
    config: EngineConfig,
    detector: Arc<dyn LandmarkDetector>,
    sink: Option<Arc<dyn MeasurementSink>>,
    engine: Option<MeasurementEngine>,
    pending_detection: Option<DetectionTask>,
}

impl MeasurementSession {
    pub fn new(config: EngineConfig, detector: Arc<dyn LandmarkDetector>) -> Self {
        Self { config, detector, sink: None, engine: None, pending_detection: None }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn engine(&self) -> Option<&MeasurementEngine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut MeasurementEngine> {
        self.engine.as_mut()
    }

    /// Whether a detection result is still outstanding
    pub fn detection_pending(&self) -> bool {
        self.pending_detection.is_some()
    }

    /// Start a new measurement for `image`, replacing any previous one
    ///
    /// Blocks for at most the configured detection timeout. If detection has
    /// not finished by then, heuristic anchors are used and the result is
    /// applied later from [`MeasurementSession::tick`] if still allowed.
    pub fn load_image(
        &mut self,
        image: ImageInfo,
        source: CalibrationSource,
    ) -> &mut MeasurementEngine {
        self.reset();

        let mut engine = MeasurementEngine::new(image, source, self.config.clone());
        if let Some(sink) = &self.sink {
            engine = engine.with_sink(Arc::clone(sink));
        }

        let mut task = DetectionTask::spawn(Arc::clone(&self.detector), image);
        match task.wait(self.config.detection_timeout()) {
            DetectionPoll::Ready(detection) => {
                engine.apply_detection(detection);
            }
            DetectionPoll::Pending => {
                let timeout = DetectionError::Timeout(self.config.detection_timeout());
                engine.mark_detection_unavailable(&timeout);
                self.pending_detection = Some(task);
            }
        }

        self.engine.insert(engine)
    }

    /// Drop the current engine and any outstanding detection
    ///
    /// A detector still running is not interrupted; its result is discarded.
    pub fn reset(&mut self) {
        if let Some(engine) = self.engine.take() {
            log::info!("session {} reset", engine.session_id());
        }
        if let Some(task) = self.pending_detection.take() {
            if task.worker_running() {
                log::warn!("landmark detector still running at reset; its result will be dropped");
            }
        }
    }

    /// Check for a late detection result without blocking
    pub fn poll_detection(&mut self) -> bool {
        let (Some(task), Some(engine)) = (self.pending_detection.as_mut(), self.engine.as_mut())
        else {
            return false;
        };
        match task.poll() {
            DetectionPoll::Pending => false,
            DetectionPoll::Ready(detection) => {
                self.pending_detection = None;
                engine.apply_detection(detection)
            }
        }
    }

    /// Animation frame: inertial panning plus late detection
    pub fn tick(&mut self, delta_time: Duration) -> InteractionOutcome {
        self.poll_detection();
        self.engine.as_mut().map_or(InteractionOutcome::None, |engine| engine.tick(delta_time))
    }

    pub fn pointer_down(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
    ) -> InteractionOutcome {
        self.engine
            .as_mut()
            .map_or(InteractionOutcome::None, |e| e.pointer_down(position, timestamp_ms))
    }

    pub fn pointer_move(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
    ) -> InteractionOutcome {
        self.engine
            .as_mut()
            .map_or(InteractionOutcome::None, |e| e.pointer_move(position, timestamp_ms))
    }

    pub fn pointer_up(&mut self, position: ViewportPoint, timestamp_ms: f64) -> InteractionOutcome {
        self.engine
            .as_mut()
            .map_or(InteractionOutcome::None, |e| e.pointer_up(position, timestamp_ms))
    }

    pub fn wheel(&mut self, position: ViewportPoint, delta: f64) -> InteractionOutcome {
        self.engine.as_mut().map_or(InteractionOutcome::None, |e| e.wheel(position, delta))
    }

    /// Commit the current measurement, if an image is loaded
    pub fn commit(&self) -> Option<CommittedMeasurement> {
        self.engine.as_ref().map(MeasurementEngine::commit)
    }
}
