//! Pointer, touch and wheel handling
//!
//! Translates raw input into anchor drags, canvas panning, anchored zoom and
//! inertial panning after release:
//! - Pointer down near a draggable anchor starts dragging it
//! - Pointer down elsewhere pans the canvas and tracks a smoothed velocity
//! - Releasing a fast pan continues it inertially, decaying every tick
//! - Wheel and pinch zoom keep the image point under the cursor (or pinch
//!   midpoint) fixed on screen
//!
//! Handlers may fire before the image is laid out. Against a viewport that is
//! not ready they do nothing.

use crate::anchor::AnchorSet;
use crate::config::EngineConfig;
use crate::geometry::{ImagePoint, ViewportPoint};
use crate::transform::Viewport;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pan velocity in viewport pixels per millisecond
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
}

impl Velocity {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn speed(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// Controller state
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    DraggingAnchor(String),
    Panning,
    InertialPanning(Velocity),
    Pinching,
}

/// What a handled event changed
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    None,
    ViewportChanged,
    AnchorMoved(String),
}

impl InteractionOutcome {
    pub fn is_none(&self) -> bool {
        matches!(self, InteractionOutcome::None)
    }
}

/// One active touch contact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub id: u64,
    pub position: ViewportPoint,
}

#[derive(Debug, Clone, Copy)]
struct PointerSample {
    position: ViewportPoint,
    timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct PinchTrack {
    distance: f64,
    midpoint: ViewportPoint,
}

impl PinchTrack {
    fn from_touches(a: &TouchPoint, b: &TouchPoint) -> Self {
        Self {
            distance: a.position.distance_to(&b.position),
            midpoint: a.position.midpoint(&b.position),
        }
    }
}

/// Input state machine for one engine
#[derive(Debug, Clone)]
pub struct InteractionController {
    config: EngineConfig,
    state: InteractionState,
    last_pointer: Option<PointerSample>,
    /// Time of the last pointer sample that actually moved
    last_motion_ms: f64,
    velocity: Velocity,
    /// Anchor position minus pointer position at grab time (image space)
    grab_offset: (f64, f64),
    pinch: Option<PinchTrack>,
}

impl InteractionController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: InteractionState::Idle,
            last_pointer: None,
            last_motion_ms: 0.0,
            velocity: Velocity::default(),
            grab_offset: (0.0, 0.0),
            pinch: None,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Current velocity estimate while panning
    pub fn velocity(&self) -> Velocity {
        match &self.state {
            InteractionState::InertialPanning(velocity) => *velocity,
            _ => self.velocity,
        }
    }

    /// Anchor grab radius in image pixels for the current view
    ///
    /// The configured radius is in viewport pixels, the same size the overlay
    /// draws handles at, so it shrinks in image space as the view zooms in.
    pub fn hit_radius(&self, viewport: &Viewport) -> f64 {
        viewport.viewport_length_to_image(self.config.hit_radius_px)
    }

    fn reset_tracking(&mut self) {
        self.last_pointer = None;
        self.velocity = Velocity::default();
        self.pinch = None;
    }

    /// Primary pointer pressed
    pub fn pointer_down(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
        viewport: &Viewport,
        anchors: &AnchorSet,
    ) -> InteractionOutcome {
        if !viewport.is_ready() {
            log::debug!("pointer_down ignored: viewport not ready");
            return InteractionOutcome::None;
        }

        if let InteractionState::InertialPanning(_) = self.state {
            log::debug!("inertial panning cancelled by pointer_down");
        }
        self.reset_tracking();

        let image_point = viewport.viewport_to_image(position);
        let radius = self.hit_radius(viewport);
        self.state = match anchors.hit_test(image_point, radius) {
            Some(anchor) => {
                self.grab_offset =
                    (anchor.position.x - image_point.x, anchor.position.y - image_point.y);
                InteractionState::DraggingAnchor(anchor.id.clone())
            }
            None => InteractionState::Panning,
        };

        self.last_pointer = Some(PointerSample { position, timestamp_ms });
        self.last_motion_ms = timestamp_ms;
        InteractionOutcome::None
    }

    /// Pointer moved (pressed or hovering)
    pub fn pointer_move(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
        viewport: &mut Viewport,
        anchors: &mut AnchorSet,
    ) -> InteractionOutcome {
        if !viewport.is_ready() {
            return InteractionOutcome::None;
        }

        match self.state.clone() {
            InteractionState::DraggingAnchor(id) => {
                self.last_pointer = Some(PointerSample { position, timestamp_ms });
                let pointer = viewport.viewport_to_image(position);
                let target = ImagePoint::new(
                    pointer.x + self.grab_offset.0,
                    pointer.y + self.grab_offset.1,
                );
                match anchors.move_anchor(&id, target) {
                    Ok(_) => InteractionOutcome::AnchorMoved(id),
                    Err(err) => {
                        log::warn!("drag aborted: {err}");
                        self.state = InteractionState::Idle;
                        InteractionOutcome::None
                    }
                }
            }
            InteractionState::Panning => self.pan_to(position, timestamp_ms, viewport),
            _ => InteractionOutcome::None,
        }
    }

    fn pan_to(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
        viewport: &mut Viewport,
    ) -> InteractionOutcome {
        let Some(last) = self.last_pointer else {
            self.last_pointer = Some(PointerSample { position, timestamp_ms });
            return InteractionOutcome::None;
        };

        let dx = position.x - last.position.x;
        let dy = position.y - last.position.y;
        self.last_pointer = Some(PointerSample { position, timestamp_ms });
        if dx == 0.0 && dy == 0.0 {
            return InteractionOutcome::None;
        }

        viewport.pan_by(dx, dy);

        let dt = timestamp_ms - last.timestamp_ms;
        if dt > 0.0 {
            let alpha = self.config.velocity_smoothing;
            self.velocity = Velocity::new(
                alpha * (dx / dt) + (1.0 - alpha) * self.velocity.x,
                alpha * (dy / dt) + (1.0 - alpha) * self.velocity.y,
            );
        }
        self.last_motion_ms = timestamp_ms;
        InteractionOutcome::ViewportChanged
    }

    /// Primary pointer released
    pub fn pointer_up(
        &mut self,
        position: ViewportPoint,
        timestamp_ms: f64,
        viewport: &mut Viewport,
        anchors: &mut AnchorSet,
    ) -> InteractionOutcome {
        let outcome = self.pointer_move(position, timestamp_ms, viewport, anchors);

        self.state = match self.state {
            InteractionState::Panning => {
                let resting_ms = timestamp_ms - self.last_motion_ms;
                if resting_ms > self.config.release_stale_ms {
                    self.velocity = Velocity::default();
                }
                if self.velocity.speed() > self.config.inertia_start_speed {
                    log::debug!("inertial panning at {:.3}px/ms", self.velocity.speed());
                    InteractionState::InertialPanning(self.velocity)
                } else {
                    InteractionState::Idle
                }
            }
            InteractionState::InertialPanning(velocity) => {
                InteractionState::InertialPanning(velocity)
            }
            _ => InteractionState::Idle,
        };
        self.last_pointer = None;
        outcome
    }

    /// Pointer capture lost; abandon whatever was in progress
    pub fn cancel(&mut self) {
        self.state = InteractionState::Idle;
        self.reset_tracking();
    }

    /// Advance inertial panning by one animation frame
    pub fn tick(&mut self, delta_time: Duration, viewport: &mut Viewport) -> InteractionOutcome {
        let InteractionState::InertialPanning(velocity) = self.state else {
            return InteractionOutcome::None;
        };
        if !viewport.is_ready() {
            self.state = InteractionState::Idle;
            return InteractionOutcome::None;
        }

        let dt_ms = delta_time.as_secs_f64() * 1000.0;
        viewport.pan_by(velocity.x * dt_ms, velocity.y * dt_ms);

        let decay = self.config.inertia_decay;
        let decayed = Velocity::new(velocity.x * decay, velocity.y * decay);
        self.state = if decayed.speed() < self.config.inertia_stop_speed {
            self.velocity = Velocity::default();
            InteractionState::Idle
        } else {
            InteractionState::InertialPanning(decayed)
        };
        InteractionOutcome::ViewportChanged
    }

    /// Wheel/scroll zoom anchored at the cursor
    ///
    /// `delta` is in notches; positive zooms in.
    pub fn wheel(
        &mut self,
        position: ViewportPoint,
        delta: f64,
        viewport: &mut Viewport,
    ) -> InteractionOutcome {
        if !viewport.is_ready() || !delta.is_finite() {
            return InteractionOutcome::None;
        }
        let factor = self.config.wheel_zoom_step.powf(delta);
        self.zoom_about(position, viewport.zoom * factor, viewport)
    }

    fn zoom_about(
        &self,
        anchor: ViewportPoint,
        zoom: f64,
        viewport: &mut Viewport,
    ) -> InteractionOutcome {
        if viewport.zoom_at(anchor, zoom, self.config.min_zoom, self.config.max_zoom) {
            InteractionOutcome::ViewportChanged
        } else {
            InteractionOutcome::None
        }
    }

    /// Zoom in one step around the viewport center
    pub fn zoom_in(&mut self, viewport: &mut Viewport) -> InteractionOutcome {
        let target = viewport.zoom * self.config.button_zoom_step;
        self.zoom_about(viewport.center(), target, viewport)
    }

    /// Zoom out one step around the viewport center
    pub fn zoom_out(&mut self, viewport: &mut Viewport) -> InteractionOutcome {
        let target = viewport.zoom / self.config.button_zoom_step;
        self.zoom_about(viewport.center(), target, viewport)
    }

    /// Back to the fitted view, stopping any motion
    pub fn reset_view(&mut self, viewport: &mut Viewport) -> InteractionOutcome {
        self.cancel();
        viewport.reset_view();
        InteractionOutcome::ViewportChanged
    }

    /// Touch contacts began. `touches` holds every active contact.
    pub fn touch_start(
        &mut self,
        touches: &[TouchPoint],
        timestamp_ms: f64,
        viewport: &Viewport,
        anchors: &AnchorSet,
    ) -> InteractionOutcome {
        match touches {
            [] => InteractionOutcome::None,
            [single] => self.pointer_down(single.position, timestamp_ms, viewport, anchors),
            [a, b, ..] => {
                if !viewport.is_ready() {
                    return InteractionOutcome::None;
                }
                self.reset_tracking();
                self.pinch = Some(PinchTrack::from_touches(a, b));
                self.state = InteractionState::Pinching;
                InteractionOutcome::None
            }
        }
    }

    /// Touch contacts moved. `touches` holds every active contact.
    pub fn touch_move(
        &mut self,
        touches: &[TouchPoint],
        timestamp_ms: f64,
        viewport: &mut Viewport,
        anchors: &mut AnchorSet,
    ) -> InteractionOutcome {
        match touches {
            [] => InteractionOutcome::None,
            [single] => {
                if self.state == InteractionState::Pinching {
                    return InteractionOutcome::None;
                }
                self.pointer_move(single.position, timestamp_ms, viewport, anchors)
            }
            [a, b, ..] => {
                if !viewport.is_ready() || self.state != InteractionState::Pinching {
                    return InteractionOutcome::None;
                }
                let Some(previous) = self.pinch else {
                    return InteractionOutcome::None;
                };
                let current = PinchTrack::from_touches(a, b);
                self.pinch = Some(current);

                // Two-finger pan follows the midpoint, then zoom around it
                viewport.pan_by(
                    current.midpoint.x - previous.midpoint.x,
                    current.midpoint.y - previous.midpoint.y,
                );
                if previous.distance > 0.0 && current.distance > 0.0 {
                    let target = viewport.zoom * (current.distance / previous.distance);
                    viewport.zoom_at(
                        current.midpoint,
                        target,
                        self.config.min_zoom,
                        self.config.max_zoom,
                    );
                }
                InteractionOutcome::ViewportChanged
            }
        }
    }

    /// Touch contacts ended. `remaining` holds the contacts still down.
    pub fn touch_end(
        &mut self,
        ended: &TouchPoint,
        remaining: &[TouchPoint],
        timestamp_ms: f64,
        viewport: &mut Viewport,
        anchors: &mut AnchorSet,
    ) -> InteractionOutcome {
        if self.state == InteractionState::Pinching {
            if remaining.len() < 2 {
                // Lifting one finger of a pinch must not turn into a pan jump
                self.state = InteractionState::Idle;
                self.reset_tracking();
            }
            return InteractionOutcome::None;
        }

        if remaining.is_empty() {
            self.pointer_up(ended.position, timestamp_ms, viewport, anchors)
        } else {
            InteractionOutcome::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, AnchorRole};
    use crate::overlay::OverlayFrame;

    fn setup() -> (InteractionController, Viewport, AnchorSet) {
        // 1000x1000 image in a 1000x1000 container: fit scale 1, image == viewport at zoom 1
        let viewport = Viewport::new(1000.0, 1000.0, 1000.0, 1000.0);
        let mut anchors = AnchorSet::new(1000.0, 1000.0);
        anchors.insert(Anchor::new(AnchorRole::PupilLeft, ImagePoint::new(400.0, 400.0), 0.0));
        anchors.insert(Anchor::new(AnchorRole::PupilRight, ImagePoint::new(600.0, 400.0), 0.0));
        (InteractionController::new(EngineConfig::default()), viewport, anchors)
    }

    fn vp(x: f64, y: f64) -> ViewportPoint {
        ViewportPoint::new(x, y)
    }

    #[test]
    fn test_drag_anchor() {
        let (mut ctl, mut viewport, mut anchors) = setup();

        ctl.pointer_down(vp(405.0, 398.0), 0.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::DraggingAnchor("pupil-left".to_string()));

        let outcome = ctl.pointer_move(vp(425.0, 408.0), 16.0, &mut viewport, &mut anchors);
        assert_eq!(outcome, InteractionOutcome::AnchorMoved("pupil-left".to_string()));
        // Grab offset preserved: anchor moved by the pointer delta
        assert_eq!(anchors.position(AnchorRole::PupilLeft), Some(ImagePoint::new(420.0, 410.0)));
        assert!(anchors.manually_adjusted());

        ctl.pointer_up(vp(425.0, 408.0), 32.0, &mut viewport, &mut anchors);
        assert_eq!(ctl.state(), &InteractionState::Idle);
        assert_eq!(viewport.pan_x, 0.0);
    }

    #[test]
    fn test_drag_uses_viewport_to_image_when_zoomed() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        viewport.zoom_at(vp(400.0, 400.0), 2.0, 0.1, 10.0);

        let on_screen = viewport.image_to_viewport(ImagePoint::new(400.0, 400.0));
        ctl.pointer_down(on_screen, 0.0, &viewport, &anchors);
        ctl.pointer_move(vp(on_screen.x + 20.0, on_screen.y), 10.0, &mut viewport, &mut anchors);

        let moved = anchors.position(AnchorRole::PupilLeft).unwrap();
        assert!((moved.x - 410.0).abs() < 1e-9);
        assert!((moved.y - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_pan_elsewhere() {
        let (mut ctl, mut viewport, mut anchors) = setup();

        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::Panning);

        let outcome = ctl.pointer_move(vp(130.0, 90.0), 10.0, &mut viewport, &mut anchors);
        assert_eq!(outcome, InteractionOutcome::ViewportChanged);
        assert_eq!((viewport.pan_x, viewport.pan_y), (30.0, -10.0));
        assert!(!anchors.manually_adjusted());
    }

    #[test]
    fn test_fast_release_starts_inertia_then_decays_to_idle() {
        let (mut ctl, mut viewport, mut anchors) = setup();

        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        for i in 1..=5 {
            let t = i as f64 * 10.0;
            ctl.pointer_move(vp(100.0 + 20.0 * i as f64, 100.0), t, &mut viewport, &mut anchors);
        }
        ctl.pointer_up(vp(200.0, 100.0), 50.0, &mut viewport, &mut anchors);

        let InteractionState::InertialPanning(velocity) = ctl.state().clone() else {
            panic!("expected inertial panning, got {:?}", ctl.state());
        };
        assert!(velocity.x > 1.0);

        let pan_at_release = viewport.pan_x;
        let frame = Duration::from_millis(16);
        let mut ticks = 0;
        while ctl.state() != &InteractionState::Idle {
            assert_eq!(ctl.tick(frame, &mut viewport), InteractionOutcome::ViewportChanged);
            ticks += 1;
            assert!(ticks < 1_000, "inertia never settled");
        }
        assert!(viewport.pan_x > pan_at_release);
        assert_eq!(ctl.tick(frame, &mut viewport), InteractionOutcome::None);
    }

    #[test]
    fn test_inertia_velocity_decays_by_factor_per_tick() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        ctl.pointer_move(vp(150.0, 100.0), 10.0, &mut viewport, &mut anchors);
        ctl.pointer_up(vp(150.0, 100.0), 10.0, &mut viewport, &mut anchors);

        let before = ctl.velocity();
        ctl.tick(Duration::from_millis(16), &mut viewport);
        let after = ctl.velocity();
        assert!((after.x - before.x * 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_slow_release_goes_idle() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        ctl.pointer_move(vp(101.0, 100.0), 100.0, &mut viewport, &mut anchors);
        ctl.pointer_up(vp(101.0, 100.0), 110.0, &mut viewport, &mut anchors);
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn test_resting_before_release_discards_velocity() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        ctl.pointer_move(vp(200.0, 100.0), 10.0, &mut viewport, &mut anchors);
        ctl.pointer_up(vp(200.0, 100.0), 500.0, &mut viewport, &mut anchors);
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn test_pointer_down_cancels_inertia_and_hit_tests() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        ctl.pointer_down(vp(100.0, 100.0), 0.0, &viewport, &anchors);
        ctl.pointer_move(vp(200.0, 100.0), 10.0, &mut viewport, &mut anchors);
        ctl.pointer_up(vp(200.0, 100.0), 10.0, &mut viewport, &mut anchors);
        assert!(matches!(ctl.state(), InteractionState::InertialPanning(_)));

        // Grab the right pupil wherever it is now on screen
        let on_screen = viewport.image_to_viewport(ImagePoint::new(600.0, 400.0));
        ctl.pointer_down(on_screen, 20.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::DraggingAnchor("pupil-right".to_string()));

        let pan_before = viewport.pan_x;
        assert_eq!(ctl.tick(Duration::from_millis(16), &mut viewport), InteractionOutcome::None);
        assert_eq!(viewport.pan_x, pan_before);
    }

    #[test]
    fn test_wheel_zoom_is_anchored() {
        let (mut ctl, mut viewport, _) = setup();
        let cursor = vp(250.0, 700.0);
        let before = viewport.viewport_to_image(cursor);

        assert_eq!(ctl.wheel(cursor, 3.0, &mut viewport), InteractionOutcome::ViewportChanged);
        assert!((viewport.zoom - 1.1_f64.powi(3)).abs() < 1e-12);

        let after = viewport.viewport_to_image(cursor);
        assert!((after.x - before.x).abs() < 1e-9);
        assert!((after.y - before.y).abs() < 1e-9);
    }

    #[test]
    fn test_wheel_respects_zoom_limits() {
        let (mut ctl, mut viewport, _) = setup();
        for _ in 0..200 {
            ctl.wheel(vp(10.0, 10.0), 1.0, &mut viewport);
        }
        assert_eq!(viewport.zoom, 10.0);
        assert_eq!(ctl.wheel(vp(10.0, 10.0), 1.0, &mut viewport), InteractionOutcome::None);
    }

    #[test]
    fn test_hit_radius_scales_inversely_with_zoom() {
        let (ctl, mut viewport, _) = setup();
        let at_one = ctl.hit_radius(&viewport);
        let on_screen_at_one = viewport.image_length_to_viewport(at_one);

        viewport.zoom = 2.0;
        let at_two = ctl.hit_radius(&viewport);
        assert_eq!(at_two, at_one / 2.0);

        // The grab radius stays the same size on screen
        let on_screen_at_two = viewport.image_length_to_viewport(at_two);
        assert!((on_screen_at_two - on_screen_at_one).abs() < 1e-12);

        // A fixed image-space threshold renders twice as large at zoom 2
        let fixed = 12.0;
        viewport.zoom = 1.0;
        let rendered_one = viewport.image_length_to_viewport(fixed);
        viewport.zoom = 2.0;
        let rendered_two = viewport.image_length_to_viewport(fixed);
        assert!((rendered_two - 2.0 * rendered_one).abs() < 1e-12);
    }

    #[test]
    fn test_zoomed_in_hit_test_is_tighter_in_image_space() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        viewport.zoom_at(vp(400.0, 400.0), 4.0, 0.1, 10.0);

        // 8 image px away is 32 screen px at zoom 4: outside the 12px grab radius
        let near_miss = viewport.image_to_viewport(ImagePoint::new(408.0, 400.0));
        ctl.pointer_down(near_miss, 0.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::Panning);
        ctl.pointer_up(near_miss, 1.0, &mut viewport, &mut anchors);
    }

    #[test]
    fn test_grab_radius_matches_drawn_handle_on_downscaled_image() {
        // 4000x4000 image in a 1000x1000 container: fit scale 0.25
        let mut ctl = InteractionController::new(EngineConfig::default());
        let viewport = Viewport::new(1000.0, 1000.0, 4000.0, 4000.0);
        let mut anchors = AnchorSet::new(4000.0, 4000.0);
        anchors.insert(Anchor::new(AnchorRole::PupilLeft, ImagePoint::new(1000.0, 1600.0), 0.0));

        let handle = OverlayFrame::build(&viewport, &anchors, 12.0);
        let pupil = handle.anchor("pupil-left").unwrap();
        assert_eq!(pupil.position, vp(250.0, 400.0));
        assert_eq!(ctl.hit_radius(&viewport), 48.0);

        // 8px from the handle center is inside its 12px drawn radius
        ctl.pointer_down(vp(pupil.position.x + 8.0, pupil.position.y), 0.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::DraggingAnchor("pupil-left".to_string()));

        ctl.cancel();
        ctl.pointer_down(vp(pupil.position.x + 14.0, pupil.position.y), 1.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::Panning);
    }

    #[test]
    fn test_handlers_are_noops_when_not_ready() {
        let mut ctl = InteractionController::new(EngineConfig::default());
        let mut viewport = Viewport::new(0.0, 0.0, 1000.0, 1000.0);
        let mut anchors = AnchorSet::new(1000.0, 1000.0);
        anchors.insert(Anchor::new(AnchorRole::PupilLeft, ImagePoint::new(5.0, 5.0), 0.0));

        assert!(ctl.pointer_down(vp(5.0, 5.0), 0.0, &viewport, &anchors).is_none());
        assert!(ctl.pointer_move(vp(50.0, 5.0), 1.0, &mut viewport, &mut anchors).is_none());
        assert!(ctl.pointer_up(vp(50.0, 5.0), 2.0, &mut viewport, &mut anchors).is_none());
        assert!(ctl.wheel(vp(5.0, 5.0), 1.0, &mut viewport).is_none());
        assert!(ctl.tick(Duration::from_millis(16), &mut viewport).is_none());
        assert_eq!(ctl.state(), &InteractionState::Idle);
        assert_eq!(anchors.position(AnchorRole::PupilLeft), Some(ImagePoint::new(5.0, 5.0)));
    }

    #[test]
    fn test_pinch_zoom_anchored_at_midpoint() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        let start = [
            TouchPoint { id: 1, position: vp(400.0, 500.0) },
            TouchPoint { id: 2, position: vp(600.0, 500.0) },
        ];
        ctl.touch_start(&start, 0.0, &viewport, &anchors);
        assert_eq!(ctl.state(), &InteractionState::Pinching);

        let midpoint = vp(500.0, 500.0);
        let before = viewport.viewport_to_image(midpoint);

        let spread = [
            TouchPoint { id: 1, position: vp(300.0, 500.0) },
            TouchPoint { id: 2, position: vp(700.0, 500.0) },
        ];
        assert_eq!(
            ctl.touch_move(&spread, 16.0, &mut viewport, &mut anchors),
            InteractionOutcome::ViewportChanged
        );
        assert!((viewport.zoom - 2.0).abs() < 1e-12);

        let after = viewport.viewport_to_image(midpoint);
        assert!((after.x - before.x).abs() < 1e-9);
        assert!((after.y - before.y).abs() < 1e-9);

        // Lifting one finger ends the pinch without panning
        let pan = (viewport.pan_x, viewport.pan_y);
        ctl.touch_end(&spread[1], &spread[..1], 32.0, &mut viewport, &mut anchors);
        assert_eq!(ctl.state(), &InteractionState::Idle);
        let lone = [TouchPoint { id: 1, position: vp(100.0, 100.0) }];
        ctl.touch_move(&lone, 48.0, &mut viewport, &mut anchors);
        assert_eq!((viewport.pan_x, viewport.pan_y), pan);
    }

    #[test]
    fn test_two_finger_pan_follows_midpoint() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        let start = [
            TouchPoint { id: 1, position: vp(400.0, 500.0) },
            TouchPoint { id: 2, position: vp(600.0, 500.0) },
        ];
        ctl.touch_start(&start, 0.0, &viewport, &anchors);
        let shifted = [
            TouchPoint { id: 1, position: vp(450.0, 520.0) },
            TouchPoint { id: 2, position: vp(650.0, 520.0) },
        ];
        ctl.touch_move(&shifted, 16.0, &mut viewport, &mut anchors);
        assert_eq!((viewport.pan_x, viewport.pan_y), (50.0, 20.0));
        assert_eq!(viewport.zoom, 1.0);
    }

    #[test]
    fn test_single_touch_drags_anchor() {
        let (mut ctl, mut viewport, mut anchors) = setup();
        let touch = TouchPoint { id: 7, position: vp(600.0, 400.0) };
        ctl.touch_start(&[touch], 0.0, &viewport, &anchors);
        let moved = TouchPoint { id: 7, position: vp(610.0, 400.0) };
        ctl.touch_move(&[moved], 16.0, &mut viewport, &mut anchors);
        ctl.touch_end(&moved, &[], 32.0, &mut viewport, &mut anchors);

        assert_eq!(anchors.position(AnchorRole::PupilRight), Some(ImagePoint::new(610.0, 400.0)));
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }

    #[test]
    fn test_zoom_steps_and_reset() {
        let (mut ctl, mut viewport, _) = setup();
        ctl.zoom_in(&mut viewport);
        assert!((viewport.zoom - 1.25).abs() < 1e-12);
        ctl.zoom_out(&mut viewport);
        assert!((viewport.zoom - 1.0).abs() < 1e-12);

        viewport.pan_by(40.0, 40.0);
        ctl.reset_view(&mut viewport);
        assert_eq!((viewport.zoom, viewport.pan_x, viewport.pan_y), (1.0, 0.0, 0.0));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let (mut ctl, viewport, anchors) = setup();
        ctl.pointer_down(vp(400.0, 400.0), 0.0, &viewport, &anchors);
        ctl.cancel();
        assert_eq!(ctl.state(), &InteractionState::Idle);
    }
}
