//! Resize gesture orchestration.
//!
//! [`ResizeGestureHandler`] lives on the input thread. It gates and routes
//! pointer events to the drag and pinch handlers, applies their live feedback
//! as surface transforms, and on release posts the final rectangle to the
//! coordinator. [`ResizeTransitionHook`] is its coordinator-side half: it
//! turns that rectangle into an animated resize and reports completion back.

use std::{fmt::Write as _, sync::Arc, time::Instant};

use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};

use crate::{
    bounds::{BoundsState, PipSnapshot},
    config::PipConfig,
    display::DisplayLayout,
    drag::{CtrlType, DragResizeHandler},
    geom::Rect,
    input::{Action, GestureOutcome, InputMonitor, MotionEvent},
    pinch::{PinchResizeHandler, elastic_snap},
    runtime::{Command, ControlOutbox, InputControl},
    scheduler::{Scheduler, SurfaceTransformer},
    services::{PerfHintService, PerfSession, SurfaceService},
    snap,
    transition::{
        BoundsChangeKind, PipState, TransitionChange, TransitionExtras, TransitionRequests,
    },
};

/// Tag for the perf session held during a pinch.
pub const PINCH_PERF_TAG: &str = "pinch-resize";

/// Which gesture holds the single active slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ActiveGesture {
    /// No gesture in progress.
    #[default]
    None,
    /// A corner drag owns the input.
    Drag,
    /// A pinch owns the input.
    Pinch,
}

/// Input-thread gesture orchestrator.
pub struct ResizeGestureHandler {
    /// Corner drags may start.
    drag_enabled: bool,
    /// Pinches may start.
    pinch_enabled: bool,
    /// Pinch releases above this fraction of max snap to max.
    auto_max_ratio: f32,
    /// Latest coordinator state.
    snapshot: PipSnapshot,
    /// Corner-drag state.
    drag: DragResizeHandler,
    /// Pinch state.
    pinch: PinchResizeHandler,
    /// Gesture that owns the input, if any.
    active: ActiveGesture,
    /// A resize was posted and the coordinator has not answered.
    waiting_for_bounds_change: bool,
    /// Source of perf sessions.
    perf: Arc<dyn PerfHintService>,
    /// Held while a pinch runs.
    perf_session: Option<Box<dyn PerfSession>>,
    /// Bumped per perf session so stale timeouts are ignored.
    perf_generation: u64,
    /// Applies previews to the leash.
    transformer: SurfaceTransformer,
    /// Coordinator command channel.
    commands: Sender<Command>,
    /// Back channel to this thread, for perf timeouts.
    control: Sender<InputControl>,
}

impl ResizeGestureHandler {
    /// `control` is used only to report perf-session timeouts back to the
    /// input thread itself.
    pub fn new(
        config: &PipConfig,
        surface: Arc<dyn SurfaceService>,
        perf: Arc<dyn PerfHintService>,
        commands: Sender<Command>,
        control: Sender<InputControl>,
    ) -> Self {
        Self {
            drag_enabled: config.drag_resize_enabled,
            pinch_enabled: config.pinch_resize_enabled,
            auto_max_ratio: config.pinch_auto_max_ratio,
            snapshot: PipSnapshot::default(),
            drag: DragResizeHandler::new(config.drag_corner_size, config.touch_slop),
            pinch: PinchResizeHandler::new(),
            active: ActiveGesture::None,
            waiting_for_bounds_change: false,
            perf,
            perf_session: None,
            perf_generation: 0,
            transformer: SurfaceTransformer::new(surface),
            commands,
            control,
        }
    }

    /// Adopt the latest coordinator state.
    pub fn update_snapshot(&mut self, snapshot: PipSnapshot) {
        self.snapshot = snapshot;
    }

    /// Latest coordinator state.
    pub fn snapshot(&self) -> &PipSnapshot {
        &self.snapshot
    }

    /// Gesture that owns the input.
    pub fn active_gesture(&self) -> ActiveGesture {
        self.active
    }

    /// True between posting a resize and the coordinator's answer.
    pub fn is_waiting_for_bounds_change(&self) -> bool {
        self.waiting_for_bounds_change
    }

    /// True while a perf session is held.
    pub fn has_perf_session(&self) -> bool {
        self.perf_session.is_some()
    }

    /// Edges of the current drag, `NONE` when no drag is armed.
    pub fn drag_ctrl(&self) -> CtrlType {
        self.drag.ctrl()
    }

    /// Whether either handler still allows its gesture.
    pub fn is_gesture_allowed(&self) -> bool {
        self.drag.is_allowed() || self.pinch.is_allowed()
    }

    /// Whether the overlay is in a state that takes gestures.
    fn accepts_input(&self) -> bool {
        let s = &self.snapshot;
        if !self.drag_enabled && !self.pinch_enabled {
            return false;
        }
        if !s.in_pip || s.input_suppressed || s.stashed {
            trace!(
                in_pip = s.in_pip,
                suppressed = s.input_suppressed,
                stashed = s.stashed,
                "resize_input_gated"
            );
            return false;
        }
        if self.waiting_for_bounds_change {
            trace!("resize_waiting_for_bounds_change");
            return false;
        }
        true
    }

    /// Whether `ev` would claim the free gesture slot.
    pub fn will_start_resize_gesture(&self, ev: &MotionEvent) -> bool {
        if self.active != ActiveGesture::None || !self.accepts_input() {
            return false;
        }
        let b = self.snapshot.bounds;
        match ev.action {
            Action::Down => {
                self.drag_enabled
                    && ev
                        .point(0)
                        .is_some_and(|p| self.drag.is_within_drag_region(b, p.x, p.y))
            }
            Action::PointerDown => {
                self.pinch_enabled
                    && ev.pointer_count() == 2
                    && ev.pointers.iter().all(|p| b.contains_f(p.pos))
            }
            _ => false,
        }
    }

    /// Route `ev` to the active gesture, or start one.
    pub fn on_input_event(&mut self, ev: &MotionEvent, monitor: &InputMonitor) {
        let outcome = match self.active {
            ActiveGesture::Drag => self.drag.on_event(ev, &self.snapshot),
            ActiveGesture::Pinch => self.pinch.on_event(ev, &self.snapshot),
            ActiveGesture::None => {
                if !self.will_start_resize_gesture(ev) {
                    return;
                }
                if ev.action == Action::Down {
                    self.active = ActiveGesture::Drag;
                    self.drag.on_event(ev, &self.snapshot)
                } else {
                    let outcome = self.pinch.on_event(ev, &self.snapshot);
                    if !self.pinch.is_allowed() {
                        return;
                    }
                    self.active = ActiveGesture::Pinch;
                    monitor.pilfer_pointers();
                    self.start_perf_session();
                    outcome
                }
            }
        };
        self.apply(outcome, monitor);
    }

    /// Act on what a gesture handler returned.
    fn apply(&mut self, outcome: GestureOutcome, monitor: &InputMonitor) {
        match outcome {
            GestureOutcome::Ignored | GestureOutcome::Tracking => {}
            GestureOutcome::Preview {
                bounds,
                angle,
                pilfer,
            } => {
                if pilfer {
                    monitor.pilfer_pointers();
                }
                if let Some(leash) = self.snapshot.leash {
                    self.transformer
                        .apply_user_resize(leash, self.snapshot.bounds, bounds, angle);
                }
            }
            GestureOutcome::Rejected => {
                if let Some(leash) = self.snapshot.leash {
                    self.transformer.reset(leash, self.snapshot.bounds);
                }
            }
            GestureOutcome::Finished => self.finish_resize(),
        }
    }

    /// End the active gesture.
    ///
    /// Gesture state is always reset. If the gesture produced bounds, they
    /// are snapped (elastically for a pinch, then flush to the nearer side
    /// edge), placed by snap fraction and posted to the coordinator.
    pub fn finish_resize(&mut self) {
        let last = match self.active {
            ActiveGesture::Drag => self.drag.last_resize_bounds(),
            ActiveGesture::Pinch => self.pinch.last_resize_bounds(),
            ActiveGesture::None => None,
        };
        let was_pinch = self.active == ActiveGesture::Pinch;
        self.reset_gestures();
        let Some(mut bounds) = last else {
            trace!("finish_resize_empty");
            self.close_perf_session();
            return;
        };
        let s = self.snapshot;
        if was_pinch {
            bounds = elastic_snap(bounds, s.min_size, s.max_size, self.auto_max_ratio);
        }
        let movement = s.movement_bounds(bounds);
        bounds = snap::snap_to_horizontal_edge(bounds, movement);
        let fraction = snap::snap_fraction(bounds, movement);
        bounds = snap::apply_snap_fraction(bounds, movement, fraction);
        debug!(%bounds, fraction, pinch = was_pinch, "finish_resize");
        if self.commands.send(Command::ScheduleResize { bounds }).is_err() {
            warn!("coordinator_gone");
            self.close_perf_session();
            return;
        }
        self.waiting_for_bounds_change = true;
    }

    /// Drop all gesture state.
    fn reset_gestures(&mut self) {
        self.drag.reset();
        self.pinch.reset();
        self.active = ActiveGesture::None;
    }

    /// Hold a perf session for the pinch, if not already held.
    fn start_perf_session(&mut self) {
        if self.perf_session.is_some() {
            return;
        }
        self.perf_generation += 1;
        let generation = self.perf_generation;
        let control = self.control.clone();
        // Runs on the perf service's thread; blocks until the input thread
        // has room so the expiry is never dropped.
        let timeout = Box::new(move || {
            if control.send(InputControl::PerfTimeout(generation)).is_err() {
                trace!(generation, "perf_timeout_after_shutdown");
            }
        });
        self.perf_session = self.perf.start_session(timeout, PINCH_PERF_TAG);
        trace!(generation, started = self.perf_session.is_some(), "perf_session_start");
    }

    /// Release the perf session, if held.
    fn close_perf_session(&mut self) {
        if let Some(mut session) = self.perf_session.take() {
            session.close();
            trace!(generation = self.perf_generation, "perf_session_closed");
        }
    }

    /// The scheduled resize landed or was refused.
    pub fn on_resize_finished(&mut self) {
        self.waiting_for_bounds_change = false;
        self.reset_gestures();
        self.close_perf_session();
    }

    /// The overlay left: cancel everything in flight.
    pub fn on_exited_pip(&mut self) {
        self.waiting_for_bounds_change = false;
        self.reset_gestures();
        self.close_perf_session();
    }

    /// Close the perf session if `generation` is still current.
    pub fn on_perf_timeout(&mut self, generation: u64) {
        if generation == self.perf_generation && self.perf_session.is_some() {
            debug!(generation, "perf_session_timeout");
            self.close_perf_session();
        }
    }

    /// Apply a coordinator message. Returns false on shutdown.
    pub fn handle_control(&mut self, msg: InputControl) -> bool {
        match msg {
            InputControl::Snapshot(s) => self.update_snapshot(s),
            InputControl::ResizeFinished => self.on_resize_finished(),
            InputControl::ExitedPip => self.on_exited_pip(),
            InputControl::PerfTimeout(generation) => self.on_perf_timeout(generation),
            InputControl::Shutdown => return false,
        }
        true
    }
}

/// Coordinator-side reaction to gesture-driven bounds changes.
pub struct ResizeTransitionHook {
    /// Bounds of the resize animation awaiting completion.
    in_flight: Option<Rect>,
}

impl Default for ResizeTransitionHook {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeTransitionHook {
    /// Hook with no resize in flight.
    pub fn new() -> Self {
        Self { in_flight: None }
    }

    /// Start the animated resize for a `ScheduledBoundsChange` from a
    /// gesture.
    ///
    /// A result equal to the committed bounds is nudged one pixel vertically,
    /// toward the half of the screen the overlay is not in, so the transition
    /// pipeline still sees a bounds delta.
    pub fn on_transition(
        &mut self,
        change: &TransitionChange,
        state: &BoundsState,
        display: &DisplayLayout,
        scheduler: &mut Scheduler,
        outbox: &mut ControlOutbox,
        requests: &mut TransitionRequests,
    ) {
        if change.to == PipState::ExitedPip {
            self.in_flight = None;
            return;
        }
        let Some((mut bounds, duration)) = change.scheduled_bounds(BoundsChangeKind::UserResize)
        else {
            return;
        };
        if bounds == state.bounds() {
            let movement = state.movement_bounds(bounds, display);
            let dy = if snap::is_upper_half(snap::snap_fraction(bounds, movement)) {
                1
            } else {
                -1
            };
            bounds = bounds.offset(0, dy);
            debug!(%bounds, dy, "resize_nudged");
        }
        match scheduler.schedule_animate_resize(
            state,
            bounds,
            true,
            duration,
            BoundsChangeKind::UserResize,
        ) {
            Some(_) => {
                self.in_flight = Some(bounds);
                requests.push(
                    PipState::ChangingBounds,
                    TransitionExtras::BoundsChange {
                        bounds,
                        duration,
                        kind: BoundsChangeKind::UserResize,
                    },
                );
            }
            None => {
                outbox.send(InputControl::ResizeFinished);
                requests.push(change.from, TransitionExtras::None);
            }
        }
    }

    /// The animated resize landed at `to`: cache it as the user's size,
    /// release the input thread and settle the surface.
    pub fn on_resize_animation_finished(
        &mut self,
        from: Rect,
        to: Rect,
        state: &mut BoundsState,
        scheduler: &mut Scheduler,
        outbox: &mut ControlOutbox,
        now: Instant,
    ) {
        self.in_flight = None;
        state.set_user_resize_bounds(to);
        state.set_has_user_resized(true);
        outbox.send(InputControl::ResizeFinished);
        scheduler.schedule_finish_resize(from, to, now);
    }

    /// Append a human-readable description to `out`.
    pub fn dump(&self, out: &mut String, prefix: &str) {
        let _ = writeln!(out, "{prefix}ResizeTransitionHook");
        match self.in_flight {
            Some(b) => {
                let _ = writeln!(out, "{prefix}  in_flight={b}");
            }
            None => {
                let _ = writeln!(out, "{prefix}  in_flight=none");
            }
        }
    }
}
