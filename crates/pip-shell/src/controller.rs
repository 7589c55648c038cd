//! Coordinator-thread owner of all overlay state.
//!
//! [`PipController`] holds the lifecycle state machine, committed bounds, the
//! scheduler and the coordinator half of the gesture handler. Every
//! transition is dispatched through one hook that runs the built-in
//! components in a fixed order before any external listener:
//!
//! 1. scheduler (task tracking, non-gesture bounds changes, exit cleanup)
//! 2. resize hook (gesture bounds changes)
//! 3. lifecycle (in-pip stream, session reset, input-thread notification)

use std::{
    fmt::Write as _,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use pip_ids::TaskId;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::{
    aspect::AspectRatio,
    bounds::{BoundsState, PipSnapshot, default_size},
    config::PipConfig,
    display::DisplayLayout,
    geom::{Point, Rect, Size},
    resize::ResizeTransitionHook,
    runtime::{Command, ControlOutbox, InputControl, Services},
    scheduler::{PendingKind, Scheduler},
    services::WindowingService,
    snap,
    transition::{
        BoundsChangeKind, EnterParams, ExitKind, ListenerId, PipState, TransitionChange,
        TransitionExtras, TransitionListener, TransitionRequests, TransitionState,
    },
};

/// Snap fraction of the bottom-right corner of the movement bounds.
const DEFAULT_SNAP_FRACTION: f32 = 2.0;

/// Overlay chrome dimensions supplied by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourceDimensions {
    /// Radius of the rounded overlay corners, in pixels.
    pub corner_radius: i32,
    /// Radius of the drop shadow, in pixels.
    pub shadow_radius: i32,
}

/// Callback for resource-dimension changes.
pub type ResourceListener = Box<dyn FnMut(ResourceDimensions) + Send>;

/// Broadcast of the in-pip flag. New subscribers receive the current value
/// first; afterwards only changes are sent.
#[derive(Default)]
struct InPipStream {
    /// Last value sent.
    current: bool,
    /// Live receivers; dropped ones are pruned on send.
    subscribers: Vec<Sender<bool>>,
}

impl InPipStream {
    /// New receiver, primed with the current value.
    fn subscribe(&mut self) -> Receiver<bool> {
        let (tx, rx) = unbounded();
        let _ = tx.send(self.current);
        self.subscribers.push(tx);
        rx
    }

    /// Send `in_pip` to every subscriber if it changed.
    fn update(&mut self, in_pip: bool) {
        if in_pip == self.current {
            return;
        }
        self.current = in_pip;
        self.subscribers.retain(|s| s.send(in_pip).is_ok());
        debug!(in_pip, subscribers = self.subscribers.len(), "in_pip_changed");
    }
}

/// Coordinator state and command handling.
pub struct PipController {
    /// Validated at startup.
    config: PipConfig,
    /// Display the overlay lives on.
    display: DisplayLayout,
    /// Lifecycle state machine.
    transition: TransitionState,
    /// Committed geometry.
    bounds: BoundsState,
    /// Windowing and surface side effects.
    scheduler: Scheduler,
    /// Coordinator half of the resize gesture.
    hook: ResizeTransitionHook,
    /// Used to open the input monitor.
    windowing: Arc<dyn WindowingService>,
    /// Messages for the input thread.
    outbox: ControlOutbox,
    /// In-pip broadcast.
    in_pip: InPipStream,
    /// Gestures are ignored while set.
    input_suppressed: bool,
    /// Last chrome dimensions from the host.
    resources: Option<ResourceDimensions>,
    /// Notified with each new value of `resources`.
    resource_listeners: Vec<ResourceListener>,
    /// Last snapshot sent to the input thread.
    published: Option<PipSnapshot>,
}

impl PipController {
    /// Controller in `Undefined` with limits for the default aspect ratio.
    pub fn new(
        config: PipConfig,
        display: DisplayLayout,
        services: &Services,
        control: Sender<InputControl>,
    ) -> Self {
        let aspect = resolve_aspect(&config, None);
        Self {
            bounds: BoundsState::new(aspect, &display, &config),
            transition: TransitionState::new(config.max_reentrant_transitions),
            scheduler: Scheduler::new(
                services.windowing.clone(),
                services.surface.clone(),
                services.split.clone(),
                config.crossfade_duration(),
            ),
            hook: ResizeTransitionHook::new(),
            windowing: services.windowing.clone(),
            outbox: ControlOutbox::new(control),
            in_pip: InPipStream::default(),
            input_suppressed: false,
            resources: None,
            resource_listeners: Vec::new(),
            published: None,
            config,
            display,
        }
    }

    /// Apply one command. Returns false when the coordinator should stop.
    pub fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::EnterPip(params) => self.enter_pip(params),
            Command::ExitViaExpand => self.exit_via_expand(),
            Command::Remove { with_fade } => self.remove(with_fade),
            Command::DisplayChanged(layout) => self.on_display_changed(layout),
            Command::SetAspectRatio(ratio) => self.set_aspect_ratio(ratio),
            Command::SetFixedRotation(fixed) => self.transition.set_in_fixed_rotation(fixed),
            Command::SetNamedExclusionArea { name, area } => {
                self.bounds.set_named_exclusion_area(&name, area);
            }
            Command::SetInputSuppressed(suppressed) => self.set_input_suppressed(suppressed),
            Command::SetStashed(stashed) => self.set_stashed(stashed),
            Command::SetResourceDimensions(dims) => self.set_resource_dimensions(dims),
            Command::ScheduleResize { bounds } => self.schedule_resize(bounds),
            Command::TransitionFinished(token) => {
                if let Some(done) = self.scheduler.complete(token) {
                    self.on_transition_finished(done, Instant::now());
                    self.scheduler.acknowledge(token);
                }
            }
            Command::AttachInputMonitor { display, reply } => {
                let _ = reply.send(self.windowing.create_input_monitor(display));
            }
            Command::SubscribeInPip { reply } => {
                let _ = reply.send(self.subscribe_in_pip());
            }
            Command::AddListener { listener, reply } => {
                let _ = reply.send(self.add_listener(listener));
            }
            Command::RemoveListener(id) => {
                self.transition.remove_listener(id);
            }
            Command::AddExclusionObserver(observer) => self.bounds.add_exclusion_observer(observer),
            Command::AddResourceListener(listener) => self.add_resource_listener(listener),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Dump { reply } => {
                let mut out = String::new();
                self.dump(&mut out);
                let _ = reply.send(out);
            }
            Command::Shutdown => {
                info!("coordinator_shutdown_requested");
                return false;
            }
        }
        self.publish_snapshot();
        true
    }

    /// Dispatch a transition through the built-in components, then the
    /// registered listeners.
    fn set_state(&mut self, state: PipState, extras: TransitionExtras) {
        let Self {
            transition,
            bounds,
            scheduler,
            hook,
            outbox,
            in_pip,
            display,
            ..
        } = self;
        let display = &*display;
        let mut dispatch = |change: &TransitionChange, requests: &mut TransitionRequests| {
            scheduler.on_transition(change, bounds, requests);
            hook.on_transition(change, bounds, display, scheduler, outbox, requests);
            in_pip.update(change.to.is_in_pip());
            if change.to == PipState::ExitedPip {
                bounds.on_session_ended();
                outbox.send(InputControl::ExitedPip);
                requests.push(PipState::Undefined, TransitionExtras::None);
            }
        };
        transition.set_state_with(state, extras, &mut dispatch);
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> PipState {
        self.transition.state()
    }

    /// Committed geometry.
    pub fn bounds(&self) -> &BoundsState {
        &self.bounds
    }

    /// Display the overlay lives on.
    pub fn display(&self) -> &DisplayLayout {
        &self.display
    }

    /// Start a session for `params.task`.
    ///
    /// Entry bounds come from the task's saved reentry state when present,
    /// else the default size at the bottom-right of the movement bounds.
    pub fn enter_pip(&mut self, params: EnterParams) {
        if self.transition.is_in_pip() {
            debug!(task = %params.task.id, "enter_pip_already_in_pip");
            return;
        }
        let task = params.task.id;
        info!(%task, from_swipe = params.from_swipe, "enter_pip");
        if params.from_swipe {
            self.set_state(PipState::SwipingToPip, TransitionExtras::Enter(params.clone()));
        }
        self.set_state(PipState::EnteringPip, TransitionExtras::Enter(params.clone()));

        let aspect = resolve_aspect(&self.config, params.aspect_ratio);
        self.bounds
            .update_min_max_size(aspect, &self.display, &self.config);
        let entry = self.entry_bounds(task);
        self.bounds.set_bounds(entry);
        self.scheduler.submit_entry_bounds(task, entry);

        self.set_state(PipState::EnteredPip, TransitionExtras::Enter(params));
        self.bounds.clear_reentry_state();
    }

    /// Saved placement for `task` when present, else the default size in the
    /// bottom-right corner.
    fn entry_bounds(&self, task: TaskId) -> Rect {
        let reentry = self.bounds.reentry_state_for(task);
        let size = reentry
            .and_then(|r| r.size)
            .map(|s| self.bounds.constrain_size(s))
            .unwrap_or_else(|| {
                default_size(self.bounds.aspect_ratio(), &self.display, &self.config)
            });
        let fraction = reentry.map_or(DEFAULT_SNAP_FRACTION, |r| r.snap_fraction);
        self.place(size, fraction)
    }

    /// A rect of `size` at `fraction` along the current movement bounds.
    fn place(&self, size: Size, fraction: f32) -> Rect {
        let rect = Rect::from_origin_size(Point::new(0, 0), size);
        let movement = self.bounds.movement_bounds(rect, &self.display);
        snap::apply_snap_fraction(rect, movement, fraction)
    }

    /// Adopt a new display layout, re-placing the overlay at the same snap
    /// fraction with its size clamped to the new limits.
    pub fn on_display_changed(&mut self, layout: DisplayLayout) {
        if layout == self.display {
            trace!("display_unchanged");
            return;
        }
        let fraction = self.bounds.snap_fraction(&self.display);
        info!(%layout, "display_changed");
        self.display = layout;
        self.bounds
            .update_min_max_size(self.bounds.aspect_ratio(), &self.display, &self.config);
        if !self.transition.is_in_pip() {
            return;
        }
        if self.transition.is_in_fixed_rotation() {
            debug!("display_change_in_fixed_rotation");
            return;
        }
        if self.scheduler.has_pending_resize() {
            debug!("display_change_during_resize");
            return;
        }
        let size = self.bounds.constrain_size(self.bounds.bounds().size());
        let to = self.place(size, fraction);
        self.set_state(
            PipState::ScheduledBoundsChange,
            TransitionExtras::BoundsChange {
                bounds: to,
                duration: Duration::ZERO,
                kind: BoundsChangeKind::DisplayChange,
            },
        );
    }

    /// Aspect ratio requested by the app. Re-projects the current bounds
    /// when in PIP.
    pub fn set_aspect_ratio(&mut self, ratio: f32) {
        if AspectRatio::from_f32(ratio).is_none() {
            debug!(ratio, "aspect_ratio_invalid");
            return;
        }
        let aspect = resolve_aspect(&self.config, Some(ratio));
        if aspect == self.bounds.aspect_ratio() {
            trace!(%aspect, "aspect_ratio_unchanged");
            return;
        }
        let fraction = self.bounds.snap_fraction(&self.display);
        self.bounds
            .update_min_max_size(aspect, &self.display, &self.config);
        if !self.transition.is_in_pip() || self.scheduler.has_pending_resize() {
            return;
        }
        let size = self.bounds.constrain_size(self.bounds.bounds().size());
        let to = self.place(size, fraction);
        self.set_state(
            PipState::ScheduledBoundsChange,
            TransitionExtras::BoundsChange {
                bounds: to,
                duration: self.config.resize_snap_duration(),
                kind: BoundsChangeKind::Programmatic,
            },
        );
    }

    /// Final rectangle of a resize gesture. Refused resizes still release
    /// the input thread.
    pub fn schedule_resize(&mut self, bounds: Rect) {
        let in_pip = self.transition.is_in_pip();
        if !in_pip || self.scheduler.has_pending_resize() {
            debug!(%bounds, in_pip, "resize_refused");
            self.outbox.send(InputControl::ResizeFinished);
            return;
        }
        self.set_state(
            PipState::ScheduledBoundsChange,
            TransitionExtras::BoundsChange {
                bounds,
                duration: self.config.resize_snap_duration(),
                kind: BoundsChangeKind::UserResize,
            },
        );
    }

    /// Settle state once a windowing transition reported completion.
    fn on_transition_finished(&mut self, done: PendingKind, now: Instant) {
        match done {
            PendingKind::Resize { from, bounds, kind } => {
                debug!(%bounds, ?kind, "resize_landed");
                self.bounds.set_bounds(bounds);
                if kind == BoundsChangeKind::UserResize {
                    self.hook.on_resize_animation_finished(
                        from,
                        bounds,
                        &mut self.bounds,
                        &mut self.scheduler,
                        &mut self.outbox,
                        now,
                    );
                }
                self.set_state(PipState::EnteredPip, TransitionExtras::None);
            }
            PendingKind::Exit(kind) => {
                info!(?kind, "exit_landed");
                self.set_state(PipState::ExitedPip, TransitionExtras::Exit(kind));
            }
        }
    }

    /// Leave by expanding the task, into split screen when its host task is
    /// in a split layout.
    pub fn exit_via_expand(&mut self) {
        let Some(task) = self.exitable_task() else {
            return;
        };
        self.bounds.save_reentry_state(task, &self.display);
        let to_split = self.scheduler.exits_to_split();
        info!(%task, to_split, "exit_via_expand");
        self.set_state(
            PipState::ExitingPip,
            TransitionExtras::Exit(ExitKind::Expand { to_split }),
        );
        self.scheduler
            .schedule_exit_via_expand(&self.bounds, &self.display);
    }

    /// Dismiss the overlay.
    pub fn remove(&mut self, with_fade: bool) {
        let Some(task) = self.exitable_task() else {
            return;
        };
        self.bounds.save_reentry_state(task, &self.display);
        info!(%task, with_fade, "remove");
        self.set_state(PipState::ExitingPip, TransitionExtras::Exit(ExitKind::Remove));
        self.scheduler.schedule_remove(with_fade);
    }

    /// Attached task, if the overlay is in a state it can leave from.
    fn exitable_task(&self) -> Option<TaskId> {
        if !self.transition.is_in_pip() {
            trace!(state = %self.transition.state(), "exit_not_in_pip");
            return None;
        }
        self.transition.task().ok().map(|a| a.task.id)
    }

    /// Ignore gestures while `suppressed`, e.g. during a system animation.
    pub fn set_input_suppressed(&mut self, suppressed: bool) {
        debug!(suppressed, "set_input_suppressed");
        self.input_suppressed = suppressed;
    }

    /// Tuck or untuck the overlay against a display edge.
    pub fn set_stashed(&mut self, stashed: bool) {
        debug!(stashed, "set_stashed");
        self.bounds.set_stashed(stashed);
    }

    /// Hold or release the display rotation.
    pub fn set_in_fixed_rotation(&mut self, fixed: bool) {
        self.transition.set_in_fixed_rotation(fixed);
    }

    /// Set or clear a named exclusion area.
    pub fn set_named_exclusion_area(&mut self, name: &str, area: Option<Rect>) {
        self.bounds.set_named_exclusion_area(name, area);
    }

    /// Record new chrome dimensions, notifying listeners on change.
    pub fn set_resource_dimensions(&mut self, dims: ResourceDimensions) {
        if self.resources == Some(dims) {
            return;
        }
        debug!(
            corner_radius = dims.corner_radius,
            shadow_radius = dims.shadow_radius,
            "resource_dimensions_changed"
        );
        self.resources = Some(dims);
        for listener in &mut self.resource_listeners {
            listener(dims);
        }
    }

    /// Register a listener; it is called immediately if dimensions are known.
    pub fn add_resource_listener(&mut self, mut listener: ResourceListener) {
        if let Some(dims) = self.resources {
            listener(dims);
        }
        self.resource_listeners.push(listener);
    }

    /// Receiver of the in-pip flag, primed with the current value.
    pub fn subscribe_in_pip(&mut self) -> Receiver<bool> {
        self.in_pip.subscribe()
    }

    /// Register a lifecycle listener, run after the built-in components.
    pub fn add_listener(&mut self, listener: Box<dyn TransitionListener>) -> ListenerId {
        self.transition.add_listener(listener)
    }

    /// Read-only view for the input thread.
    pub fn snapshot(&self) -> PipSnapshot {
        PipSnapshot::capture(
            &self.bounds,
            &self.display,
            self.transition.is_in_pip(),
            self.input_suppressed,
            self.transition.attached().map(|a| a.leash),
        )
    }

    /// Send the snapshot to the input thread if it changed.
    pub fn publish_snapshot(&mut self) {
        let snap = self.snapshot();
        if self.published == Some(snap) {
            return;
        }
        self.published = Some(snap);
        self.outbox.send(InputControl::Snapshot(snap));
    }

    /// Advance frame-driven work and retry queued control messages.
    pub fn tick(&mut self, now: Instant) {
        self.scheduler.advance_fade(now);
        self.outbox.flush();
    }

    /// Whether the loop should wake on the frame interval.
    pub fn needs_frames(&self) -> bool {
        self.scheduler.is_fading() || self.outbox.has_backlog()
    }

    /// Deliver pending control messages and shutdown, waiting at most
    /// `timeout` for each.
    pub fn shutdown(&mut self, timeout: Duration) {
        self.outbox.close(timeout);
    }

    /// Append a human-readable description to `out`.
    pub fn dump(&self, out: &mut String) {
        let _ = writeln!(out, "PipController");
        let _ = writeln!(out, "  display={}", self.display);
        let _ = writeln!(out, "  input_suppressed={}", self.input_suppressed);
        if let Some(r) = self.resources {
            let _ = writeln!(
                out,
                "  corner_radius={} shadow_radius={}",
                r.corner_radius, r.shadow_radius
            );
        }
        let _ = writeln!(
            out,
            "  in_pip={} subscribers={}",
            self.in_pip.current,
            self.in_pip.subscribers.len()
        );
        self.transition.dump(out, "  ");
        self.bounds.dump(out, "  ");
        self.scheduler.dump(out, "  ");
        self.hook.dump(out, "  ");
    }
}

/// Requested (or configured default) ratio clamped to the configured range.
fn resolve_aspect(config: &PipConfig, requested: Option<f32>) -> AspectRatio {
    requested
        .and_then(AspectRatio::from_f32)
        .or_else(|| AspectRatio::from_f32(config.default_aspect_ratio))
        .unwrap_or(AspectRatio::SQUARE)
        .clamp(config.min_aspect_ratio, config.max_aspect_ratio)
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn in_pip_stream_emits_current_then_changes() {
        let mut stream = InPipStream::default();
        let rx = stream.subscribe();
        stream.update(false);
        stream.update(true);
        stream.update(true);
        stream.update(false);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![false, true, false]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut stream = InPipStream::default();
        drop(stream.subscribe());
        stream.update(true);
        assert!(stream.subscribers.is_empty());
    }

    #[test]
    fn aspect_falls_back_to_default_and_clamps() {
        let cfg = PipConfig::default();
        assert_eq!(resolve_aspect(&cfg, None), AspectRatio::new(16, 9).unwrap());
        assert_eq!(resolve_aspect(&cfg, Some(f32::NAN)), AspectRatio::new(16, 9).unwrap());
        assert_eq!(resolve_aspect(&cfg, Some(10.0)), AspectRatio::new(239, 100).unwrap());
    }

    #[test]
    fn resource_listener_sees_current_and_changes_only() {
        let services = crate::test_support::MockServices::new();
        let (tx, _rx) = bounded(8);
        let mut c = PipController::new(
            PipConfig::default(),
            DisplayLayout::default(),
            &services.services,
            tx,
        );
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let dims = ResourceDimensions {
            corner_radius: 8,
            shadow_radius: 4,
        };
        c.set_resource_dimensions(dims);
        let s = seen.clone();
        c.add_resource_listener(Box::new(move |d| s.lock().push(d)));
        c.set_resource_dimensions(dims);
        let bigger = ResourceDimensions {
            corner_radius: 12,
            ..dims
        };
        c.set_resource_dimensions(bigger);
        assert_eq!(*seen.lock(), vec![dims, bigger]);
    }
}
