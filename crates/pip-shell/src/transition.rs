//! Overlay lifecycle state machine and its listener registry.
//!
//! Every `set_state` call is dispatched, including transitions to the current
//! state. Listeners run synchronously in registration order and request
//! follow-up transitions through [`TransitionRequests`]; those are queued and
//! drained iteratively rather than dispatched recursively.

use std::{collections::VecDeque, fmt, fmt::Write as _, time::Duration};

use pip_ids::{LeashId, TaskId};
use tracing::{debug, trace, warn};

use crate::{
    error::{Error, Result, report_invariant},
    geom::Rect,
};

/// Lifecycle phase of the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum PipState {
    /// No overlay; initial state and the state after a reset.
    #[default]
    Undefined,
    /// An interactive swipe is carrying the task into the overlay.
    SwipingToPip,
    /// The entry animation is running.
    EnteringPip,
    /// Settled in the overlay.
    EnteredPip,
    /// An animated bounds change is in flight.
    ChangingBounds,
    /// A bounds change has been requested but not started.
    ScheduledBoundsChange,
    /// The exit animation is running.
    ExitingPip,
    /// The task has left the overlay.
    ExitedPip,
}

impl PipState {
    /// True from `EnteringPip` up to, but not including, `ExitingPip`.
    pub const fn is_in_pip(self) -> bool {
        matches!(
            self,
            Self::EnteringPip | Self::EnteredPip | Self::ChangingBounds | Self::ScheduledBoundsChange
        )
    }
}

impl fmt::Display for PipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Task hosted by the overlay, as reported by the windowing service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    /// The task itself.
    pub id: TaskId,
    /// Task the overlay was launched from, if any.
    pub host_task: Option<TaskId>,
    /// The app redraws across size changes without a cross-fade mask.
    pub seamless_resize: bool,
}

impl TaskInfo {
    /// Task `id` with no host and no seamless resize.
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            host_task: None,
            seamless_resize: false,
        }
    }
}

/// Everything needed to enter the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct EnterParams {
    /// Task to move into the overlay.
    pub task: TaskInfo,
    /// Compositor surface carrying the task.
    pub leash: LeashId,
    /// Aspect ratio requested by the app, width / height.
    pub aspect_ratio: Option<f32>,
    /// Entry starts with an interactive swipe.
    pub from_swipe: bool,
}

/// Task and leash attached while the overlay is in its entered window.
#[derive(Clone, Debug, PartialEq)]
pub struct AttachedTask {
    /// Task in the overlay.
    pub task: TaskInfo,
    /// Compositor surface carrying the task.
    pub leash: LeashId,
}

/// Origin of a bounds change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundsChangeKind {
    /// Produced by a resize gesture.
    UserResize,
    /// Display size or rotation changed.
    DisplayChange,
    /// Requested by the app or by the shell itself.
    Programmatic,
}

/// How the overlay is leaving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// Expand back to full screen, or into split screen when `to_split`.
    Expand {
        /// Expand into split screen instead of full screen.
        to_split: bool,
    },
    /// Remove the task with no expansion.
    Remove,
}

/// Payload carried by exactly one transition.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum TransitionExtras {
    /// No payload.
    #[default]
    None,
    /// Carried by the transition to `EnteredPip`.
    Enter(EnterParams),
    /// Carried by the transition to `ScheduledBoundsChange`.
    BoundsChange {
        /// Target bounds.
        bounds: Rect,
        /// Animation length.
        duration: Duration,
        /// Why the bounds changed.
        kind: BoundsChangeKind,
    },
    /// Carried by the transitions to `ExitingPip` and `ExitedPip`.
    Exit(ExitKind),
}

/// A dispatched transition.
#[derive(Clone, Debug)]
pub struct TransitionChange {
    /// State before the transition.
    pub from: PipState,
    /// State after the transition.
    pub to: PipState,
    /// Payload requested with the transition.
    pub extras: TransitionExtras,
    /// Attached task after this transition was applied.
    pub attached: Option<AttachedTask>,
}

impl TransitionChange {
    /// Bounds-change payload of a `ScheduledBoundsChange` of `kind`.
    pub fn scheduled_bounds(&self, kind: BoundsChangeKind) -> Option<(Rect, Duration)> {
        match self.extras {
            TransitionExtras::BoundsChange {
                bounds,
                duration,
                kind: k,
            } if self.to == PipState::ScheduledBoundsChange && k == kind => Some((bounds, duration)),
            _ => None,
        }
    }
}

/// Follow-up transitions requested by listeners during a dispatch.
#[derive(Default)]
pub struct TransitionRequests {
    /// Requested transitions in request order.
    queue: Vec<(PipState, TransitionExtras)>,
}

impl TransitionRequests {
    /// Queue a transition to `state` after the current dispatch.
    pub fn push(&mut self, state: PipState, extras: TransitionExtras) {
        self.queue.push((state, extras));
    }

    /// True when nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Observer of lifecycle transitions.
pub trait TransitionListener: Send {
    /// Called once per dispatched transition, after it has been applied.
    fn on_transition(&mut self, change: &TransitionChange, requests: &mut TransitionRequests);
}

impl<F> TransitionListener for F
where
    F: FnMut(&TransitionChange, &mut TransitionRequests) + Send,
{
    fn on_transition(&mut self, change: &TransitionChange, requests: &mut TransitionRequests) {
        self(change, requests)
    }
}

/// Handle returned by [`TransitionState::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The lifecycle state machine.
pub struct TransitionState {
    /// Current phase.
    state: PipState,
    /// The display rotation is being held for the overlay.
    in_fixed_rotation: bool,
    /// Set on entry and cleared on exit.
    attached: Option<AttachedTask>,
    /// Listeners in registration order.
    listeners: Vec<(ListenerId, Box<dyn TransitionListener>)>,
    /// Id handed to the next registered listener.
    next_listener: u64,
    /// Transitions waiting to be dispatched by the current drain.
    pending: VecDeque<(PipState, TransitionExtras)>,
    /// Upper bound on transitions dispatched by one drain.
    max_drain: usize,
    /// Recent `(from, to)` pairs, oldest first.
    history: VecDeque<(PipState, PipState)>,
}

/// Transitions kept for `dump`.
const HISTORY_LEN: usize = 16;

impl TransitionState {
    /// `max_drain` caps the number of transitions dispatched by one drain.
    pub fn new(max_drain: usize) -> Self {
        Self {
            state: PipState::Undefined,
            in_fixed_rotation: false,
            attached: None,
            listeners: Vec::new(),
            next_listener: 0,
            pending: VecDeque::new(),
            max_drain: max_drain.max(1),
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Current phase.
    pub fn state(&self) -> PipState {
        self.state
    }

    /// True while the overlay is entering or entered.
    pub fn is_in_pip(&self) -> bool {
        self.state.is_in_pip()
    }

    /// True while the display rotation is held for the overlay.
    pub fn is_in_fixed_rotation(&self) -> bool {
        self.in_fixed_rotation
    }

    /// Hold or release the display rotation.
    pub fn set_in_fixed_rotation(&mut self, fixed: bool) {
        debug!(fixed, "set_in_fixed_rotation");
        self.in_fixed_rotation = fixed;
    }

    /// Attached task. Reading it outside the attached window is a logic error.
    pub fn task(&self) -> Result<&AttachedTask> {
        match &self.attached {
            Some(t) => Ok(t),
            None => {
                report_invariant("task read while no task is attached");
                Err(Error::NotInPip)
            }
        }
    }

    /// Attached task, if any, without treating absence as an error.
    pub fn attached(&self) -> Option<&AttachedTask> {
        self.attached.as_ref()
    }

    /// Register `listener`, returning a handle for removal.
    pub fn add_listener(&mut self, listener: Box<dyn TransitionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Request a transition and dispatch it to registered listeners.
    pub fn set_state(&mut self, state: PipState, extras: TransitionExtras) {
        self.set_state_with(state, extras, &mut |_: &TransitionChange, _: &mut TransitionRequests| {})
    }

    /// Like [`set_state`](Self::set_state), running `hook` before the
    /// registered listeners for every transition of this drain.
    pub fn set_state_with(
        &mut self,
        state: PipState,
        extras: TransitionExtras,
        hook: &mut dyn FnMut(&TransitionChange, &mut TransitionRequests),
    ) {
        self.pending.push_back((state, extras));
        let mut dispatched = 0usize;
        while let Some((to, extras)) = self.pending.pop_front() {
            if dispatched == self.max_drain {
                warn!(
                    dropped = self.pending.len() + 1,
                    limit = self.max_drain,
                    "transition_drain_limit"
                );
                self.pending.clear();
                break;
            }
            dispatched += 1;
            let change = self.apply(to, extras);
            let mut requests = TransitionRequests::default();
            hook(&change, &mut requests);
            for (_, listener) in &mut self.listeners {
                listener.on_transition(&change, &mut requests);
            }
            self.pending.extend(requests.queue);
        }
    }

    /// Move to `to`, attaching or detaching the task as needed.
    fn apply(&mut self, to: PipState, extras: TransitionExtras) -> TransitionChange {
        let from = self.state;
        self.state = to;
        match (to, &extras) {
            (PipState::EnteredPip, TransitionExtras::Enter(p)) => {
                self.attached = Some(AttachedTask {
                    task: p.task.clone(),
                    leash: p.leash,
                });
            }
            (PipState::ExitedPip, _) | (PipState::Undefined, _) => self.attached = None,
            _ => {}
        }
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back((from, to));
        trace!(%from, %to, "transition");
        TransitionChange {
            from,
            to,
            extras,
            attached: self.attached.clone(),
        }
    }

    /// Append a human-readable description to `out`.
    pub fn dump(&self, out: &mut String, prefix: &str) {
        let _ = writeln!(out, "{prefix}TransitionState");
        let _ = writeln!(out, "{prefix}  state={}", self.state);
        let _ = writeln!(out, "{prefix}  in_fixed_rotation={}", self.in_fixed_rotation);
        match &self.attached {
            Some(a) => {
                let _ = writeln!(out, "{prefix}  task={} leash={}", a.task.id, a.leash);
            }
            None => {
                let _ = writeln!(out, "{prefix}  task=none");
            }
        }
        let _ = writeln!(out, "{prefix}  listeners={}", self.listeners.len());
        let recent: Vec<String> = self
            .history
            .iter()
            .map(|(from, to)| format!("{from}->{to}"))
            .collect();
        let _ = writeln!(out, "{prefix}  recent=[{}]", recent.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn enter_params() -> EnterParams {
        EnterParams {
            task: TaskInfo::new(TaskId::new(7)),
            leash: LeashId::new(0x70),
            aspect_ratio: None,
            from_swipe: false,
        }
    }

    fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> Box<dyn TransitionListener> {
        Box::new(move |c: &TransitionChange, _: &mut TransitionRequests| {
            log.lock().push(format!("{tag}:{}", c.to));
        })
    }

    #[test]
    fn in_pip_window() {
        use PipState::*;
        for s in [EnteringPip, EnteredPip, ChangingBounds, ScheduledBoundsChange] {
            assert!(s.is_in_pip(), "{s}");
        }
        for s in [Undefined, SwipingToPip, ExitingPip, ExitedPip] {
            assert!(!s.is_in_pip(), "{s}");
        }
    }

    #[test]
    fn listeners_run_in_order_even_for_same_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ts = TransitionState::new(16);
        ts.add_listener(recorder(log.clone(), "a"));
        ts.add_listener(recorder(log.clone(), "b"));
        ts.set_state(PipState::EnteringPip, TransitionExtras::None);
        ts.set_state(PipState::EnteringPip, TransitionExtras::None);
        assert_eq!(
            *log.lock(),
            vec!["a:EnteringPip", "b:EnteringPip", "a:EnteringPip", "b:EnteringPip"]
        );
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ts = TransitionState::new(16);
        let id = ts.add_listener(recorder(log.clone(), "a"));
        assert!(ts.remove_listener(id));
        assert!(!ts.remove_listener(id));
        ts.set_state(PipState::EnteringPip, TransitionExtras::None);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn nested_requests_are_queued_not_recursed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ts = TransitionState::new(16);
        ts.add_listener(Box::new(
            |c: &TransitionChange, r: &mut TransitionRequests| {
                if c.to == PipState::ScheduledBoundsChange {
                    r.push(PipState::ChangingBounds, TransitionExtras::None);
                }
            },
        ));
        ts.add_listener(recorder(log.clone(), "b"));
        ts.set_state(PipState::ScheduledBoundsChange, TransitionExtras::None);
        // The second listener sees the first transition before the follow-up.
        assert_eq!(*log.lock(), vec!["b:ScheduledBoundsChange", "b:ChangingBounds"]);
        assert_eq!(ts.state(), PipState::ChangingBounds);
    }

    #[test]
    fn runaway_requests_are_capped() {
        let count = Arc::new(Mutex::new(0usize));
        let seen = count.clone();
        let mut ts = TransitionState::new(4);
        ts.add_listener(Box::new(
            move |c: &TransitionChange, r: &mut TransitionRequests| {
                *seen.lock() += 1;
                r.push(c.to, TransitionExtras::None);
            },
        ));
        ts.set_state(PipState::EnteredPip, TransitionExtras::None);
        assert_eq!(*count.lock(), 4);
        // A fresh call dispatches again.
        ts.set_state(PipState::EnteredPip, TransitionExtras::None);
        assert_eq!(*count.lock(), 8);
    }

    #[test]
    fn hook_runs_before_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ts = TransitionState::new(16);
        ts.add_listener(recorder(log.clone(), "listener"));
        let hook_log = log.clone();
        ts.set_state_with(
            PipState::EnteringPip,
            TransitionExtras::None,
            &mut |c: &TransitionChange, _: &mut TransitionRequests| {
                hook_log.lock().push(format!("hook:{}", c.to));
            },
        );
        assert_eq!(*log.lock(), vec!["hook:EnteringPip", "listener:EnteringPip"]);
    }

    #[test]
    fn task_attached_between_entered_and_exited() {
        let mut ts = TransitionState::new(16);
        assert!(ts.attached().is_none());
        ts.set_state(PipState::EnteringPip, TransitionExtras::Enter(enter_params()));
        assert!(ts.attached().is_none());
        ts.set_state(PipState::EnteredPip, TransitionExtras::Enter(enter_params()));
        assert_eq!(ts.task().unwrap().task.id, TaskId::new(7));
        ts.set_state(
            PipState::ExitingPip,
            TransitionExtras::Exit(ExitKind::Remove),
        );
        assert!(ts.attached().is_some());
        ts.set_state(PipState::ExitedPip, TransitionExtras::Exit(ExitKind::Remove));
        assert!(ts.attached().is_none());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "invariant violation"))]
    fn reading_task_outside_pip_is_loud() {
        let ts = TransitionState::new(16);
        assert!(matches!(ts.task(), Err(Error::NotInPip)));
    }

    #[test]
    fn scheduled_bounds_matches_kind() {
        let change = TransitionChange {
            from: PipState::EnteredPip,
            to: PipState::ScheduledBoundsChange,
            extras: TransitionExtras::BoundsChange {
                bounds: Rect::new(0, 0, 10, 10),
                duration: Duration::from_millis(5),
                kind: BoundsChangeKind::UserResize,
            },
            attached: None,
        };
        assert!(change.scheduled_bounds(BoundsChangeKind::UserResize).is_some());
        assert!(change.scheduled_bounds(BoundsChangeKind::DisplayChange).is_none());
    }
}
