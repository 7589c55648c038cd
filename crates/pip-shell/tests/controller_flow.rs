use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, bounded};
use parking_lot::Mutex;
use pip_ids::{DisplayId, LeashId, SurfaceId, TaskId, TransitionToken};
use pip_shell::{
    Command, DisplayLayout, EnterParams, InputControl, InputMonitor, Insets, PipConfig,
    PipController, PipState, Rect, Services, Size, TaskInfo, TransitionChange,
    services::{
        SplitPosition, SurfaceOp, SurfaceService, SurfaceTransaction, WindowOp,
        WindowTransaction, WindowingService,
    },
    test_support::{MockPerf, MockServices, WindowCall},
    transition::{ExitKind, TransitionRequests},
};

const TASK: TaskId = TaskId::new(7);
const LEASH: LeashId = LeashId::new(0x70);
/// Default-size square entry on the default 1080x2340 display.
const ENTRY: Rect = Rect::new(648, 1908, 1080, 2340);

struct Rig {
    mocks: MockServices,
    controller: PipController,
    control: Receiver<InputControl>,
}

fn rig() -> Rig {
    let mocks = MockServices::new();
    let (tx, control) = bounded(64);
    let controller = PipController::new(
        PipConfig::default(),
        DisplayLayout::default(),
        &mocks.services,
        tx,
    );
    Rig {
        mocks,
        controller,
        control,
    }
}

fn square_params() -> EnterParams {
    EnterParams {
        task: TaskInfo::new(TASK),
        leash: LEASH,
        aspect_ratio: Some(1.0),
        from_swipe: false,
    }
}

impl Rig {
    fn entered() -> Self {
        let mut r = rig();
        r.controller.handle(Command::EnterPip(square_params()));
        r
    }

    fn control_messages(&self) -> Vec<InputControl> {
        self.control.try_iter().collect()
    }

    fn finish_last(&mut self) -> TransitionToken {
        let token = self
            .mocks
            .windowing
            .started_tokens()
            .last()
            .copied()
            .expect("a started transition");
        self.controller.handle(Command::TransitionFinished(token));
        token
    }

    fn resize_to(&mut self, bounds: Rect) {
        self.controller.handle(Command::ScheduleResize { bounds });
        self.finish_last();
    }
}

fn has_resize_finished(msgs: &[InputControl]) -> bool {
    msgs.iter().any(|m| *m == InputControl::ResizeFinished)
}

#[test]
fn enter_places_default_size_bottom_right() {
    let mut r = rig();
    let in_pip = r.controller.subscribe_in_pip();
    r.controller.handle(Command::EnterPip(square_params()));

    assert_eq!(r.controller.state(), PipState::EnteredPip);
    assert_eq!(r.controller.bounds().bounds(), ENTRY);
    assert_eq!(r.controller.bounds().min_size(), Size::new(108, 108));
    assert_eq!(r.controller.bounds().max_size(), Size::new(648, 648));
    let mut txn = WindowTransaction::new();
    txn.set_bounds(TASK, ENTRY);
    assert_eq!(r.mocks.windowing.submitted(), vec![txn]);
    assert_eq!(in_pip.try_iter().collect::<Vec<_>>(), vec![false, true]);

    let snaps: Vec<_> = r
        .control_messages()
        .into_iter()
        .filter_map(|m| match m {
            InputControl::Snapshot(s) => Some(s),
            _ => None,
        })
        .collect();
    let last = snaps.last().expect("snapshot published");
    assert!(last.in_pip);
    assert_eq!(last.leash, Some(LEASH));
    assert_eq!(last.bounds, ENTRY);
}

#[test]
fn enter_twice_is_ignored() {
    let mut r = Rig::entered();
    r.mocks.windowing.clear_calls();
    r.controller.handle(Command::EnterPip(square_params()));
    assert!(r.mocks.windowing.calls().is_empty());
    assert_eq!(r.controller.state(), PipState::EnteredPip);
}

#[test]
fn swipe_entry_passes_through_swiping_state() {
    let mut r = rig();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    r.controller.add_listener(Box::new(
        move |c: &TransitionChange, _: &mut TransitionRequests| s.lock().push(c.to),
    ));
    r.controller.handle(Command::EnterPip(EnterParams {
        from_swipe: true,
        ..square_params()
    }));
    assert_eq!(
        *seen.lock(),
        vec![
            PipState::SwipingToPip,
            PipState::EnteringPip,
            PipState::EnteredPip
        ]
    );
}

#[test]
fn noop_resize_is_nudged_and_round_trips() {
    let mut r = Rig::entered();
    r.control_messages();
    r.controller.handle(Command::ScheduleResize { bounds: ENTRY });
    assert_eq!(r.controller.state(), PipState::ChangingBounds);

    // Lower half of the screen: nudged up by one pixel.
    let nudged = ENTRY.offset(0, -1);
    match r.mocks.windowing.last_started() {
        Some(WindowCall::ResizeTransition { txn, duration, .. }) => {
            assert_eq!(txn.bounds_for(TASK), Some(nudged));
            assert!(txn.ops.contains(&WindowOp::DeferConfigToTransitionEnd { task: TASK }));
            assert_eq!(duration, Duration::from_millis(250));
        }
        other => panic!("expected resize transition, got {other:?}"),
    }

    let token = r.finish_last();
    assert_eq!(r.mocks.windowing.finished_tokens(), vec![token]);
    assert_eq!(r.controller.state(), PipState::EnteredPip);
    assert_eq!(r.controller.bounds().bounds(), nudged);
    assert!(r.controller.bounds().has_user_resized());
    assert_eq!(r.controller.bounds().user_resize_bounds(), Some(nudged));
    assert!(has_resize_finished(&r.control_messages()));
    // Same size: no cross-fade.
    assert!(r.mocks.surface.screenshots().is_empty());
}

#[test]
fn resize_refused_outside_pip_or_while_pending() {
    let mut r = rig();
    r.controller.handle(Command::ScheduleResize { bounds: ENTRY });
    assert!(has_resize_finished(&r.control_messages()));
    assert!(r.mocks.windowing.started_tokens().is_empty());

    r.controller.handle(Command::EnterPip(square_params()));
    r.controller.handle(Command::ScheduleResize {
        bounds: Rect::new(0, 1000, 500, 1500),
    });
    r.control_messages();
    r.controller.handle(Command::ScheduleResize {
        bounds: Rect::new(0, 900, 400, 1300),
    });
    assert!(has_resize_finished(&r.control_messages()));
    assert_eq!(r.mocks.windowing.started_tokens().len(), 1);
}

#[test]
fn size_change_cross_fades_until_done() {
    let mut r = Rig::entered();
    r.resize_to(Rect::new(0, 1000, 500, 1500));
    assert_eq!(r.controller.bounds().bounds(), Rect::new(0, 1000, 500, 1500));

    assert_eq!(
        r.mocks.surface.screenshots(),
        vec![(LEASH, Rect::new(0, 0, 432, 432), i32::MAX)]
    );
    let ops = r.mocks.surface.ops();
    assert!(ops.iter().any(|op| matches!(
        op,
        SurfaceOp::SetPosition { x, y, .. } if *x == 0.0 && *y == 1000.0
    )));
    assert!(r.controller.needs_frames());

    r.controller.tick(Instant::now() + Duration::from_millis(300));
    assert!(!r.controller.needs_frames());
    assert!(matches!(
        r.mocks.surface.ops().last(),
        Some(SurfaceOp::Remove { .. })
    ));
}

#[test]
fn seamless_task_skips_cross_fade() {
    let mut r = rig();
    let mut task = TaskInfo::new(TASK);
    task.seamless_resize = true;
    r.controller.handle(Command::EnterPip(EnterParams {
        task,
        ..square_params()
    }));
    r.resize_to(Rect::new(0, 1000, 500, 1500));
    assert!(r.mocks.surface.screenshots().is_empty());
    assert!(!r.controller.needs_frames());
}

#[test]
fn stale_token_is_ignored() {
    let mut r = Rig::entered();
    r.controller.handle(Command::ScheduleResize {
        bounds: Rect::new(0, 1000, 500, 1500),
    });
    r.controller
        .handle(Command::TransitionFinished(TransitionToken::new(999)));
    assert_eq!(r.controller.state(), PipState::ChangingBounds);
    assert!(r.mocks.windowing.finished_tokens().is_empty());
}

#[test]
fn display_change_keeps_snap_fraction() {
    let mut r = Rig::entered();
    let landscape = DisplayLayout::new(DisplayId::default(), 2340, 1080, Insets::default());
    r.controller.handle(Command::DisplayChanged(landscape));
    assert_eq!(r.controller.state(), PipState::ChangingBounds);
    match r.mocks.windowing.last_started() {
        Some(WindowCall::ResizeTransition { txn, duration, .. }) => {
            assert_eq!(duration, Duration::ZERO);
            assert_eq!(txn.bounds_for(TASK), Some(Rect::new(1908, 648, 2340, 1080)));
            assert!(!txn.ops.contains(&WindowOp::DeferConfigToTransitionEnd { task: TASK }));
        }
        other => panic!("expected resize transition, got {other:?}"),
    }
    r.finish_last();
    assert_eq!(r.controller.state(), PipState::EnteredPip);
    assert_eq!(r.controller.bounds().bounds(), Rect::new(1908, 648, 2340, 1080));
    assert!(!r.controller.bounds().has_user_resized());
}

#[test]
fn display_change_in_fixed_rotation_only_updates_limits() {
    let mut r = Rig::entered();
    r.controller.handle(Command::SetFixedRotation(true));
    let small = DisplayLayout::new(DisplayId::default(), 800, 1600, Insets::default());
    r.controller.handle(Command::DisplayChanged(small));
    assert_eq!(r.controller.state(), PipState::EnteredPip);
    assert!(r.mocks.windowing.started_tokens().is_empty());
    assert_eq!(r.controller.bounds().max_size(), Size::new(480, 480));
}

#[test]
fn app_aspect_ratio_reprojects_bounds() {
    let mut r = Rig::entered();
    r.controller.handle(Command::SetAspectRatio(16.0 / 9.0));
    match r.mocks.windowing.last_started() {
        Some(WindowCall::ResizeTransition { txn, .. }) => {
            let b = txn.bounds_for(TASK).expect("bounds");
            assert_eq!(b.size(), Size::new(768, 432));
            assert_eq!((b.right, b.bottom), (1080, 2340));
        }
        other => panic!("expected resize transition, got {other:?}"),
    }
}

#[test]
fn expand_exit_then_reentry_restores_user_size() {
    let mut r = Rig::entered();
    r.resize_to(Rect::new(0, 1000, 500, 1500));
    let in_pip = r.controller.subscribe_in_pip();

    r.controller.handle(Command::ExitViaExpand);
    assert_eq!(r.controller.state(), PipState::ExitingPip);
    match r.mocks.windowing.last_started() {
        Some(WindowCall::ExpandTransition { txn, to_split, .. }) => {
            assert!(!to_split);
            assert_eq!(txn.ops, vec![WindowOp::SetFullscreen { task: TASK }]);
        }
        other => panic!("expected expand transition, got {other:?}"),
    }
    r.control_messages();
    r.finish_last();
    assert_eq!(r.controller.state(), PipState::Undefined);
    assert!(r.control_messages().contains(&InputControl::ExitedPip));
    assert_eq!(in_pip.try_iter().collect::<Vec<_>>(), vec![true, false]);
    assert!(!r.controller.bounds().has_user_resized());

    r.controller.handle(Command::EnterPip(square_params()));
    assert_eq!(r.controller.bounds().bounds(), Rect::new(0, 1000, 500, 1500));
    assert!(r.controller.bounds().reentry_state().is_none());
}

#[test]
fn reentry_of_other_task_uses_defaults() {
    let mut r = Rig::entered();
    r.resize_to(Rect::new(0, 1000, 500, 1500));
    r.controller.handle(Command::Remove { with_fade: false });
    r.finish_last();
    let mut params = square_params();
    params.task = TaskInfo::new(TaskId::new(8));
    r.controller.handle(Command::EnterPip(params));
    assert_eq!(r.controller.bounds().bounds(), ENTRY);
}

#[test]
fn expand_into_split_when_host_is_split() {
    let mut r = rig();
    let host = TaskId::new(3);
    r.mocks.split.set_in_split(host, true);
    let mut task = TaskInfo::new(TASK);
    task.host_task = Some(host);
    r.controller.handle(Command::EnterPip(EnterParams {
        task,
        ..square_params()
    }));
    r.controller.handle(Command::ExitViaExpand);
    match r.mocks.windowing.last_started() {
        Some(WindowCall::ExpandTransition { txn, to_split, .. }) => {
            assert!(to_split);
            assert_eq!(
                txn.ops,
                vec![WindowOp::EnterSplit {
                    task: TASK,
                    position: SplitPosition::BottomOrRight
                }]
            );
        }
        other => panic!("expected expand transition, got {other:?}"),
    }
    assert_eq!(
        r.mocks.split.prepared(),
        vec![(TASK, SplitPosition::BottomOrRight)]
    );
}

#[test]
fn remove_sequence_reaches_undefined() {
    let mut r = Rig::entered();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    r.controller.add_listener(Box::new(
        move |c: &TransitionChange, _: &mut TransitionRequests| s.lock().push((c.to, c.extras.clone())),
    ));
    r.controller.handle(Command::Remove { with_fade: true });
    assert!(matches!(
        r.mocks.windowing.last_started(),
        Some(WindowCall::RemoveTransition { with_fade: true, .. })
    ));
    r.finish_last();
    let states: Vec<_> = seen.lock().iter().map(|(s, _)| *s).collect();
    assert_eq!(
        states,
        vec![PipState::ExitingPip, PipState::ExitedPip, PipState::Undefined]
    );
    assert!(seen.lock().iter().any(|(_, e)| *e
        == pip_shell::TransitionExtras::Exit(ExitKind::Remove)));
}

#[test]
fn exit_outside_pip_is_noop() {
    let mut r = rig();
    r.controller.handle(Command::ExitViaExpand);
    r.controller.handle(Command::Remove { with_fade: true });
    assert!(r.mocks.windowing.calls().is_empty());
    assert_eq!(r.controller.state(), PipState::Undefined);
}

#[test]
fn exit_mid_resize_drops_the_resize() {
    let mut r = Rig::entered();
    r.controller.handle(Command::ScheduleResize {
        bounds: Rect::new(0, 1000, 500, 1500),
    });
    let resize = r.mocks.windowing.started_tokens()[0];
    r.controller.handle(Command::Remove { with_fade: false });
    r.controller.handle(Command::TransitionFinished(resize));
    assert_eq!(r.controller.state(), PipState::ExitingPip);
    r.finish_last();
    assert_eq!(r.controller.state(), PipState::Undefined);
}

#[test]
fn exclusion_area_lifts_movement_bounds() {
    let mut r = Rig::entered();
    let seen = Arc::new(Mutex::new(0usize));
    let s = seen.clone();
    r.controller
        .handle(Command::AddExclusionObserver(Box::new(move |areas: &BTreeMap<String, Rect>| {
            *s.lock() = areas.len();
        })));
    r.controller.handle(Command::SetNamedExclusionArea {
        name: "shelf".into(),
        area: Some(Rect::new(0, 2140, 1080, 2340)),
    });
    assert_eq!(*seen.lock(), 1);
    let snap = r.controller.snapshot();
    assert_eq!(snap.bottom_offset, 200);
    assert_eq!(snap.movement_bounds(ENTRY), Rect::new(0, 0, 648, 1708));
}

#[test]
fn stash_and_suppression_reach_snapshot() {
    let mut r = Rig::entered();
    r.control_messages();
    r.controller.handle(Command::SetStashed(true));
    r.controller.handle(Command::SetInputSuppressed(true));
    let snaps: Vec<_> = r
        .control_messages()
        .into_iter()
        .filter_map(|m| match m {
            InputControl::Snapshot(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(snaps.len(), 2);
    assert!(snaps[1].stashed && snaps[1].input_suppressed);

    // Unchanged state publishes nothing.
    r.controller.handle(Command::SetStashed(true));
    assert!(r.control_messages().is_empty());
}

#[test]
fn dump_has_every_section() {
    let mut r = Rig::entered();
    let (tx, rx) = bounded(1);
    r.controller.handle(Command::Dump { reply: tx });
    let dump = rx.recv().expect("dump");
    for section in [
        "PipController",
        "TransitionState",
        "BoundsState",
        "Scheduler",
        "ResizeTransitionHook",
    ] {
        assert!(dump.contains(section), "missing {section} in:\n{dump}");
    }
    assert!(dump.contains("state=EnteredPip"));
}

#[test]
fn programmatic_kind_does_not_mark_user_resize() {
    let mut r = Rig::entered();
    r.controller.handle(Command::SetAspectRatio(0.5));
    r.finish_last();
    assert!(!r.controller.bounds().has_user_resized());
    assert_eq!(r.controller.bounds().user_resize_bounds(), None);
}

#[test]
fn shutdown_command_stops_handling() {
    let mut r = rig();
    assert!(!r.controller.handle(Command::Shutdown));
}

/// Windowing and surface calls recorded into one shared list.
#[derive(Clone, Default)]
struct CallOrder {
    calls: Arc<Mutex<Vec<&'static str>>>,
    next_token: Arc<Mutex<u64>>,
}

impl CallOrder {
    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn started(&self, call: &'static str) -> TransitionToken {
        self.record(call);
        let mut next = self.next_token.lock();
        *next += 1;
        TransitionToken::new(*next)
    }

    fn position(&self, call: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .position(|c| *c == call)
            .unwrap_or_else(|| panic!("{call} never happened"))
    }
}

impl WindowingService for CallOrder {
    fn submit(&self, _txn: &WindowTransaction) {
        self.record("submit");
    }

    fn start_resize_transition(
        &self,
        _txn: &WindowTransaction,
        _duration: Duration,
    ) -> TransitionToken {
        self.started("start_resize_transition")
    }

    fn start_remove_transition(&self, _with_fade: bool) -> TransitionToken {
        self.started("start_remove_transition")
    }

    fn start_expand_transition(&self, _txn: &WindowTransaction, _to_split: bool) -> TransitionToken {
        self.started("start_expand_transition")
    }

    fn finish_transition(&self, _token: TransitionToken) {
        self.record("finish_transition");
    }

    fn create_input_monitor(&self, _display: DisplayId) -> pip_shell::Result<InputMonitor> {
        Err(pip_shell::Error::ChannelClosed)
    }
}

impl SurfaceService for CallOrder {
    fn take_screenshot(&self, _leash: LeashId, _crop: Rect, _layer: i32) -> Option<SurfaceId> {
        self.record("take_screenshot");
        Some(SurfaceId::new(1))
    }

    fn apply(&self, _txn: SurfaceTransaction) {
        self.record("apply");
    }
}

#[test]
fn surface_settles_before_transition_is_handed_back() {
    let order = CallOrder::default();
    let services = Services {
        windowing: Arc::new(order.clone()),
        surface: Arc::new(order.clone()),
        perf: Arc::new(MockPerf::new()),
        split: None,
    };
    let (tx, _control) = bounded(64);
    let mut controller =
        PipController::new(PipConfig::default(), DisplayLayout::default(), &services, tx);
    controller.handle(Command::EnterPip(square_params()));
    controller.handle(Command::ScheduleResize {
        bounds: Rect::new(548, 1808, 1080, 2340),
    });
    assert_eq!(controller.state(), PipState::ChangingBounds);
    let token = TransitionToken::new(*order.next_token.lock());
    order.calls.lock().clear();

    controller.handle(Command::TransitionFinished(token));
    assert_eq!(controller.state(), PipState::EnteredPip);
    let shot = order.position("take_screenshot");
    let finish = order.position("finish_transition");
    assert!(shot < finish, "{:?}", order.calls.lock());
    assert!(order.position("apply") < finish, "{:?}", order.calls.lock());
}
