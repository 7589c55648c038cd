//! Recording implementations of the service traits for tests.
//!
//! Each mock records what it was asked to do and can be steered into the
//! failure paths the coordinator handles. Available under `cfg(test)` and the
//! `test-utils` feature.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use pip_ids::{DisplayId, LeashId, SurfaceId, TaskId, TransitionToken};

use crate::{
    error::{Error, Result},
    geom::Rect,
    input::{InputMonitor, MotionEvent},
    runtime::Services,
    services::{
        PerfHintService, PerfSession, SplitPosition, SplitScreen, SurfaceOp, SurfaceService,
        SurfaceTransaction, WindowTransaction, WindowingService,
    },
    transition::TaskInfo,
};

/// One recorded windowing call.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowCall {
    /// `submit`.
    Submit(WindowTransaction),
    /// `start_resize_transition`.
    ResizeTransition {
        /// Transaction passed in.
        txn: WindowTransaction,
        /// Requested animation length.
        duration: Duration,
        /// Token handed back.
        token: TransitionToken,
    },
    /// `start_remove_transition`.
    RemoveTransition {
        /// Fade requested.
        with_fade: bool,
        /// Token handed back.
        token: TransitionToken,
    },
    /// `start_expand_transition`.
    ExpandTransition {
        /// Transaction passed in.
        txn: WindowTransaction,
        /// Expand into split screen.
        to_split: bool,
        /// Token handed back.
        token: TransitionToken,
    },
    /// `finish_transition`.
    Finish(TransitionToken),
    /// `create_input_monitor`.
    CreateInputMonitor(DisplayId),
}

impl WindowCall {
    /// Token of a started transition.
    pub fn started_token(&self) -> Option<TransitionToken> {
        match self {
            Self::ResizeTransition { token, .. }
            | Self::RemoveTransition { token, .. }
            | Self::ExpandTransition { token, .. } => Some(*token),
            _ => None,
        }
    }
}

/// Recording [`WindowingService`].
#[derive(Default)]
pub struct MockWindowing {
    /// Every call, in order.
    calls: Mutex<Vec<WindowCall>>,
    /// Last token handed out.
    next_token: AtomicU64,
    /// Make `create_input_monitor` fail.
    fail_input_monitor: AtomicBool,
    /// Feeds the last monitor created.
    input_tx: Mutex<Option<Sender<MotionEvent>>>,
    /// Pilfer count shared with the monitors.
    pilfered: Arc<AtomicUsize>,
}

impl MockWindowing {
    /// Mock with no calls recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call.
    pub fn calls(&self) -> Vec<WindowCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Tokens of every started transition, oldest first.
    pub fn started_tokens(&self) -> Vec<TransitionToken> {
        self.calls
            .lock()
            .iter()
            .filter_map(WindowCall::started_token)
            .collect()
    }

    /// Most recent started transition.
    pub fn last_started(&self) -> Option<WindowCall> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|c| c.started_token().is_some())
            .cloned()
    }

    /// Tokens acknowledged through `finish_transition`.
    pub fn finished_tokens(&self) -> Vec<TransitionToken> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                WindowCall::Finish(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Transactions passed to `submit`.
    pub fn submitted(&self) -> Vec<WindowTransaction> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                WindowCall::Submit(txn) => Some(txn.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make `create_input_monitor` fail.
    pub fn set_fail_input_monitor(&self, v: bool) {
        self.fail_input_monitor.store(v, Ordering::SeqCst);
    }

    /// Sender feeding the most recently created input monitor.
    pub fn input_sender(&self) -> Option<Sender<MotionEvent>> {
        self.input_tx.lock().clone()
    }

    /// Drop the event sender, closing the monitor's stream.
    pub fn close_input(&self) {
        self.input_tx.lock().take();
    }

    /// Times a monitor captured the pointers.
    pub fn pilfer_count(&self) -> usize {
        self.pilfered.load(Ordering::SeqCst)
    }

    /// Next transition token, counting from one.
    fn token(&self) -> TransitionToken {
        TransitionToken::new(self.next_token.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl WindowingService for MockWindowing {
    fn submit(&self, txn: &WindowTransaction) {
        self.calls.lock().push(WindowCall::Submit(txn.clone()));
    }

    fn start_resize_transition(
        &self,
        txn: &WindowTransaction,
        duration: Duration,
    ) -> TransitionToken {
        let token = self.token();
        self.calls.lock().push(WindowCall::ResizeTransition {
            txn: txn.clone(),
            duration,
            token,
        });
        token
    }

    fn start_remove_transition(&self, with_fade: bool) -> TransitionToken {
        let token = self.token();
        self.calls
            .lock()
            .push(WindowCall::RemoveTransition { with_fade, token });
        token
    }

    fn start_expand_transition(&self, txn: &WindowTransaction, to_split: bool) -> TransitionToken {
        let token = self.token();
        self.calls.lock().push(WindowCall::ExpandTransition {
            txn: txn.clone(),
            to_split,
            token,
        });
        token
    }

    fn finish_transition(&self, token: TransitionToken) {
        self.calls.lock().push(WindowCall::Finish(token));
    }

    fn create_input_monitor(&self, display: DisplayId) -> Result<InputMonitor> {
        self.calls
            .lock()
            .push(WindowCall::CreateInputMonitor(display));
        if self.fail_input_monitor.load(Ordering::SeqCst) {
            return Err(Error::InputMonitor(format!("no monitor on {display}")));
        }
        let (tx, rx) = unbounded();
        *self.input_tx.lock() = Some(tx);
        let pilfered = self.pilfered.clone();
        Ok(InputMonitor::new(rx, move || {
            pilfered.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Recording [`SurfaceService`].
pub struct MockSurface {
    /// Every applied transaction.
    applied: Mutex<Vec<SurfaceTransaction>>,
    /// Screenshot requests as `(leash, crop, layer)`.
    screenshots: Mutex<Vec<(LeashId, Rect, i32)>>,
    /// Last surface id handed out.
    next_surface: AtomicU64,
    /// When cleared, screenshots return `None`.
    screenshots_enabled: AtomicBool,
}

impl Default for MockSurface {
    fn default() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            screenshots: Mutex::new(Vec::new()),
            next_surface: AtomicU64::new(0),
            screenshots_enabled: AtomicBool::new(true),
        }
    }
}

impl MockSurface {
    /// Mock with nothing recorded and screenshots enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every applied transaction.
    pub fn applied(&self) -> Vec<SurfaceTransaction> {
        self.applied.lock().clone()
    }

    /// Every applied op, flattened in order.
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.applied
            .lock()
            .iter()
            .flat_map(|t| t.ops.iter().cloned())
            .collect()
    }

    /// Screenshot requests as `(leash, crop, layer)`.
    pub fn screenshots(&self) -> Vec<(LeashId, Rect, i32)> {
        self.screenshots.lock().clone()
    }

    /// Let screenshots succeed or fail.
    pub fn set_screenshots_enabled(&self, v: bool) {
        self.screenshots_enabled.store(v, Ordering::SeqCst);
    }
}

impl SurfaceService for MockSurface {
    fn take_screenshot(&self, leash: LeashId, crop: Rect, layer: i32) -> Option<SurfaceId> {
        self.screenshots.lock().push((leash, crop, layer));
        if !self.screenshots_enabled.load(Ordering::SeqCst) {
            return None;
        }
        Some(SurfaceId::new(
            self.next_surface.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    fn apply(&self, txn: SurfaceTransaction) {
        self.applied.lock().push(txn);
    }
}

/// Record of one perf session.
#[derive(Clone, Debug)]
pub struct PerfRecord {
    /// Tag passed to `start_session`.
    pub tag: String,
    /// Shared with the session handed out.
    closed: Arc<AtomicBool>,
}

impl PerfRecord {
    /// True once the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Session handed to the code under test.
struct MockPerfSession {
    /// Shared with its [`PerfRecord`].
    closed: Arc<AtomicBool>,
}

impl PerfSession for MockPerfSession {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Recording [`PerfHintService`]. Timeout callbacks are held until a test
/// fires them.
#[derive(Default)]
pub struct MockPerf {
    /// Every session started.
    sessions: Mutex<Vec<PerfRecord>>,
    /// Timeout callbacks by session, taken when fired.
    timeouts: Mutex<Vec<Option<Box<dyn FnOnce() + Send>>>>,
    /// Make `start_session` return `None`.
    unavailable: AtomicBool,
}

impl MockPerf {
    /// Mock with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session started.
    pub fn sessions(&self) -> Vec<PerfRecord> {
        self.sessions.lock().clone()
    }

    /// Tags of every session started.
    pub fn tags(&self) -> Vec<String> {
        self.sessions.lock().iter().map(|s| s.tag.clone()).collect()
    }

    /// Sessions not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|s| !s.is_closed())
            .count()
    }

    /// True when no session is open.
    pub fn all_closed(&self) -> bool {
        self.open_sessions() == 0
    }

    /// Make `start_session` return `None`.
    pub fn set_unavailable(&self, v: bool) {
        self.unavailable.store(v, Ordering::SeqCst);
    }

    /// Invoke the timeout callback of session `index`. Returns false if it
    /// was already fired or never existed.
    pub fn fire_timeout(&self, index: usize) -> bool {
        let cb = self.timeouts.lock().get_mut(index).and_then(Option::take);
        match cb {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }
}

impl PerfHintService for MockPerf {
    fn start_session(
        &self,
        timeout: Box<dyn FnOnce() + Send>,
        tag: &str,
    ) -> Option<Box<dyn PerfSession>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return None;
        }
        let closed = Arc::new(AtomicBool::new(false));
        self.sessions.lock().push(PerfRecord {
            tag: tag.to_string(),
            closed: closed.clone(),
        });
        self.timeouts.lock().push(Some(timeout));
        Some(Box::new(MockPerfSession { closed }))
    }
}

/// Recording [`SplitScreen`].
#[derive(Default)]
pub struct MockSplit {
    /// Tasks reported as in split screen.
    split_tasks: Mutex<Vec<TaskId>>,
    /// Calls to `prepare_enter_split_screen`.
    prepared: Mutex<Vec<(TaskId, SplitPosition)>>,
}

impl MockSplit {
    /// Mock with no task in split screen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `task` as in split screen or not.
    pub fn set_in_split(&self, task: TaskId, in_split: bool) {
        let mut tasks = self.split_tasks.lock();
        tasks.retain(|t| *t != task);
        if in_split {
            tasks.push(task);
        }
    }

    /// Calls to `prepare_enter_split_screen`.
    pub fn prepared(&self) -> Vec<(TaskId, SplitPosition)> {
        self.prepared.lock().clone()
    }
}

impl SplitScreen for MockSplit {
    fn is_task_in_split_screen(&self, task: TaskId) -> bool {
        self.split_tasks.lock().contains(&task)
    }

    fn prepare_enter_split_screen(
        &self,
        txn: &mut WindowTransaction,
        task: &TaskInfo,
        position: SplitPosition,
    ) {
        self.prepared.lock().push((task.id, position));
        txn.enter_split(task.id, position);
    }
}

/// A full set of mocks and the [`Services`] bundle wrapping them.
pub struct MockServices {
    /// Recording windowing service.
    pub windowing: Arc<MockWindowing>,
    /// Recording surface service.
    pub surface: Arc<MockSurface>,
    /// Recording perf service.
    pub perf: Arc<MockPerf>,
    /// Recording split-screen collaborator.
    pub split: Arc<MockSplit>,
    /// Bundle handed to the code under test.
    pub services: Services,
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServices {
    /// Fresh mocks wired into one bundle.
    pub fn new() -> Self {
        let windowing = Arc::new(MockWindowing::new());
        let surface = Arc::new(MockSurface::new());
        let perf = Arc::new(MockPerf::new());
        let split = Arc::new(MockSplit::new());
        let services = Services {
            windowing: windowing.clone(),
            surface: surface.clone(),
            perf: perf.clone(),
            split: Some(split.clone()),
        };
        Self {
            windowing,
            surface,
            perf,
            split,
            services,
        }
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
