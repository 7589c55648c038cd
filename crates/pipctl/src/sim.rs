//! In-process stand-ins for the windowing stack.
//!
//! Every call is logged; transitions complete on a timer thread that reports
//! their tokens back through `completions`.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use pip_ids::{DisplayId, LeashId, SurfaceId, TaskId, TransitionToken};
use pip_shell::{
    InputMonitor, MotionEvent, Rect, Services, TaskInfo,
    services::{
        PerfHintService, PerfSession, SplitPosition, SplitScreen, SurfaceService,
        SurfaceTransaction, WindowTransaction, WindowingService,
    },
};
use tracing::{debug, info, warn};

/// Windowing service whose transitions finish after a fixed latency.
pub struct SimWindowing {
    /// Delay before each transition reports completion.
    latency: Duration,
    /// Next token to hand out.
    next_token: AtomicU64,
    /// Receives finished tokens.
    completions: Sender<TransitionToken>,
    /// Feeds the last monitor created.
    input: Mutex<Option<Sender<MotionEvent>>>,
    /// Times the pointer stream was captured.
    pilfers: Arc<AtomicU64>,
}

impl SimWindowing {
    /// Service whose transitions report to `completions` after `latency`.
    fn new(latency: Duration, completions: Sender<TransitionToken>) -> Self {
        Self {
            latency,
            next_token: AtomicU64::new(1),
            completions,
            input: Mutex::new(None),
            pilfers: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sender feeding the most recently opened input monitor.
    pub fn input(&self) -> Option<Sender<MotionEvent>> {
        self.input.lock().clone()
    }

    /// Times the coordinator captured the pointer stream.
    pub fn pilfer_count(&self) -> u64 {
        self.pilfers.load(Ordering::SeqCst)
    }

    /// Hand out a token and report it finished after the latency.
    fn start(&self, kind: &'static str) -> TransitionToken {
        let token = TransitionToken::new(self.next_token.fetch_add(1, Ordering::SeqCst));
        info!(kind, token = token.raw(), "sim_transition_started");
        let tx = self.completions.clone();
        let latency = self.latency;
        let spawned = thread::Builder::new()
            .name("pip-sim-transition".into())
            .spawn(move || {
                thread::sleep(latency);
                let _ = tx.send(token);
            });
        if let Err(err) = spawned {
            warn!(error = %err, "sim_transition_thread_failed");
        }
        token
    }
}

/// Log each op of `txn`.
fn log_txn(txn: &WindowTransaction) {
    for op in &txn.ops {
        debug!(?op, "sim_window_op");
    }
}

impl WindowingService for SimWindowing {
    fn submit(&self, txn: &WindowTransaction) {
        info!(ops = txn.ops.len(), "sim_submit");
        log_txn(txn);
    }

    fn start_resize_transition(
        &self,
        txn: &WindowTransaction,
        duration: Duration,
    ) -> TransitionToken {
        log_txn(txn);
        debug!(?duration, "sim_resize_duration");
        self.start("resize")
    }

    fn start_remove_transition(&self, with_fade: bool) -> TransitionToken {
        debug!(with_fade, "sim_remove");
        self.start("remove")
    }

    fn start_expand_transition(&self, txn: &WindowTransaction, to_split: bool) -> TransitionToken {
        log_txn(txn);
        debug!(to_split, "sim_expand");
        self.start("expand")
    }

    fn finish_transition(&self, token: TransitionToken) {
        info!(token = token.raw(), "sim_transition_finished");
    }

    fn create_input_monitor(&self, display: DisplayId) -> pip_shell::Result<InputMonitor> {
        let (tx, rx) = unbounded();
        *self.input.lock() = Some(tx);
        let pilfers = self.pilfers.clone();
        let display_raw = display.raw();
        info!(display = display_raw, "sim_input_monitor_opened");
        Ok(InputMonitor::new(rx, move || {
            pilfers.fetch_add(1, Ordering::SeqCst);
            debug!("sim_pointers_pilfered");
        }))
    }
}

/// Surface service that logs each edit and hands out screenshot ids.
#[derive(Default)]
pub struct SimSurface {
    /// Last screenshot id handed out.
    next_surface: AtomicU64,
}

impl SurfaceService for SimSurface {
    fn take_screenshot(&self, leash: LeashId, crop: Rect, layer: i32) -> Option<SurfaceId> {
        let id = SurfaceId::new(self.next_surface.fetch_add(1, Ordering::SeqCst) + 1);
        debug!(leash = leash.raw(), ?crop, layer, surface = id.raw(), "sim_screenshot");
        Some(id)
    }

    fn apply(&self, txn: SurfaceTransaction) {
        for op in txn.ops {
            debug!(?op, "sim_surface_op");
        }
    }
}

/// Session that logs its close once.
struct SimPerfSession {
    /// Session number, from one.
    id: u64,
    /// Cleared on close.
    open: bool,
}

impl PerfSession for SimPerfSession {
    fn close(&mut self) {
        if self.open {
            self.open = false;
            debug!(id = self.id, "sim_perf_session_closed");
        }
    }
}

/// Perf hint service that never times out.
#[derive(Default)]
pub struct SimPerf {
    /// Last session number handed out.
    next_session: AtomicU64,
}

impl PerfHintService for SimPerf {
    fn start_session(
        &self,
        _timeout: Box<dyn FnOnce() + Send>,
        tag: &str,
    ) -> Option<Box<dyn PerfSession>> {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(id, tag, "sim_perf_session_opened");
        Some(Box::new(SimPerfSession { id, open: true }))
    }
}

/// Split-screen collaborator with at most one task in split.
pub struct SimSplit {
    /// Task reported as in split screen.
    in_split: Option<TaskId>,
}

impl SplitScreen for SimSplit {
    fn is_task_in_split_screen(&self, task: TaskId) -> bool {
        self.in_split == Some(task)
    }

    fn prepare_enter_split_screen(
        &self,
        txn: &mut WindowTransaction,
        task: &TaskInfo,
        position: SplitPosition,
    ) {
        debug!(task = task.id.raw(), ?position, "sim_prepare_split");
        txn.enter_split(task.id, position);
    }
}

/// A full simulated service set plus the receiver for finished transitions.
pub struct SimStack {
    /// Windowing service, for injecting input and counting captures.
    pub windowing: Arc<SimWindowing>,
    /// Bundle handed to the coordinator.
    pub services: Services,
    /// Tokens of finished transitions.
    pub completions: Receiver<TransitionToken>,
}

impl SimStack {
    /// Full stack finishing transitions after `latency`, with `split_task`
    /// reported as in split screen.
    pub fn new(latency: Duration, split_task: Option<TaskId>) -> Self {
        let (tx, completions) = unbounded();
        let windowing = Arc::new(SimWindowing::new(latency, tx));
        let services = Services {
            windowing: windowing.clone(),
            surface: Arc::new(SimSurface::default()),
            perf: Arc::new(SimPerf::default()),
            split: Some(Arc::new(SimSplit {
                in_split: split_task,
            })),
        };
        Self {
            windowing,
            services,
            completions,
        }
    }
}
