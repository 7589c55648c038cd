//! Coordinator and input threads.
//!
//! The coordinator thread owns the [`PipController`] and consumes [`Command`]s
//! from a bounded channel. The input thread owns the
//! [`ResizeGestureHandler`], reads pointer events from its input monitor and
//! [`InputControl`] messages from the coordinator, and only ever talks back by
//! posting commands. No state is shared between the two.

use std::{
    collections::VecDeque,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{
    Receiver, RecvTimeoutError, Sender, TrySendError, bounded, never, select,
};
use pip_ids::{DisplayId, TransitionToken};
use tracing::{debug, info, trace, warn};

use crate::{
    bounds::{ExclusionObserver, PipSnapshot},
    config::PipConfig,
    controller::{PipController, ResourceDimensions, ResourceListener},
    display::DisplayLayout,
    error::{Error, Result},
    geom::Rect,
    input::{InputMonitor, MotionEvent},
    resize::ResizeGestureHandler,
    services::{PerfHintService, SplitScreen, SurfaceService, WindowingService},
    transition::{EnterParams, ListenerId, TransitionListener},
};

/// Request handled on the coordinator thread.
pub enum Command {
    /// Start a session for a task.
    EnterPip(EnterParams),
    /// Leave by expanding the task to full screen or split screen.
    ExitViaExpand,
    /// Leave by removing the task.
    Remove {
        /// Fade the overlay out while removing it.
        with_fade: bool,
    },
    /// Display size or rotation changed.
    DisplayChanged(DisplayLayout),
    /// Aspect ratio requested by the app, width / height.
    SetAspectRatio(f32),
    /// Hold or release the display rotation.
    SetFixedRotation(bool),
    /// Set or clear a named exclusion area.
    SetNamedExclusionArea {
        /// Area name; one rectangle per name.
        name: String,
        /// `None` clears the area.
        area: Option<Rect>,
    },
    /// Ignore gestures while set.
    SetInputSuppressed(bool),
    /// Tuck or untuck the overlay.
    SetStashed(bool),
    /// New chrome dimensions from the host.
    SetResourceDimensions(ResourceDimensions),
    /// Final rectangle of a resize gesture.
    ScheduleResize {
        /// Target bounds.
        bounds: Rect,
    },
    /// The windowing service finished the transition behind `token`.
    TransitionFinished(TransitionToken),
    /// Open the input monitor; sent once by the input thread.
    AttachInputMonitor {
        /// Display to monitor.
        display: DisplayId,
        /// Receives the monitor or the reason it is unavailable.
        reply: Sender<Result<InputMonitor>>,
    },
    /// Subscribe to the in-pip flag.
    SubscribeInPip {
        /// Receives the subscription.
        reply: Sender<Receiver<bool>>,
    },
    /// Register a lifecycle listener.
    AddListener {
        /// Listener to add.
        listener: Box<dyn TransitionListener>,
        /// Receives the handle for removal.
        reply: Sender<ListenerId>,
    },
    /// Unregister a lifecycle listener.
    RemoveListener(ListenerId),
    /// Watch the exclusion map.
    AddExclusionObserver(ExclusionObserver),
    /// Watch chrome dimensions.
    AddResourceListener(ResourceListener),
    /// Read the current snapshot.
    Snapshot {
        /// Receives the snapshot.
        reply: Sender<PipSnapshot>,
    },
    /// Describe the coordinator state.
    Dump {
        /// Receives the description.
        reply: Sender<String>,
    },
    /// Stop the coordinator loop.
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EnterPip(_) => "EnterPip",
            Self::ExitViaExpand => "ExitViaExpand",
            Self::Remove { .. } => "Remove",
            Self::DisplayChanged(_) => "DisplayChanged",
            Self::SetAspectRatio(_) => "SetAspectRatio",
            Self::SetFixedRotation(_) => "SetFixedRotation",
            Self::SetNamedExclusionArea { .. } => "SetNamedExclusionArea",
            Self::SetInputSuppressed(_) => "SetInputSuppressed",
            Self::SetStashed(_) => "SetStashed",
            Self::SetResourceDimensions(_) => "SetResourceDimensions",
            Self::ScheduleResize { .. } => "ScheduleResize",
            Self::TransitionFinished(_) => "TransitionFinished",
            Self::AttachInputMonitor { .. } => "AttachInputMonitor",
            Self::SubscribeInPip { .. } => "SubscribeInPip",
            Self::AddListener { .. } => "AddListener",
            Self::RemoveListener(_) => "RemoveListener",
            Self::AddExclusionObserver(_) => "AddExclusionObserver",
            Self::AddResourceListener(_) => "AddResourceListener",
            Self::Snapshot { .. } => "Snapshot",
            Self::Dump { .. } => "Dump",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Message from the coordinator to the input thread.
#[derive(Clone, Debug, PartialEq)]
pub enum InputControl {
    /// Latest coordinator state for hit-testing and clamping.
    Snapshot(PipSnapshot),
    /// The scheduled resize landed, or was refused.
    ResizeFinished,
    /// The overlay left; cancel everything in flight.
    ExitedPip,
    /// The perf session with this generation timed out.
    PerfTimeout(u64),
    /// Stop the input loop.
    Shutdown,
}

/// Non-blocking sender for [`InputControl`] messages.
///
/// The coordinator never blocks on the input thread: when the channel is
/// full, messages wait in a local backlog that is flushed on the next loop
/// iteration. Only the newest queued snapshot is kept.
pub struct ControlOutbox {
    /// Channel to the input thread.
    tx: Sender<InputControl>,
    /// Messages the channel had no room for, oldest first.
    backlog: VecDeque<InputControl>,
}

impl ControlOutbox {
    /// Outbox with an empty backlog.
    pub fn new(tx: Sender<InputControl>) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
        }
    }

    /// Queue `msg` and push what the channel accepts, replacing any queued
    /// snapshot with a newer one.
    pub fn send(&mut self, msg: InputControl) {
        if matches!(msg, InputControl::Snapshot(_)) {
            self.backlog
                .retain(|m| !matches!(m, InputControl::Snapshot(_)));
        }
        self.backlog.push_back(msg);
        self.flush();
    }

    /// Push as much of the backlog as the channel accepts.
    pub fn flush(&mut self) {
        while let Some(msg) = self.backlog.pop_front() {
            match self.tx.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(msg)) => {
                    self.backlog.push_front(msg);
                    trace!(backlog = self.backlog.len(), "control_channel_full");
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.backlog.clear();
                    break;
                }
            }
        }
    }

    /// True while messages wait for room.
    pub fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Deliver the backlog and a final `Shutdown`, waiting at most `timeout`
    /// per message.
    pub fn close(&mut self, timeout: Duration) {
        self.backlog.push_back(InputControl::Shutdown);
        while let Some(msg) = self.backlog.pop_front() {
            if self.tx.send_timeout(msg, timeout).is_err() {
                debug!("control_close_undelivered");
                self.backlog.clear();
            }
        }
    }
}

/// Collaborators handed to [`spawn`].
#[derive(Clone)]
pub struct Services {
    /// Windowing and transition service.
    pub windowing: Arc<dyn WindowingService>,
    /// Direct surface access.
    pub surface: Arc<dyn SurfaceService>,
    /// Perf hints for pinches.
    pub perf: Arc<dyn PerfHintService>,
    /// Split-screen collaborator, when the shell has one.
    pub split: Option<Arc<dyn SplitScreen>>,
}

/// How long shutdown waits to hand the input thread its final message.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Start the coordinator and input threads.
pub fn spawn(config: PipConfig, display: DisplayLayout, services: Services) -> Result<PipShellHandle> {
    config.validate()?;
    let (cmd_tx, cmd_rx) = bounded(config.command_capacity);
    let (ctl_tx, ctl_rx) = bounded(config.input_control_capacity);
    let frame_interval = config.frame_interval();

    let controller = PipController::new(config.clone(), display, &services, ctl_tx.clone());
    let coordinator = thread::Builder::new()
        .name("pip-coordinator".into())
        .spawn(move || run_coordinator(controller, cmd_rx, frame_interval))?;

    let gesture = ResizeGestureHandler::new(
        &config,
        services.surface.clone(),
        services.perf.clone(),
        cmd_tx.clone(),
        ctl_tx,
    );
    let input_cmds = cmd_tx.clone();
    let input = thread::Builder::new()
        .name("pip-input".into())
        .spawn(move || run_input(gesture, input_cmds, ctl_rx, display.display_id))?;

    Ok(PipShellHandle {
        commands: cmd_tx,
        coordinator: Some(coordinator),
        input: Some(input),
    })
}

/// Coordinator loop: apply commands, ticking at `frame` while an animation
/// or backlog needs it.
fn run_coordinator(mut controller: PipController, commands: Receiver<Command>, frame: Duration) {
    info!("coordinator_started");
    loop {
        let next = if controller.needs_frames() {
            match commands.recv_timeout(frame) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            }
        };
        if let Some(cmd) = next {
            trace!(?cmd, "command");
            if !controller.handle(cmd) {
                break;
            }
        }
        controller.tick(Instant::now());
    }
    controller.shutdown(SHUTDOWN_TIMEOUT);
    info!("coordinator_stopped");
}

/// Input loop: attach the monitor, then route events and control messages.
fn run_input(
    mut gesture: ResizeGestureHandler,
    commands: Sender<Command>,
    control: Receiver<InputControl>,
    display_id: DisplayId,
) {
    // Blocking round-trip: resizing is not interactive until attached.
    let (reply, attached) = bounded(1);
    if commands
        .send(Command::AttachInputMonitor {
            display: display_id,
            reply,
        })
        .is_err()
    {
        return;
    }
    let monitor = match attached.recv() {
        Ok(Ok(monitor)) => monitor,
        Ok(Err(e)) => {
            warn!(error = %e, "input_monitor_unavailable");
            return;
        }
        Err(_) => return,
    };
    info!(display = %display_id, "input_attached");

    let closed = never::<MotionEvent>();
    let mut events_open = true;
    loop {
        let events = if events_open {
            monitor.events()
        } else {
            &closed
        };
        select! {
            recv(events) -> ev => match ev {
                Ok(ev) => gesture.on_input_event(&ev, &monitor),
                Err(_) => {
                    debug!("input_monitor_closed");
                    events_open = false;
                }
            },
            recv(control) -> msg => match msg {
                Ok(msg) => {
                    if !gesture.handle_control(msg) {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
    gesture.on_exited_pip();
    info!("input_stopped");
}

/// Owner-side handle to a running coordinator.
pub struct PipShellHandle {
    /// Coordinator command channel.
    commands: Sender<Command>,
    /// Joined on shutdown.
    coordinator: Option<JoinHandle<()>>,
    /// Joined on shutdown.
    input: Option<JoinHandle<()>>,
}

impl PipShellHandle {
    /// Post a command to the coordinator, blocking while its queue is full.
    pub fn post(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).map_err(|_| Error::ChannelClosed)
    }

    /// Sender for collaborators that report back, e.g. transition completion.
    pub fn sender(&self) -> Sender<Command> {
        self.commands.clone()
    }

    /// Post a command carrying a reply channel and wait for the answer.
    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.post(make(tx))?;
        rx.recv().map_err(|_| Error::ChannelClosed)
    }

    /// Start a session for `params.task`.
    pub fn enter_pip(&self, params: EnterParams) -> Result<()> {
        self.post(Command::EnterPip(params))
    }

    /// Leave by expanding the task.
    pub fn exit_via_expand(&self) -> Result<()> {
        self.post(Command::ExitViaExpand)
    }

    /// Leave by removing the task.
    pub fn remove(&self, with_fade: bool) -> Result<()> {
        self.post(Command::Remove { with_fade })
    }

    /// Report a display size or rotation change.
    pub fn display_changed(&self, layout: DisplayLayout) -> Result<()> {
        self.post(Command::DisplayChanged(layout))
    }

    /// Request an aspect ratio, width / height.
    pub fn set_aspect_ratio(&self, ratio: f32) -> Result<()> {
        self.post(Command::SetAspectRatio(ratio))
    }

    /// Report that the transition behind `token` finished.
    pub fn transition_finished(&self, token: TransitionToken) -> Result<()> {
        self.post(Command::TransitionFinished(token))
    }

    /// Current coordinator state.
    pub fn snapshot(&self) -> Result<PipSnapshot> {
        self.request(|reply| Command::Snapshot { reply })
    }

    /// Human-readable description of the coordinator state.
    pub fn dump(&self) -> Result<String> {
        self.request(|reply| Command::Dump { reply })
    }

    /// Receiver of the in-pip flag, primed with the current value.
    pub fn subscribe_in_pip(&self) -> Result<Receiver<bool>> {
        self.request(|reply| Command::SubscribeInPip { reply })
    }

    /// Register a lifecycle listener.
    pub fn add_listener(&self, listener: Box<dyn TransitionListener>) -> Result<ListenerId> {
        self.request(|reply| Command::AddListener { listener, reply })
    }

    /// Stop both threads and wait for them.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    /// Send `Shutdown` and join both threads.
    fn stop(&mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        let coordinator = self.coordinator.take().map(JoinHandle::join);
        let input = self.input.take().map(JoinHandle::join);
        if matches!(coordinator, Some(Err(_))) {
            return Err(Error::ThreadJoin("pip-coordinator"));
        }
        if matches!(input, Some(Err(_))) {
            return Err(Error::ThreadJoin("pip-input"));
        }
        Ok(())
    }
}

impl Drop for PipShellHandle {
    fn drop(&mut self) {
        if self.coordinator.is_some() || self.input.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_backlogs_when_full_and_coalesces_snapshots() {
        let (tx, rx) = bounded(1);
        let mut outbox = ControlOutbox::new(tx);
        outbox.send(InputControl::ResizeFinished);
        outbox.send(InputControl::Snapshot(PipSnapshot::default()));
        let newer = PipSnapshot {
            stashed: true,
            ..PipSnapshot::default()
        };
        outbox.send(InputControl::Snapshot(newer));
        assert!(outbox.has_backlog());

        assert_eq!(rx.try_recv(), Ok(InputControl::ResizeFinished));
        outbox.flush();
        assert_eq!(rx.try_recv(), Ok(InputControl::Snapshot(newer)));
        outbox.flush();
        assert!(!outbox.has_backlog());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn outbox_drops_backlog_when_disconnected() {
        let (tx, rx) = bounded(1);
        let mut outbox = ControlOutbox::new(tx);
        drop(rx);
        outbox.send(InputControl::ExitedPip);
        assert!(!outbox.has_backlog());
    }
}
