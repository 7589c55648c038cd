//! One scripted session: spawn the coordinator on simulated services, enter
//! the overlay, run a scenario, and report what happened.

use std::{
    io::{self, Write},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use logging::tail::LogTail;
use parking_lot::Mutex;
use pip_ids::{DisplayId, LeashId, TaskId, TransitionToken};
use pip_shell::{
    Command, DisplayLayout, EnterParams, Insets, MotionEvent, PipConfig, PipShellHandle,
    PipSnapshot, PipState, Rotation, TaskInfo, TransitionChange, spawn,
    transition::TransitionRequests,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    cli::{Commands, Orientation, SessionArgs},
    error::{Error, Result},
    gesture,
    sim::SimStack,
};

/// Task shown in the overlay.
const OVERLAY_TASK: TaskId = TaskId::new(1);
/// Task the overlay launches from when `--from-split` is set.
const HOST_TASK: TaskId = TaskId::new(2);
/// Leash carrying the overlay task.
const OVERLAY_LEASH: LeashId = LeashId::new(1);
/// How long to wait for the coordinator to open its input monitor.
const INPUT_READY_TIMEOUT: Duration = Duration::from_secs(2);
/// Interval between checks for the input monitor.
const INPUT_READY_POLL: Duration = Duration::from_millis(5);
/// Grace period for the input thread to take a freshly published snapshot.
const INPUT_SYNC: Duration = Duration::from_millis(50);

/// One observed state change.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TransitionRecord {
    /// State before the change.
    pub from: PipState,
    /// State after the change.
    pub to: PipState,
}

/// Everything pipctl prints at the end of a session.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Subcommand that ran.
    pub scenario: &'static str,
    /// Coordinator state after the settle delay.
    pub snapshot: PipSnapshot,
    /// Every state change, in order.
    pub transitions: Vec<TransitionRecord>,
    /// Times the coordinator captured the pointer stream.
    pub pointer_captures: u64,
    /// Coordinator dump, one line per entry.
    pub dump: Vec<String>,
    /// Recent log events in logfmt.
    pub log: Vec<String>,
}

impl Report {
    /// Human-readable form of the report.
    fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "scenario: {}", self.scenario)?;
        writeln!(
            out,
            "bounds: {} in_pip={} pointer_captures={}",
            self.snapshot.bounds, self.snapshot.in_pip, self.pointer_captures
        )?;
        writeln!(out, "transitions:")?;
        for t in &self.transitions {
            writeln!(out, "  {} -> {}", t.from, t.to)?;
        }
        for line in &self.dump {
            writeln!(out, "{line}")?;
        }
        if !self.log.is_empty() {
            writeln!(out, "recent events:")?;
            for line in &self.log {
                writeln!(out, "  {line}")?;
            }
        }
        Ok(())
    }
}

/// Forwards simulated transition completions to the coordinator until dropped.
struct CompletionPump {
    /// Dropped to stop the pump thread.
    stop: Option<Sender<()>>,
    /// The pump thread, joined on drop.
    join: Option<JoinHandle<()>>,
}

impl CompletionPump {
    /// Spawn the pump thread.
    fn start(completions: Receiver<TransitionToken>, commands: Sender<Command>) -> Result<Self> {
        let (stop, stopped) = bounded::<()>(0);
        let join = thread::Builder::new()
            .name("pip-sim-completions".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(completions) -> token => {
                            let Ok(token) = token else { break };
                            debug!(token = token.raw(), "completion_forwarded");
                            if commands.send(Command::TransitionFinished(token)).is_err() {
                                break;
                            }
                        }
                        recv(stopped) -> _ => break,
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            join: Some(join),
        })
    }
}

impl Drop for CompletionPump {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Run `command` end to end and print the report on stdout.
pub fn run(args: &SessionArgs, command: &Commands, tail: &LogTail) -> Result<()> {
    let config = match &args.config {
        Some(path) => PipConfig::load(path)?,
        None => PipConfig::default(),
    };
    let display = DisplayLayout::new(DisplayId::new(0), args.width, args.height, Insets::default());
    let split_host = args.from_split.then_some(HOST_TASK);
    let stack = SimStack::new(args.transition_latency, split_host);

    let handle = spawn(config, display, stack.services.clone())?;
    let _pump = CompletionPump::start(stack.completions.clone(), handle.sender())?;
    let transitions = record_transitions(&handle)?;
    let events = wait_for_input(&stack)?;

    handle.enter_pip(EnterParams {
        task: TaskInfo {
            host_task: split_host,
            ..TaskInfo::new(OVERLAY_TASK)
        },
        leash: OVERLAY_LEASH,
        aspect_ratio: args.aspect,
        from_swipe: false,
    })?;
    let entered = handle.snapshot()?;
    info!(bounds = %entered.bounds, "session_entered");
    thread::sleep(INPUT_SYNC);

    let scenario = match command {
        Commands::Enter => "enter",
        Commands::Drag(drag) => {
            let script = gesture::drag_script(
                entered.bounds,
                drag.corner,
                drag.dx,
                drag.dy,
                drag.steps,
            );
            play(&events, script, args.event_interval)?;
            "drag"
        }
        Commands::Pinch(pinch) => {
            let script =
                gesture::pinch_script(entered.bounds, pinch.scale, pinch.rotate, pinch.steps);
            play(&events, script, args.event_interval)?;
            "pinch"
        }
        Commands::Exit => {
            handle.exit_via_expand()?;
            "exit"
        }
        Commands::Remove(remove) => {
            handle.remove(remove.fade)?;
            "remove"
        }
        Commands::Rotate(rotate) => {
            handle.display_changed(display.rotate_to(rotation(rotate.to)))?;
            "rotate"
        }
    };
    thread::sleep(args.settle_after);

    let report = Report {
        scenario,
        snapshot: handle.snapshot()?,
        transitions: transitions.lock().clone(),
        pointer_captures: stack.windowing.pilfer_count(),
        dump: handle.dump()?.lines().map(str::to_string).collect(),
        log: tail.lines(),
    };
    handle.shutdown()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        report.write_text(&mut out)?;
    }
    Ok(())
}

/// Record every state change into a shared list.
fn record_transitions(handle: &PipShellHandle) -> Result<Arc<Mutex<Vec<TransitionRecord>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    handle.add_listener(Box::new(
        move |change: &TransitionChange, _: &mut TransitionRequests| {
            sink.lock().push(TransitionRecord {
                from: change.from,
                to: change.to,
            });
        },
    ))?;
    Ok(seen)
}

/// Wait for the coordinator to open its input monitor.
fn wait_for_input(stack: &SimStack) -> Result<Sender<MotionEvent>> {
    let deadline = Instant::now() + INPUT_READY_TIMEOUT;
    loop {
        if let Some(tx) = stack.windowing.input() {
            return Ok(tx);
        }
        if Instant::now() >= deadline {
            return Err(Error::InputUnavailable(INPUT_READY_TIMEOUT));
        }
        thread::sleep(INPUT_READY_POLL);
    }
}

/// Inject `script`, pausing `interval` between events.
fn play(events: &Sender<MotionEvent>, script: Vec<MotionEvent>, interval: Duration) -> Result<()> {
    for ev in script {
        debug!(action = ?ev.action, pointers = ev.pointer_count(), "inject_event");
        events
            .send(ev)
            .map_err(|_| Error::scenario("input monitor closed"))?;
        thread::sleep(interval);
    }
    Ok(())
}

/// Display rotation for a CLI orientation.
fn rotation(o: Orientation) -> Rotation {
    match o {
        Orientation::R0 => Rotation::R0,
        Orientation::R90 => Rotation::R90,
        Orientation::R180 => Rotation::R180,
        Orientation::R270 => Rotation::R270,
    }
}
