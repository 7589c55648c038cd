//! Command-line interface definitions for pipctl.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use logging::LogArgs;

/// Command-line interface for the `pipctl` binary.
#[derive(Parser, Debug)]
#[command(
    name = "pipctl",
    about = "Drive scripted overlay sessions against simulated services",
    version
)]
pub struct Cli {
    /// Logging controls.
    #[command(flatten)]
    pub log: LogArgs,

    /// Display and timing for the simulated session.
    #[command(flatten)]
    pub session: SessionArgs,

    /// Which scenario to run once the overlay has entered.
    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every scenario.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Optional path to a coordinator configuration file (RON).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Simulated display width in pixels.
    #[arg(long, default_value_t = 1080, global = true)]
    pub width: i32,

    /// Simulated display height in pixels.
    #[arg(long, default_value_t = 2340, global = true)]
    pub height: i32,

    /// Aspect ratio the simulated app requests (width / height).
    #[arg(long, global = true)]
    pub aspect: Option<f32>,

    /// Launch the overlay from a task that is in split screen.
    #[arg(long, global = true)]
    pub from_split: bool,

    /// How long the simulated windowing service takes to finish a transition.
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "30ms",
        value_name = "DURATION",
        global = true
    )]
    pub transition_latency: Duration,

    /// Pause between synthesized input events.
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "5ms",
        value_name = "DURATION",
        global = true
    )]
    pub event_interval: Duration,

    /// Duration to wait after the scenario before collecting the final snapshot.
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "400ms",
        value_name = "DURATION",
        global = true
    )]
    pub settle_after: Duration,

    /// Emit a JSON report instead of the text dump.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Scenarios pipctl can drive.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Enter the overlay and report its placement.
    Enter,
    /// Resize by dragging one corner.
    Drag(DragArgs),
    /// Resize with a two-finger pinch.
    Pinch(PinchArgs),
    /// Expand the overlay back to full screen.
    Exit,
    /// Dismiss the overlay.
    Remove(RemoveArgs),
    /// Rotate the simulated display.
    Rotate(RotateArgs),
}

/// Corner grabbed by a drag.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    /// Top-left corner.
    TopLeft,
    /// Top-right corner.
    TopRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom-right corner.
    BottomRight,
}

/// Arguments for the `drag` subcommand.
#[derive(Args, Debug, Clone)]
pub struct DragArgs {
    /// Corner to grab.
    #[arg(long, value_enum, default_value_t = Corner::TopLeft)]
    pub corner: Corner,

    /// Horizontal travel in pixels.
    #[arg(long, allow_hyphen_values = true, default_value_t = -100.0)]
    pub dx: f32,

    /// Vertical travel in pixels.
    #[arg(long, allow_hyphen_values = true, default_value_t = -100.0)]
    pub dy: f32,

    /// Number of move events between press and release.
    #[arg(long, default_value_t = 8)]
    pub steps: u32,
}

/// Arguments for the `pinch` subcommand.
#[derive(Args, Debug, Clone)]
pub struct PinchArgs {
    /// Final finger spread relative to the initial spread.
    #[arg(long, default_value_t = 1.5)]
    pub scale: f32,

    /// Rotation of the finger pair in degrees over the gesture.
    #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
    pub rotate: f32,

    /// Number of move events between the second press and release.
    #[arg(long, default_value_t = 8)]
    pub steps: u32,
}

/// Arguments for the `remove` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Fade the overlay out instead of cutting it.
    #[arg(long)]
    pub fade: bool,
}

/// Display orientation targets.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Natural orientation.
    #[value(name = "0")]
    R0,
    /// Quarter turn clockwise.
    #[value(name = "90")]
    R90,
    /// Upside down.
    #[value(name = "180")]
    R180,
    /// Three quarter turns clockwise.
    #[value(name = "270")]
    R270,
}

/// Arguments for the `rotate` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RotateArgs {
    /// Target rotation in degrees.
    #[arg(value_enum, default_value = "90")]
    pub to: Orientation,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn drag_accepts_negative_travel() {
        let cli = Cli::try_parse_from([
            "pipctl", "drag", "--corner", "top-right", "--dx", "-40", "--dy", "25",
        ])
        .expect("parse");
        let Commands::Drag(args) = cli.command else {
            panic!("expected drag");
        };
        assert_eq!(args.corner, Corner::TopRight);
        assert_eq!((args.dx, args.dy), (-40.0, 25.0));
    }

    #[test]
    fn durations_use_humantime() {
        let cli = Cli::try_parse_from(["pipctl", "--settle-after", "1s", "enter"]).expect("parse");
        assert_eq!(cli.session.settle_after, Duration::from_secs(1));
        assert_eq!(cli.session.transition_latency, Duration::from_millis(30));
    }
}
