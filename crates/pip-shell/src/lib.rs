//! pip-shell: gesture and transition coordinator for a floating
//! picture-in-picture overlay.
//!
//! Tracks the overlay's lifecycle through a strict state machine, turns
//! corner drags and two-finger pinches into resize intents, and commits
//! bounds changes through an external windowing service. Snap-to-edge
//! placement, aspect-ratio constraints and the post-resize cross-fade are
//! handled here; rendering and chrome are left to the host.
//!
//! [`spawn`] starts the coordinator and input threads and returns a
//! [`PipShellHandle`]. Collaborators are reached only through the traits in
//! [`services`].

pub mod aspect;
pub mod bounds;
pub mod config;
pub mod controller;
pub mod display;
pub mod drag;
mod error;
pub mod geom;
pub mod input;
pub mod pinch;
pub mod resize;
pub mod runtime;
pub mod scheduler;
pub mod services;
pub mod snap;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
pub mod transition;

pub use aspect::AspectRatio;
pub use bounds::{BoundsState, PipSnapshot};
pub use config::PipConfig;
pub use controller::{PipController, ResourceDimensions};
pub use display::{DisplayLayout, Rotation};
pub use error::{Error, Result, report_invariant};
pub use geom::{Insets, Point, PointF, Rect, Size};
pub use input::{InputMonitor, MotionEvent};
pub use runtime::{Command, InputControl, PipShellHandle, Services, spawn};
pub use transition::{EnterParams, PipState, TaskInfo, TransitionChange, TransitionExtras};
