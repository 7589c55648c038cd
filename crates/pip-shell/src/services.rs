//! Narrow interfaces to the collaborators the coordinator drives.
//!
//! Every service is shared between the coordinator and input threads behind an
//! `Arc`, so methods take `&self` and implementations synchronise internally.

use std::time::Duration;

use pip_ids::{DisplayId, LeashId, SurfaceId, TaskId, TransitionToken};

use crate::{
    error::Result,
    geom::Rect,
    input::InputMonitor,
    transition::TaskInfo,
};

/// Side of the screen a task takes when entering split screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SplitPosition {
    /// Top in portrait, left in landscape.
    TopOrLeft,
    /// Bottom in portrait, right in landscape.
    BottomOrRight,
}

/// One edit in a windowing transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowOp {
    /// Move and resize `task`.
    SetBounds {
        /// Task to move.
        task: TaskId,
        /// New bounds in display pixels.
        bounds: Rect,
    },
    /// Hold configuration changes for `task` until the transition ends.
    DeferConfigToTransitionEnd {
        /// Task whose configuration is held.
        task: TaskId,
    },
    /// Leave the overlay and go full screen.
    SetFullscreen {
        /// Task to expand.
        task: TaskId,
    },
    /// Place `task` into split screen at `position`.
    EnterSplit {
        /// Task to place.
        task: TaskId,
        /// Side of the split it takes.
        position: SplitPosition,
    },
}

/// Ordered batch of windowing edits, applied atomically by the service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowTransaction {
    /// Edits in application order.
    pub ops: Vec<WindowOp>,
}

impl WindowTransaction {
    /// Empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move and resize `task`.
    pub fn set_bounds(&mut self, task: TaskId, bounds: Rect) -> &mut Self {
        self.ops.push(WindowOp::SetBounds { task, bounds });
        self
    }

    /// Hold configuration changes for `task` until the transition ends.
    pub fn defer_config_to_transition_end(&mut self, task: TaskId) -> &mut Self {
        self.ops.push(WindowOp::DeferConfigToTransitionEnd { task });
        self
    }

    /// Take `task` out of the overlay to full screen.
    pub fn set_fullscreen(&mut self, task: TaskId) -> &mut Self {
        self.ops.push(WindowOp::SetFullscreen { task });
        self
    }

    /// Move `task` into split screen.
    pub fn enter_split(&mut self, task: TaskId, position: SplitPosition) -> &mut Self {
        self.ops.push(WindowOp::EnterSplit { task, position });
        self
    }

    /// Last bounds set for `task` in this transaction.
    pub fn bounds_for(&self, task: TaskId) -> Option<Rect> {
        self.ops.iter().rev().find_map(|op| match op {
            WindowOp::SetBounds { task: t, bounds } if *t == task => Some(*bounds),
            _ => None,
        })
    }

    /// True when the transaction carries no edits.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// 2D affine transform mapping `(x, y)` to
/// `(scale_x * x + skew_x * y + trans_x, skew_y * x + scale_y * y + trans_y)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    /// Horizontal scale.
    pub scale_x: f32,
    /// Horizontal shear.
    pub skew_x: f32,
    /// Vertical shear.
    pub skew_y: f32,
    /// Vertical scale.
    pub scale_y: f32,
    /// Horizontal translation.
    pub trans_x: f32,
    /// Vertical translation.
    pub trans_y: f32,
}

impl Affine {
    /// Maps every point to itself.
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        skew_x: 0.0,
        skew_y: 0.0,
        scale_y: 1.0,
        trans_x: 0.0,
        trans_y: 0.0,
    };

    /// Transform the point `(x, y)`.
    pub fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.scale_x * x + self.skew_x * y + self.trans_x,
            self.skew_y * x + self.scale_y * y + self.trans_y,
        )
    }
}

/// One direct edit to a compositor surface.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    /// Set the full transform of the overlay's leash.
    SetMatrix {
        /// Leash to transform.
        leash: LeashId,
        /// Transform relative to the display origin.
        matrix: Affine,
    },
    /// Move a surface so its top-left corner lands on `(x, y)`.
    SetPosition {
        /// Surface to move.
        surface: SurfaceId,
        /// Horizontal position in display pixels.
        x: f32,
        /// Vertical position in display pixels.
        y: f32,
    },
    /// Set surface opacity, `0.0` to `1.0`.
    SetAlpha {
        /// Surface to fade.
        surface: SurfaceId,
        /// New opacity.
        alpha: f32,
    },
    /// Detach and release a surface.
    Remove {
        /// Surface to release.
        surface: SurfaceId,
    },
}

/// Batch of surface edits committed together, bypassing the windowing
/// pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceTransaction {
    /// Edits in application order.
    pub ops: Vec<SurfaceOp>,
}

impl SurfaceTransaction {
    /// Empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op`.
    pub fn push(&mut self, op: SurfaceOp) -> &mut Self {
        self.ops.push(op);
        self
    }
}

/// The windowing/transition service.
pub trait WindowingService: Send + Sync {
    /// Apply a transaction immediately, without a transition.
    fn submit(&self, txn: &WindowTransaction);
    /// Animate `txn` over `duration`. Completion arrives as
    /// `Command::TransitionFinished` with the returned token.
    fn start_resize_transition(&self, txn: &WindowTransaction, duration: Duration)
    -> TransitionToken;
    /// Animate removing the overlay, fading it out when `with_fade` is set.
    fn start_remove_transition(&self, with_fade: bool) -> TransitionToken;
    /// Animate expanding the task out of the overlay, into split screen when
    /// `to_split` is set.
    fn start_expand_transition(&self, txn: &WindowTransaction, to_split: bool) -> TransitionToken;
    /// Acknowledge a completed transition.
    fn finish_transition(&self, token: TransitionToken);
    /// Open a monitor-style input channel on `display`.
    fn create_input_monitor(&self, display: DisplayId) -> Result<InputMonitor>;
}

/// Direct compositor surface access.
pub trait SurfaceService: Send + Sync {
    /// Capture `crop` of `leash` into a new surface stacked at `layer`.
    fn take_screenshot(&self, leash: LeashId, crop: Rect, layer: i32) -> Option<SurfaceId>;
    /// Commit `txn` to the compositor.
    fn apply(&self, txn: SurfaceTransaction);
}

/// A held high-performance scheduling session.
pub trait PerfSession: Send {
    /// End the session.
    fn close(&mut self);
}

/// Source of high-performance sessions.
pub trait PerfHintService: Send + Sync {
    /// Start a session; `timeout` is invoked if the session outlives the
    /// service's limit.
    fn start_session(
        &self,
        timeout: Box<dyn FnOnce() + Send>,
        tag: &str,
    ) -> Option<Box<dyn PerfSession>>;
}

/// Split-screen collaborator.
pub trait SplitScreen: Send + Sync {
    /// True when `task` currently sits in a split-screen layout.
    fn is_task_in_split_screen(&self, task: TaskId) -> bool;
    /// Add the edits that move `task` into split screen at `position`.
    fn prepare_enter_split_screen(
        &self,
        txn: &mut WindowTransaction,
        task: &TaskInfo,
        position: SplitPosition,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_for_returns_last_write() {
        let t = TaskId::new(1);
        let mut txn = WindowTransaction::new();
        txn.set_bounds(t, Rect::new(0, 0, 1, 1))
            .defer_config_to_transition_end(t)
            .set_bounds(t, Rect::new(0, 0, 2, 2));
        assert_eq!(txn.bounds_for(t), Some(Rect::new(0, 0, 2, 2)));
        assert_eq!(txn.bounds_for(TaskId::new(2)), None);
    }

    #[test]
    fn identity_maps_points_to_themselves() {
        assert_eq!(Affine::IDENTITY.map(3.0, -4.0), (3.0, -4.0));
    }
}
