//! Translates resize, expand and remove intents into windowing transactions.
//!
//! The scheduler is the only component that commits bounds through the
//! windowing service. Every operation is a silent no-op while no task is
//! attached: a gesture finishing just after the user left the overlay is an
//! expected race, not an error.

use std::{
    fmt::Write as _,
    sync::Arc,
    time::{Duration, Instant},
};

use pip_ids::{LeashId, SurfaceId, TaskId, TransitionToken};
use tracing::{debug, trace};

use crate::{
    bounds::BoundsState,
    display::DisplayLayout,
    geom::{Point, Rect},
    services::{
        Affine, SplitPosition, SplitScreen, SurfaceOp, SurfaceService, SurfaceTransaction,
        WindowTransaction, WindowingService,
    },
    transition::{
        AttachedTask, BoundsChangeKind, ExitKind, PipState, TransitionChange, TransitionExtras,
        TransitionRequests,
    },
};

/// Stacking layer for the cross-fade screenshot: above the overlay content.
const SCREENSHOT_LAYER: i32 = i32::MAX;

/// Matrix drawing a surface laid out at `start` size into `to`, rotated by
/// `degrees` about the centre of `to`.
pub fn user_resize_matrix(start: Rect, to: Rect, degrees: f32) -> Affine {
    let scale = if start.width() > 0 {
        to.width() as f32 / start.width() as f32
    } else {
        1.0
    };
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = to.center_x() as f32;
    let cy = to.center_y() as f32;
    let (dx, dy) = (to.left as f32 - cx, to.top as f32 - cy);
    Affine {
        scale_x: scale * cos,
        skew_x: -scale * sin,
        skew_y: scale * sin,
        scale_y: scale * cos,
        trans_x: cos * dx - sin * dy + cx,
        trans_y: sin * dx + cos * dy + cy,
    }
}

/// Applies user-resize feedback directly to the overlay surface.
#[derive(Clone)]
pub struct SurfaceTransformer {
    /// Where transforms are committed.
    surface: Arc<dyn SurfaceService>,
}

impl SurfaceTransformer {
    /// Transformer committing to `surface`.
    pub fn new(surface: Arc<dyn SurfaceService>) -> Self {
        Self { surface }
    }

    /// Show the surface, laid out at `start`, as `to` rotated by `degrees`.
    pub fn apply_user_resize(&self, leash: LeashId, start: Rect, to: Rect, degrees: f32) {
        let mut txn = SurfaceTransaction::new();
        txn.push(SurfaceOp::SetMatrix {
            leash,
            matrix: user_resize_matrix(start, to, degrees),
        });
        self.surface.apply(txn);
    }

    /// Drop any live transform, leaving the surface at `bounds`.
    pub fn reset(&self, leash: LeashId, bounds: Rect) {
        self.apply_user_resize(leash, bounds, bounds, 0.0);
    }
}

/// Screenshot layer fading out over the freshly resized content.
#[derive(Clone, Copy, Debug)]
struct CrossFade {
    /// The screenshot layer.
    surface: SurfaceId,
    /// When the fade began.
    started: Instant,
    /// Time to fully transparent.
    duration: Duration,
}

/// A transition the scheduler is waiting on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PendingKind {
    /// An animated resize.
    Resize {
        /// Bounds before the resize.
        from: Rect,
        /// Target bounds.
        bounds: Rect,
        /// Why the bounds changed.
        kind: BoundsChangeKind,
    },
    /// An exit animation.
    Exit(ExitKind),
}

/// The one transition in flight.
#[derive(Clone, Copy, Debug)]
struct Pending {
    /// Token the windowing service handed out.
    token: TransitionToken,
    /// What completes when the token comes back.
    kind: PendingKind,
}

/// Windowing transaction builder and submitter.
pub struct Scheduler {
    /// Windowing and transition service.
    windowing: Arc<dyn WindowingService>,
    /// Screenshots and fades.
    surface: Arc<dyn SurfaceService>,
    /// Decides whether an expand lands in split screen.
    split: Option<Arc<dyn SplitScreen>>,
    /// Live transform of the overlay leash.
    transformer: SurfaceTransformer,
    /// Length of the screenshot fade.
    crossfade_duration: Duration,
    /// Tracked from each dispatched transition.
    task: Option<AttachedTask>,
    /// At most one transition in flight.
    pending: Option<Pending>,
    /// Running screenshot fade, if any.
    fade: Option<CrossFade>,
}

impl Scheduler {
    /// Scheduler with nothing attached and nothing in flight.
    pub fn new(
        windowing: Arc<dyn WindowingService>,
        surface: Arc<dyn SurfaceService>,
        split: Option<Arc<dyn SplitScreen>>,
        crossfade_duration: Duration,
    ) -> Self {
        Self {
            windowing,
            transformer: SurfaceTransformer::new(surface.clone()),
            surface,
            split,
            crossfade_duration,
            task: None,
            pending: None,
            fade: None,
        }
    }

    /// React to a dispatched transition.
    ///
    /// Tracks the attached task, runs bounds changes not produced by a
    /// gesture, and cancels in-flight work on exit.
    pub fn on_transition(
        &mut self,
        change: &TransitionChange,
        bounds: &BoundsState,
        requests: &mut TransitionRequests,
    ) {
        self.task = change.attached.clone();
        match change.to {
            PipState::ScheduledBoundsChange => {
                let scheduled = change
                    .scheduled_bounds(BoundsChangeKind::DisplayChange)
                    .map(|b| (b, BoundsChangeKind::DisplayChange))
                    .or_else(|| {
                        change
                            .scheduled_bounds(BoundsChangeKind::Programmatic)
                            .map(|b| (b, BoundsChangeKind::Programmatic))
                    });
                if let Some(((to, duration), kind)) = scheduled {
                    if self
                        .schedule_animate_resize(bounds, to, false, duration, kind)
                        .is_some()
                    {
                        requests.push(PipState::ChangingBounds, change.extras.clone());
                    } else {
                        requests.push(change.from, TransitionExtras::None);
                    }
                }
            }
            PipState::ExitedPip => {
                self.pending = None;
                self.cancel_fade();
            }
            _ => {}
        }
    }

    /// Attached task, tracing `op` when there is none.
    fn attached(&self, op: &'static str) -> Option<&AttachedTask> {
        if self.task.is_none() {
            trace!(op, "no_task_attached");
        }
        self.task.as_ref()
    }

    /// Commit entry bounds for a task that is not attached yet.
    pub fn submit_entry_bounds(&self, task: TaskId, bounds: Rect) {
        let mut txn = WindowTransaction::new();
        txn.set_bounds(task, bounds);
        debug!(%task, %bounds, "submit_entry_bounds");
        self.windowing.submit(&txn);
    }

    /// Animate the task to `to` over `duration`.
    ///
    /// With `defer_config`, configuration reaches the app only when the
    /// transition ends, and a request equal to the committed bounds is grown
    /// by one pixel at the bottom so the transition still sees a delta.
    pub fn schedule_animate_resize(
        &mut self,
        state: &BoundsState,
        to: Rect,
        defer_config: bool,
        duration: Duration,
        kind: BoundsChangeKind,
    ) -> Option<TransitionToken> {
        let task = self.attached("schedule_animate_resize")?.task.id;
        if let Some(p) = self.pending {
            debug!(token = %p.token, "resize_already_pending");
            return None;
        }
        let mut bounds = to;
        if defer_config && bounds == state.bounds() {
            bounds.bottom += 1;
        }
        let mut txn = WindowTransaction::new();
        txn.set_bounds(task, bounds);
        if defer_config {
            txn.defer_config_to_transition_end(task);
        }
        let token = self.windowing.start_resize_transition(&txn, duration);
        debug!(%token, %bounds, ?duration, ?kind, "schedule_animate_resize");
        self.pending = Some(Pending {
            token,
            kind: PendingKind::Resize {
                from: state.bounds(),
                bounds,
                kind,
            },
        });
        Some(token)
    }

    /// Live feedback: transform the surface without a windowing transaction.
    pub fn schedule_user_resize(&self, start: Rect, to: Rect, degrees: f32) {
        if let Some(task) = self.attached("schedule_user_resize") {
            self.transformer
                .apply_user_resize(task.leash, start, to, degrees);
        }
    }

    /// Settle the surface after a resize landed at `to`.
    ///
    /// When the size changed and the app cannot redraw seamlessly, a
    /// screenshot of the old content is faded out over the new content.
    pub fn schedule_finish_resize(&mut self, from: Rect, to: Rect, now: Instant) {
        let Some(task) = self.attached("schedule_finish_resize").cloned() else {
            return;
        };
        self.transformer.reset(task.leash, to);
        if from.size() == to.size() || task.task.seamless_resize {
            return;
        }
        self.cancel_fade();
        let crop = Rect::from_origin_size(Point::new(0, 0), from.size());
        let Some(surface) = self
            .surface
            .take_screenshot(task.leash, crop, SCREENSHOT_LAYER)
        else {
            debug!(leash = %task.leash, "screenshot_unavailable");
            return;
        };
        let mut txn = SurfaceTransaction::new();
        txn.push(SurfaceOp::SetPosition {
            surface,
            x: to.left as f32,
            y: to.top as f32,
        })
        .push(SurfaceOp::SetAlpha {
            surface,
            alpha: 1.0,
        });
        self.surface.apply(txn);
        debug!(%surface, duration = ?self.crossfade_duration, "crossfade_started");
        self.fade = Some(CrossFade {
            surface,
            started: now,
            duration: self.crossfade_duration,
        });
    }

    /// True while a screenshot fade runs.
    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Step the cross-fade to `now`. Returns true while it is still running.
    pub fn advance_fade(&mut self, now: Instant) -> bool {
        let Some(fade) = self.fade else {
            return false;
        };
        let elapsed = now.saturating_duration_since(fade.started);
        let mut txn = SurfaceTransaction::new();
        if fade.duration.is_zero() || elapsed >= fade.duration {
            txn.push(SurfaceOp::SetAlpha {
                surface: fade.surface,
                alpha: 0.0,
            })
            .push(SurfaceOp::Remove {
                surface: fade.surface,
            });
            self.surface.apply(txn);
            self.fade = None;
            trace!(surface = %fade.surface, "crossfade_finished");
            return false;
        }
        let t = elapsed.as_secs_f32() / fade.duration.as_secs_f32();
        txn.push(SurfaceOp::SetAlpha {
            surface: fade.surface,
            alpha: 1.0 - t,
        });
        self.surface.apply(txn);
        true
    }

    /// Remove the fade layer at once.
    fn cancel_fade(&mut self) {
        if let Some(fade) = self.fade.take() {
            let mut txn = SurfaceTransaction::new();
            txn.push(SurfaceOp::Remove {
                surface: fade.surface,
            });
            self.surface.apply(txn);
        }
    }

    /// Whether expanding now would land in split screen.
    pub fn exits_to_split(&self) -> bool {
        let (Some(task), Some(split)) = (&self.task, &self.split) else {
            return false;
        };
        split.is_task_in_split_screen(task.task.host_task.unwrap_or(task.task.id))
    }

    /// Leave the overlay by expanding the task, into split screen if its host
    /// task was part of a split layout.
    pub fn schedule_exit_via_expand(
        &mut self,
        state: &BoundsState,
        display: &DisplayLayout,
    ) -> Option<TransitionToken> {
        let task = self.attached("schedule_exit_via_expand")?.task.clone();
        let to_split = self.exits_to_split();
        let mut txn = WindowTransaction::new();
        match (&self.split, to_split) {
            (Some(split), true) => {
                let position = split_position(state.bounds(), display);
                split.prepare_enter_split_screen(&mut txn, &task, position);
            }
            _ => {
                txn.set_fullscreen(task.id);
            }
        }
        self.cancel_fade();
        let token = self.windowing.start_expand_transition(&txn, to_split);
        debug!(%token, to_split, "schedule_exit_via_expand");
        self.pending = Some(Pending {
            token,
            kind: PendingKind::Exit(ExitKind::Expand { to_split }),
        });
        Some(token)
    }

    /// Dismiss the overlay.
    pub fn schedule_remove(&mut self, with_fade: bool) -> Option<TransitionToken> {
        self.attached("schedule_remove")?;
        self.cancel_fade();
        let token = self.windowing.start_remove_transition(with_fade);
        debug!(%token, with_fade, "schedule_remove");
        self.pending = Some(Pending {
            token,
            kind: PendingKind::Exit(ExitKind::Remove),
        });
        Some(token)
    }

    /// True while a resize animation is in flight.
    pub fn has_pending_resize(&self) -> bool {
        matches!(
            self.pending,
            Some(Pending {
                kind: PendingKind::Resize { .. },
                ..
            })
        )
    }

    /// Claim the pending transition that `token` completed. Unknown or stale
    /// tokens yield `None`.
    ///
    /// The windowing service is not told yet: the caller settles the surface
    /// (including any cross-fade screenshot of the old content) first and
    /// then calls [`Self::acknowledge`].
    pub fn complete(&mut self, token: TransitionToken) -> Option<PendingKind> {
        match self.pending {
            Some(p) if p.token == token => {
                self.pending = None;
                Some(p.kind)
            }
            _ => {
                debug!(%token, "stale_transition_finished");
                None
            }
        }
    }

    /// Hand a completed transition back to the windowing service.
    pub fn acknowledge(&self, token: TransitionToken) {
        trace!(%token, "transition_acknowledged");
        self.windowing.finish_transition(token);
    }

    /// Append a human-readable description to `out`.
    pub fn dump(&self, out: &mut String, prefix: &str) {
        let _ = writeln!(out, "{prefix}Scheduler");
        match &self.task {
            Some(t) => {
                let _ = writeln!(out, "{prefix}  task={} leash={}", t.task.id, t.leash);
            }
            None => {
                let _ = writeln!(out, "{prefix}  task=none");
            }
        }
        if let Some(p) = self.pending {
            let _ = writeln!(out, "{prefix}  pending={} {:?}", p.token, p.kind);
        }
        if let Some(f) = self.fade {
            let _ = writeln!(out, "{prefix}  crossfade={}", f.surface);
        }
    }
}

/// Split side nearest the overlay.
fn split_position(bounds: Rect, display: &DisplayLayout) -> SplitPosition {
    let d = display.bounds;
    let top_left = if d.width() > d.height() {
        bounds.center_x() < d.center_x()
    } else {
        bounds.center_y() < d.center_y()
    };
    if top_left {
        SplitPosition::TopOrLeft
    } else {
        SplitPosition::BottomOrRight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::approx_eq;

    #[test]
    fn unrotated_matrix_maps_start_onto_target() {
        let start = Rect::new(100, 100, 300, 300);
        let to = Rect::new(50, 50, 350, 350);
        let m = user_resize_matrix(start, to, 0.0);
        assert_eq!(m.map(0.0, 0.0), (50.0, 50.0));
        assert_eq!(m.map(200.0, 200.0), (350.0, 350.0));
    }

    #[test]
    fn rotation_pivots_on_target_centre() {
        let r = Rect::new(0, 0, 100, 100);
        let m = user_resize_matrix(r, r, 90.0);
        let (cx, cy) = m.map(50.0, 50.0);
        assert!(approx_eq(cx, 50.0, 1e-3) && approx_eq(cy, 50.0, 1e-3));
        let (x, y) = m.map(0.0, 0.0);
        assert!(approx_eq(x, 100.0, 1e-3) && approx_eq(y, 0.0, 1e-3), "({x}, {y})");
    }

    #[test]
    fn split_side_follows_display_orientation() {
        let portrait = DisplayLayout::default();
        assert_eq!(
            split_position(Rect::new(800, 100, 1000, 300), &portrait),
            SplitPosition::TopOrLeft
        );
        let landscape = portrait.rotate_to(crate::display::Rotation::R90);
        assert_eq!(
            split_position(Rect::new(2000, 100, 2200, 300), &landscape),
            SplitPosition::BottomOrRight
        );
    }
}
