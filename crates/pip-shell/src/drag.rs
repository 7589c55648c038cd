//! Single-pointer corner-drag resizing.

use std::ops::BitOr;

use tracing::{debug, trace};

use crate::{
    aspect::AspectRatio,
    bounds::PipSnapshot,
    geom::{PointF, Rect, Size},
    input::{Action, GestureOutcome, MotionEvent},
};

/// Set of edges moved by a drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CtrlType(u8);

impl CtrlType {
    /// No edges.
    pub const NONE: Self = Self(0);
    /// Left edge.
    pub const LEFT: Self = Self(1);
    /// Right edge.
    pub const RIGHT: Self = Self(1 << 1);
    /// Top edge.
    pub const TOP: Self = Self(1 << 2);
    /// Bottom edge.
    pub const BOTTOM: Self = Self(1 << 3);

    /// True when every edge in `other` is set, and `other` is not empty.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// True when no edge is set.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for CtrlType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Corner squares of edge `corner_size` centred on each corner of `bounds`,
/// ordered top-left, top-right, bottom-right, bottom-left.
pub fn corner_regions(bounds: Rect, corner_size: i32) -> [Rect; 4] {
    [
        Rect::square_at(bounds.left, bounds.top, corner_size),
        Rect::square_at(bounds.right, bounds.top, corner_size),
        Rect::square_at(bounds.right, bounds.bottom, corner_size),
        Rect::square_at(bounds.left, bounds.bottom, corner_size),
    ]
}

/// Resize `start` by the pointer delta on the edges in `ctrl`, clamping the
/// size to `[min, max]`. Fixed edges stay where they are.
pub fn resize_drag(
    point: PointF,
    down: PointF,
    start: Rect,
    ctrl: CtrlType,
    min: Size,
    max: Size,
) -> Rect {
    let dx = (point.x - down.x) as i32;
    let dy = (point.y - down.y) as i32;
    let mut r = start;
    if ctrl.contains(CtrlType::LEFT) {
        r.left = (start.left + dx)
            .min(start.right - min.width)
            .max(start.right - max.width);
    } else if ctrl.contains(CtrlType::RIGHT) {
        r.right = (start.right + dx)
            .max(start.left + min.width)
            .min(start.left + max.width);
    }
    if ctrl.contains(CtrlType::TOP) {
        r.top = (start.top + dy)
            .min(start.bottom - min.height)
            .max(start.bottom - max.height);
    } else if ctrl.contains(CtrlType::BOTTOM) {
        r.bottom = (start.bottom + dy)
            .max(start.top + min.height)
            .min(start.top + max.height);
    }
    r
}

/// Project a freeform drag result onto `aspect`, keeping the corner opposite
/// the dragged one fixed. `from` is the size the drag started at and decides
/// whether the projection grows or shrinks.
pub fn project_to_aspect(
    rect: Rect,
    from: Size,
    ctrl: CtrlType,
    aspect: AspectRatio,
    min: Size,
    max: Size,
) -> Rect {
    let size = aspect.project_from(from, rect.size(), min, max);
    let (left, right) = if ctrl.contains(CtrlType::LEFT) {
        (rect.right - size.width, rect.right)
    } else {
        (rect.left, rect.left + size.width)
    };
    let (top, bottom) = if ctrl.contains(CtrlType::TOP) {
        (rect.bottom - size.height, rect.bottom)
    } else {
        (rect.top, rect.top + size.height)
    };
    Rect::new(left, top, right, bottom)
}

/// A drag from press to release.
#[derive(Clone, Copy, Debug)]
struct DragSession {
    /// Where the drag anchors; moves to the first point past the slop.
    down_point: PointF,
    /// Bounds when the pointer went down.
    down_bounds: Rect,
    /// Edges the drag moves.
    ctrl: CtrlType,
    /// The pointer has moved past the touch slop.
    threshold_crossed: bool,
}

/// Corner-drag gesture state machine. Pure geometry: side effects are
/// returned as [`GestureOutcome`]s.
#[derive(Debug)]
pub struct DragResizeHandler {
    /// Edge of the corner hit squares.
    corner_size: i32,
    /// Travel before the drag takes over.
    touch_slop: f32,
    /// Set from press until the next press.
    session: Option<DragSession>,
    /// The current drag may resize.
    allow_gesture: bool,
    /// Bounds of the latest preview.
    last_resize_bounds: Option<Rect>,
}

impl DragResizeHandler {
    /// Handler with no drag in progress.
    pub fn new(corner_size: i32, touch_slop: f32) -> Self {
        Self {
            corner_size,
            touch_slop,
            session: None,
            allow_gesture: false,
            last_resize_bounds: None,
        }
    }

    /// True iff `(x, y)` falls in one of the four corner squares of `bounds`.
    pub fn is_within_drag_region(&self, bounds: Rect, x: f32, y: f32) -> bool {
        corner_regions(bounds, self.corner_size)
            .iter()
            .any(|r| r.contains_f(PointF::new(x, y)))
    }

    /// Edges enabled for a drag starting at `(x, y)`.
    ///
    /// A corner's edge pair is only enabled if neither edge already sits on
    /// the display boundary implied by the movement bounds.
    pub fn ctrl_type(&self, snap: &PipSnapshot, x: f32, y: f32) -> CtrlType {
        let b = snap.bounds;
        let mb = snap.movement_bounds(b);
        let display = Rect::new(mb.left, mb.top, mb.right + b.width(), mb.bottom + b.height());
        let [tl, tr, br, bl] = corner_regions(b, self.corner_size);
        let p = PointF::new(x, y);
        let mut ctrl = CtrlType::NONE;
        if tl.contains_f(p) && b.top != display.top && b.left != display.left {
            ctrl = ctrl | CtrlType::LEFT | CtrlType::TOP;
        }
        if tr.contains_f(p) && b.top != display.top && b.right != display.right {
            ctrl = ctrl | CtrlType::RIGHT | CtrlType::TOP;
        }
        if br.contains_f(p) && b.bottom != display.bottom && b.right != display.right {
            ctrl = ctrl | CtrlType::RIGHT | CtrlType::BOTTOM;
        }
        if bl.contains_f(p) && b.bottom != display.bottom && b.left != display.left {
            ctrl = ctrl | CtrlType::LEFT | CtrlType::BOTTOM;
        }
        ctrl
    }

    /// True while the current drag may resize.
    pub fn is_allowed(&self) -> bool {
        self.allow_gesture
    }

    /// Edges moved by the current drag.
    pub fn ctrl(&self) -> CtrlType {
        self.session.map(|s| s.ctrl).unwrap_or_default()
    }

    /// Bounds of the latest preview, committed when the drag finishes.
    pub fn last_resize_bounds(&self) -> Option<Rect> {
        self.last_resize_bounds
    }

    /// Advance the drag with `ev`.
    pub fn on_event(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        match ev.action {
            Action::Down => self.on_down(ev, snap),
            Action::Move => self.on_move(ev, snap),
            Action::PointerDown => {
                if !self.allow_gesture {
                    return GestureOutcome::Ignored;
                }
                debug!("drag_rejected_second_pointer");
                self.allow_gesture = false;
                self.last_resize_bounds = None;
                GestureOutcome::Rejected
            }
            Action::PointerUp => GestureOutcome::Ignored,
            Action::Up | Action::Cancel => {
                if self.session.is_some() {
                    GestureOutcome::Finished
                } else {
                    GestureOutcome::Ignored
                }
            }
        }
    }

    /// Arm a drag if the press landed in a corner square.
    fn on_down(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        let Some(p) = ev.point(0) else {
            return GestureOutcome::Ignored;
        };
        self.reset();
        if !self.is_within_drag_region(snap.bounds, p.x, p.y) {
            return GestureOutcome::Ignored;
        }
        let ctrl = self.ctrl_type(snap, p.x, p.y);
        self.session = Some(DragSession {
            down_point: p,
            down_bounds: snap.bounds,
            ctrl,
            threshold_crossed: false,
        });
        self.allow_gesture = !ctrl.is_none();
        trace!(?ctrl, x = p.x, y = p.y, "drag_armed");
        GestureOutcome::Tracking
    }

    /// Resize once the pointer has moved past the touch slop.
    fn on_move(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        if !self.allow_gesture {
            return GestureOutcome::Ignored;
        }
        let (Some(session), Some(p)) = (self.session.as_mut(), ev.point(0)) else {
            return GestureOutcome::Ignored;
        };
        let mut pilfer = false;
        if !session.threshold_crossed && p.distance_to(session.down_point) > self.touch_slop {
            session.threshold_crossed = true;
            // Resizing starts from the point where the slop was crossed.
            session.down_point = p;
            pilfer = true;
        }
        if !session.threshold_crossed {
            return GestureOutcome::Tracking;
        }
        let freeform = resize_drag(
            p,
            session.down_point,
            session.down_bounds,
            session.ctrl,
            snap.min_size,
            snap.max_size,
        );
        let bounds = project_to_aspect(
            freeform,
            session.down_bounds.size(),
            session.ctrl,
            snap.aspect_ratio,
            snap.min_size,
            snap.max_size,
        );
        self.last_resize_bounds = Some(bounds);
        GestureOutcome::Preview {
            bounds,
            angle: 0.0,
            pilfer,
        }
    }

    /// Drop all gesture state.
    pub fn reset(&mut self) {
        self.session = None;
        self.allow_gesture = false;
        self.last_resize_bounds = None;
    }
}
