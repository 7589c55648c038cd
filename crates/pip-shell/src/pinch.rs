//! Two-pointer pinch resizing.
//!
//! The pinch is modelled as a similarity transform: uniform scale about the
//! centroid of the two down points, then translation to the current centroid.
//! Rotation is reported separately as a damped angle for live feedback only;
//! committed bounds are always axis-aligned.

use tracing::{debug, trace};

use crate::{
    bounds::PipSnapshot,
    geom::{PointF, Rect, Size},
    input::{Action, GestureOutcome, MotionEvent},
};

/// Fraction of the raw rotation passed through to the surface.
const ROTATION_DAMPING: f32 = 0.4;
/// Damped rotation below this many degrees is ignored.
const ROTATION_DEAD_ZONE: f32 = 5.0;
/// Largest rotation shown, in degrees.
const MAX_ROTATION: f32 = 45.0;

/// Bounds and angle (degrees) for a pinch from `down` to `current`, applied
/// to `initial` with the size kept in `[min, max]`.
pub fn calculate_bounds_and_angle(
    down: [PointF; 2],
    current: [PointF; 2],
    min: Size,
    max: Size,
    initial: Rect,
) -> (Rect, f32) {
    let down_dist = down[0].distance_to(down[1]);
    let dist = current[0].distance_to(current[1]);
    let (w, h) = (initial.width() as f32, initial.height() as f32);
    let min_scale = (min.width as f32 / w).max(min.height as f32 / h);
    let max_scale = (max.width as f32 / w).min(max.height as f32 / h);
    let raw = if down_dist > 0.0 { dist / down_dist } else { 1.0 };
    let scale = raw.min(max_scale).max(min_scale);

    let c = down[0].midpoint(down[1]);
    let c2 = current[0].midpoint(current[1]);
    let bounds = if scale == 1.0 && c == c2 {
        initial
    } else {
        let width = (w * scale).round() as i32;
        let height = (h * scale).round() as i32;
        let left = (c2.x + scale * (initial.left as f32 - c.x)).round() as i32;
        let top = (c2.y + scale * (initial.top as f32 - c.y)).round() as i32;
        Rect::new(left, top, left + width, top + height)
    };

    let dv = (down[1].x - down[0].x, down[1].y - down[0].y);
    let cv = (current[1].x - current[0].x, current[1].y - current[0].y);
    let cross = dv.0 * cv.1 - dv.1 * cv.0;
    let dot = dv.0 * cv.0 + dv.1 * cv.1;
    let angle = constrain_rotation(cross.atan2(dot).to_degrees());
    (bounds, angle)
}

/// Damp, dead-zone and clamp a raw rotation in degrees.
fn constrain_rotation(degrees: f32) -> f32 {
    let damped = (degrees * ROTATION_DAMPING).abs() - ROTATION_DEAD_ZONE;
    if damped <= 0.0 {
        return 0.0;
    }
    degrees.signum() * damped.min(MAX_ROTATION)
}

/// Elastic release: snap to `max` when either edge reaches `auto_max_ratio`
/// of it, then to `min` when either edge is below it. Both keep the centre.
pub fn elastic_snap(rect: Rect, min: Size, max: Size, auto_max_ratio: f32) -> Rect {
    let mut out = rect;
    if rect.width() as f32 >= auto_max_ratio * max.width as f32
        || rect.height() as f32 >= auto_max_ratio * max.height as f32
    {
        out = out.resize_about_center(max);
    }
    if out.width() < min.width || out.height() < min.height {
        out = out.resize_about_center(min);
    }
    out
}

/// Two fingers from the second press to the first release.
#[derive(Clone, Copy, Debug)]
struct PinchSession {
    /// Pointer ids of the two fingers.
    ids: [u32; 2],
    /// Finger positions when the second went down.
    down: [PointF; 2],
    /// Bounds when the second finger went down.
    down_bounds: Rect,
}

/// Pinch gesture state machine. Pure geometry.
#[derive(Debug, Default)]
pub struct PinchResizeHandler {
    /// Set from the second press until release.
    session: Option<PinchSession>,
    /// The current pinch may resize.
    allow_gesture: bool,
    /// Bounds of the latest preview.
    last_resize_bounds: Option<Rect>,
    /// Rotation of the latest preview, in degrees.
    angle: f32,
}

impl PinchResizeHandler {
    /// Handler with no pinch in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the current pinch may resize.
    pub fn is_allowed(&self) -> bool {
        self.allow_gesture
    }

    /// Bounds of the latest preview; `None` until the fingers move.
    pub fn last_resize_bounds(&self) -> Option<Rect> {
        self.last_resize_bounds
    }

    /// Rotation, in degrees, of the last preview.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Advance the pinch with `ev`.
    pub fn on_event(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        match ev.action {
            Action::Up | Action::Cancel | Action::PointerUp => {
                if self.session.is_some() {
                    GestureOutcome::Finished
                } else {
                    GestureOutcome::Ignored
                }
            }
            Action::PointerDown => self.on_pointer_down(ev, snap),
            Action::Move => self.on_move(ev, snap),
            Action::Down => GestureOutcome::Ignored,
        }
    }

    /// Arm a pinch when exactly two fingers land inside the bounds.
    fn on_pointer_down(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        if ev.pointer_count() > 2 {
            if self.session.is_some() {
                debug!(pointers = ev.pointer_count(), "pinch_rejected_extra_pointer");
                self.allow_gesture = false;
                self.last_resize_bounds = None;
                return GestureOutcome::Rejected;
            }
            return GestureOutcome::Ignored;
        }
        if self.session.is_some() || ev.pointer_count() != 2 {
            return GestureOutcome::Ignored;
        }
        let (Some(a), Some(b)) = (ev.pointers.first(), ev.pointers.get(1)) else {
            return GestureOutcome::Ignored;
        };
        if !(snap.bounds.contains_f(a.pos) && snap.bounds.contains_f(b.pos)) {
            trace!("pinch_outside_bounds");
            return GestureOutcome::Ignored;
        }
        self.session = Some(PinchSession {
            ids: [a.id, b.id],
            down: [a.pos, b.pos],
            down_bounds: snap.bounds,
        });
        self.allow_gesture = true;
        // Stays empty until the fingers move, so a still pinch commits nothing.
        self.last_resize_bounds = None;
        self.angle = 0.0;
        trace!(bounds = %snap.bounds, "pinch_armed");
        GestureOutcome::Tracking
    }

    /// Scale and rotate about the finger midpoint.
    fn on_move(&mut self, ev: &MotionEvent, snap: &PipSnapshot) -> GestureOutcome {
        if !self.allow_gesture {
            return GestureOutcome::Ignored;
        }
        let Some(session) = self.session else {
            return GestureOutcome::Ignored;
        };
        if ev.pointer_count() != 2 {
            return GestureOutcome::Tracking;
        }
        let (Some(p0), Some(p1)) = (ev.point_by_id(session.ids[0]), ev.point_by_id(session.ids[1]))
        else {
            return GestureOutcome::Tracking;
        };
        let (bounds, angle) = calculate_bounds_and_angle(
            session.down,
            [p0, p1],
            snap.min_size,
            snap.max_size,
            session.down_bounds,
        );
        self.last_resize_bounds = Some(bounds);
        self.angle = angle;
        GestureOutcome::Preview {
            bounds,
            angle,
            pilfer: false,
        }
    }

    /// Forget the current pinch.
    pub fn reset(&mut self) {
        self.session = None;
        self.allow_gesture = false;
        self.last_resize_bounds = None;
        self.angle = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::aspect::AspectRatio;

    const MIN: Size = Size::new(100, 100);
    const MAX: Size = Size::new(500, 500);

    fn p(x: f32, y: f32) -> PointF {
        PointF::new(x, y)
    }

    fn snapshot(bounds: Rect) -> PipSnapshot {
        PipSnapshot {
            bounds,
            min_size: MIN,
            max_size: MAX,
            aspect_ratio: AspectRatio::SQUARE,
            in_pip: true,
            ..PipSnapshot::default()
        }
    }

    #[test]
    fn outward_pinch_scales_about_centroid() {
        let (r, angle) = calculate_bounds_and_angle(
            [p(100.0, 100.0), p(300.0, 300.0)],
            [p(50.0, 50.0), p(350.0, 350.0)],
            MIN,
            MAX,
            Rect::new(100, 100, 300, 300),
        );
        assert_eq!(r, Rect::new(50, 50, 350, 350));
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn scale_is_clamped_to_limits() {
        let initial = Rect::new(100, 100, 300, 300);
        let (r, _) = calculate_bounds_and_angle(
            [p(150.0, 200.0), p(250.0, 200.0)],
            [p(0.0, 200.0), p(1000.0, 200.0)],
            MIN,
            MAX,
            initial,
        );
        assert_eq!(r.size(), MAX);
        let (r, _) = calculate_bounds_and_angle(
            [p(100.0, 200.0), p(300.0, 200.0)],
            [p(195.0, 200.0), p(205.0, 200.0)],
            MIN,
            MAX,
            initial,
        );
        assert_eq!(r.size(), MIN);
    }

    #[test]
    fn translation_follows_centroid() {
        let (r, _) = calculate_bounds_and_angle(
            [p(150.0, 150.0), p(250.0, 250.0)],
            [p(170.0, 140.0), p(270.0, 240.0)],
            MIN,
            MAX,
            Rect::new(100, 100, 300, 300),
        );
        assert_eq!(r, Rect::new(120, 90, 320, 290));
    }

    #[test]
    fn rotation_is_damped_and_clamped() {
        assert_eq!(constrain_rotation(10.0), 0.0);
        assert!((constrain_rotation(30.0) - 7.0).abs() < 1e-4);
        assert!((constrain_rotation(-30.0) + 7.0).abs() < 1e-4);
        assert_eq!(constrain_rotation(179.0), MAX_ROTATION);
    }

    #[test]
    fn quarter_turn_reports_constrained_angle() {
        let (_, angle) = calculate_bounds_and_angle(
            [p(100.0, 200.0), p(300.0, 200.0)],
            [p(200.0, 100.0), p(200.0, 300.0)],
            MIN,
            MAX,
            Rect::new(100, 100, 300, 300),
        );
        assert!((angle - 31.0).abs() < 1e-3, "{angle}");
    }

    #[test]
    fn elastic_snap_reaches_extremes() {
        let near_max = Rect::new(0, 0, 460, 460);
        assert_eq!(elastic_snap(near_max, MIN, MAX, 0.9).size(), MAX);
        assert_eq!(elastic_snap(near_max, MIN, MAX, 0.9).center_x(), near_max.center_x());
        let tiny = Rect::new(100, 100, 180, 260);
        assert_eq!(elastic_snap(tiny, MIN, MAX, 0.9).size(), MIN);
        let mid = Rect::new(0, 0, 300, 300);
        assert_eq!(elastic_snap(mid, MIN, MAX, 0.9), mid);
    }

    #[test]
    fn pinch_starting_outside_bounds_is_rejected() {
        let mut h = PinchResizeHandler::new();
        let snap = snapshot(Rect::new(100, 100, 300, 300));
        let ev = MotionEvent::pointer_down(&[(150.0, 150.0), (400.0, 400.0)]);
        assert_eq!(h.on_event(&ev, &snap), GestureOutcome::Ignored);
        assert!(!h.is_allowed());
    }

    #[test]
    fn third_pointer_disables_pinch() {
        let mut h = PinchResizeHandler::new();
        let snap = snapshot(Rect::new(100, 100, 300, 300));
        h.on_event(&MotionEvent::pointer_down(&[(150.0, 150.0), (250.0, 250.0)]), &snap);
        assert!(h.is_allowed());
        let third = MotionEvent::pointer_down(&[(150.0, 150.0), (250.0, 250.0), (200.0, 120.0)]);
        assert_eq!(h.on_event(&third, &snap), GestureOutcome::Rejected);
        assert!(!h.is_allowed());
        assert_eq!(h.last_resize_bounds(), None);
    }

    #[test]
    fn pinch_preview_then_finish() {
        let mut h = PinchResizeHandler::new();
        let snap = snapshot(Rect::new(100, 100, 300, 300));
        h.on_event(&MotionEvent::pointer_down(&[(150.0, 150.0), (250.0, 250.0)]), &snap);
        assert_eq!(h.last_resize_bounds(), None);
        let out = h.on_event(&MotionEvent::move_to(&[(125.0, 125.0), (275.0, 275.0)]), &snap);
        assert_eq!(
            out,
            GestureOutcome::Preview {
                bounds: Rect::new(50, 50, 350, 350),
                angle: 0.0,
                pilfer: false
            }
        );
        assert_eq!(
            h.on_event(&MotionEvent::up(275.0, 275.0), &snap),
            GestureOutcome::Finished
        );
    }

    proptest! {
        #[test]
        fn stationary_pinch_is_identity(
            x0 in 0f32..1000.0, y0 in 0f32..1000.0,
            x1 in 0f32..1000.0, y1 in 0f32..1000.0,
            left in 0i32..500, top in 0i32..500,
            w in 100i32..500, h in 100i32..500,
        ) {
            let initial = Rect::new(left, top, left + w, top + h);
            let pts = [p(x0, y0), p(x1, y1)];
            let (r, angle) = calculate_bounds_and_angle(pts, pts, MIN, MAX, initial);
            prop_assert_eq!(r, initial);
            prop_assert_eq!(angle, 0.0);
        }
    }
}
