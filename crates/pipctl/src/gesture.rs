//! Synthesized pointer scripts for the drag and pinch scenarios.

use pip_shell::{MotionEvent, PointF, Rect};

use crate::cli::Corner;

/// Pixel position of `corner` on `bounds`.
pub fn corner_point(bounds: Rect, corner: Corner) -> PointF {
    let (x, y) = match corner {
        Corner::TopLeft => (bounds.left, bounds.top),
        Corner::TopRight => (bounds.right, bounds.top),
        Corner::BottomLeft => (bounds.left, bounds.bottom),
        Corner::BottomRight => (bounds.right, bounds.bottom),
    };
    PointF::new(x as f32, y as f32)
}

/// Press on `corner`, travel `(dx, dy)` in `steps` moves, release.
///
/// The first move that leaves the touch slop becomes the drag anchor, so the
/// committed resize is slightly shorter than the full travel.
pub fn drag_script(bounds: Rect, corner: Corner, dx: f32, dy: f32, steps: u32) -> Vec<MotionEvent> {
    let start = corner_point(bounds, corner);
    let steps = steps.max(1);
    let mut out = Vec::with_capacity(steps as usize + 2);
    out.push(MotionEvent::down(start.x, start.y));
    let mut last = (start.x, start.y);
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        last = (start.x + dx * t, start.y + dy * t);
        out.push(MotionEvent::move_to(&[last]));
    }
    out.push(MotionEvent::up(last.0, last.1));
    out
}

/// Two fingers on the diagonal through the centre of `bounds`, spread by
/// `scale` and turned by `rotate_deg` over `steps` moves.
pub fn pinch_script(bounds: Rect, scale: f32, rotate_deg: f32, steps: u32) -> Vec<MotionEvent> {
    let c = bounds.exact_center();
    let half = bounds.width().min(bounds.height()) as f32 / 4.0;
    let fingers = |t: f32| {
        let s = 1.0 + (scale - 1.0) * t;
        let theta = (45.0 + rotate_deg * t).to_radians();
        let (vx, vy) = (half * s * theta.cos(), half * s * theta.sin());
        [(c.x - vx, c.y - vy), (c.x + vx, c.y + vy)]
    };
    let steps = steps.max(1);
    let first = fingers(0.0);
    let mut out = Vec::with_capacity(steps as usize + 4);
    out.push(MotionEvent::down(first[0].0, first[0].1));
    out.push(MotionEvent::pointer_down(&first));
    let mut last = first;
    for i in 1..=steps {
        last = fingers(i as f32 / steps as f32);
        out.push(MotionEvent::move_to(&last));
    }
    out.push(MotionEvent::pointer_up(&last));
    out.push(MotionEvent::up(last[0].0, last[0].1));
    out
}

#[cfg(test)]
mod tests {
    use pip_shell::input::Action;

    use super::*;

    const BOUNDS: Rect = Rect::new(648, 1908, 1080, 2340);

    #[test]
    fn drag_starts_on_corner_and_ends_at_travel() {
        let script = drag_script(BOUNDS, Corner::TopLeft, -100.0, -50.0, 4);
        assert_eq!(script.len(), 6);
        assert_eq!(script[0].action, Action::Down);
        assert_eq!(script[0].point(0), Some(PointF::new(648.0, 1908.0)));
        let last = script.last().expect("release");
        assert_eq!(last.action, Action::Up);
        assert_eq!(last.point(0), Some(PointF::new(548.0, 1858.0)));
    }

    #[test]
    fn zero_steps_still_moves_once() {
        let script = drag_script(BOUNDS, Corner::BottomRight, 10.0, 10.0, 0);
        assert_eq!(script.len(), 3);
    }

    #[test]
    fn pinch_spreads_about_the_centre() {
        let script = pinch_script(BOUNDS, 2.0, 0.0, 2);
        assert_eq!(script[1].action, Action::PointerDown);
        assert_eq!(script[1].pointer_count(), 2);
        let c = BOUNDS.exact_center();
        let spread = |ev: &MotionEvent| {
            let a = ev.point(0).expect("a");
            let b = ev.point(1).expect("b");
            assert!((a.midpoint(b).x - c.x).abs() < 0.01);
            a.distance_to(b)
        };
        let start = spread(&script[1]);
        let end = spread(&script[script.len() - 2]);
        assert!((end / start - 2.0).abs() < 0.01);
        assert_eq!(script.last().expect("up").action, Action::Up);
    }
}
