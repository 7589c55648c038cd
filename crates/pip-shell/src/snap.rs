//! Movement bounds and snap-fraction math.
//!
//! A snap fraction is a scalar in `[0, 4)` encoding a position along the
//! perimeter of the movement bounds, clockwise from the top-left corner:
//! `[0, 1)` top edge, `[1, 2)` right edge, `[2, 3)` bottom edge, `[3, 4)`
//! left edge. Movement bounds are the region the overlay's top-left corner
//! may occupy.

use crate::geom::{Rect, Size};

/// Region the top-left corner of an overlay of `size` may occupy inside
/// `inset_bounds`, with `bottom_offset` reserved above the bottom edge.
pub fn movement_bounds(inset_bounds: Rect, size: Size, bottom_offset: i32) -> Rect {
    let right = (inset_bounds.right - size.width).max(inset_bounds.left);
    let bottom = (inset_bounds.bottom - size.height - bottom_offset.max(0)).max(inset_bounds.top);
    Rect::new(inset_bounds.left, inset_bounds.top, right, bottom)
}

/// Move `rect` flush against whichever movement edge is closest.
pub fn snap_rect_to_closest_edge(rect: Rect, movement: Rect) -> Rect {
    let bounded_left = rect.left.clamp(movement.left, movement.right);
    let bounded_top = rect.top.clamp(movement.top, movement.bottom);

    let from_left = (rect.left - movement.left).abs();
    let from_top = (rect.top - movement.top).abs();
    let from_right = (movement.right - rect.left).abs();
    let from_bottom = (movement.bottom - rect.top).abs();
    let shortest = from_left.min(from_right).min(from_top.min(from_bottom));

    if shortest == from_left {
        rect.offset_to(movement.left, bounded_top)
    } else if shortest == from_top {
        rect.offset_to(bounded_left, movement.top)
    } else if shortest == from_right {
        rect.offset_to(movement.right, bounded_top)
    } else {
        rect.offset_to(bounded_left, movement.bottom)
    }
}

/// Snap fraction of `rect` within `movement`, after snapping to the
/// closest edge.
pub fn snap_fraction(rect: Rect, movement: Rect) -> f32 {
    let snapped = snap_rect_to_closest_edge(rect, movement);
    let width_fraction = ratio(snapped.left - movement.left, movement.width());
    let height_fraction = ratio(snapped.top - movement.top, movement.height());
    if snapped.top == movement.top {
        width_fraction
    } else if snapped.left == movement.right {
        1.0 + height_fraction
    } else if snapped.top == movement.bottom {
        2.0 + (1.0 - width_fraction)
    } else {
        3.0 + (1.0 - height_fraction)
    }
}

/// Place `rect` at `fraction` along the movement perimeter.
///
/// Fractions outside `[0, 4)` wrap around.
pub fn apply_snap_fraction(rect: Rect, movement: Rect, fraction: f32) -> Rect {
    let f = fraction.rem_euclid(4.0);
    let along = |t: f32, len: i32| (t * len as f32).round() as i32;
    if f < 1.0 {
        rect.offset_to(movement.left + along(f, movement.width()), movement.top)
    } else if f < 2.0 {
        rect.offset_to(
            movement.right,
            movement.top + along(f - 1.0, movement.height()),
        )
    } else if f < 3.0 {
        rect.offset_to(
            movement.left + along(1.0 - (f - 2.0), movement.width()),
            movement.bottom,
        )
    } else {
        rect.offset_to(
            movement.left,
            movement.top + along(1.0 - (f - 3.0), movement.height()),
        )
    }
}

/// Offset `rect` horizontally to the nearer of the left or right movement
/// edges, keeping its top.
pub fn snap_to_horizontal_edge(rect: Rect, movement: Rect) -> Rect {
    let from_left = (rect.left - movement.left).abs();
    let from_right = (movement.right - rect.left).abs();
    if from_left <= from_right {
        rect.offset_to(movement.left, rect.top)
    } else {
        rect.offset_to(movement.right, rect.top)
    }
}

/// True when `fraction` places the overlay in the upper half of the
/// movement bounds.
pub fn is_upper_half(fraction: f32) -> bool {
    let f = fraction.rem_euclid(4.0);
    if f < 1.0 {
        true
    } else if f < 2.0 {
        f - 1.0 < 0.5
    } else if f < 3.0 {
        false
    } else {
        1.0 - (f - 3.0) < 0.5
    }
}

/// `num / den`, or zero for an empty denominator.
#[inline]
fn ratio(num: i32, den: i32) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const MOVEMENT: Rect = Rect::new(0, 0, 800, 1600);

    fn pip() -> Rect {
        Rect::new(0, 0, 200, 100)
    }

    #[test]
    fn movement_bounds_subtracts_size_and_offset() {
        let mb = movement_bounds(Rect::new(10, 20, 1010, 2020), Size::new(200, 100), 50);
        assert_eq!(mb, Rect::new(10, 20, 810, 1870));
    }

    #[test]
    fn movement_bounds_never_inverts() {
        let mb = movement_bounds(Rect::new(0, 0, 100, 100), Size::new(300, 300), 0);
        assert_eq!(mb, Rect::new(0, 0, 0, 0));
    }

    #[test]
    fn corners_map_to_integer_fractions() {
        assert_eq!(snap_fraction(pip().offset_to(0, 0), MOVEMENT), 0.0);
        assert_eq!(snap_fraction(pip().offset_to(800, 0), MOVEMENT), 1.0);
        assert_eq!(snap_fraction(pip().offset_to(800, 1600), MOVEMENT), 2.0);
        assert_eq!(snap_fraction(pip().offset_to(0, 1600), MOVEMENT), 3.0);
    }

    #[test]
    fn mid_edges() {
        assert_eq!(snap_fraction(pip().offset_to(400, 0), MOVEMENT), 0.5);
        assert_eq!(snap_fraction(pip().offset_to(800, 800), MOVEMENT), 1.5);
        assert_eq!(snap_fraction(pip().offset_to(400, 1600), MOVEMENT), 2.5);
        assert_eq!(snap_fraction(pip().offset_to(0, 800), MOVEMENT), 3.5);
    }

    #[test]
    fn interior_point_snaps_to_nearest_edge() {
        // 30px from the right edge, far from the others.
        let r = pip().offset_to(770, 700);
        assert_eq!(snap_rect_to_closest_edge(r, MOVEMENT), pip().offset_to(800, 700));
    }

    #[test]
    fn horizontal_snap_prefers_left_on_tie() {
        assert_eq!(
            snap_to_horizontal_edge(pip().offset_to(400, 77), MOVEMENT),
            pip().offset_to(0, 77)
        );
        assert_eq!(
            snap_to_horizontal_edge(pip().offset_to(401, 77), MOVEMENT),
            pip().offset_to(800, 77)
        );
    }

    #[test]
    fn apply_wraps_out_of_range_fractions() {
        assert_eq!(
            apply_snap_fraction(pip(), MOVEMENT, 4.5),
            apply_snap_fraction(pip(), MOVEMENT, 0.5)
        );
        assert_eq!(
            apply_snap_fraction(pip(), MOVEMENT, -0.5),
            apply_snap_fraction(pip(), MOVEMENT, 3.5)
        );
    }

    #[test]
    fn upper_half_classification() {
        assert!(is_upper_half(0.3));
        assert!(is_upper_half(1.2));
        assert!(!is_upper_half(1.8));
        assert!(!is_upper_half(2.5));
        assert!(!is_upper_half(3.2));
        assert!(is_upper_half(3.8));
    }

    /// Walk the perimeter clockwise from the top-left corner.
    fn perimeter_point(step: i32) -> (i32, i32) {
        let (w, h) = (MOVEMENT.width(), MOVEMENT.height());
        if step < w {
            (step, 0)
        } else if step < w + h {
            (w, step - w)
        } else if step < 2 * w + h {
            (w - (step - w - h), h)
        } else {
            (0, h - (step - 2 * w - h))
        }
    }

    #[test]
    fn fraction_increases_monotonically_and_wraps() {
        let total = 2 * (MOVEMENT.width() + MOVEMENT.height());
        let mut last = -1.0f32;
        for step in (0..total).step_by(7) {
            let (x, y) = perimeter_point(step);
            let f = snap_fraction(pip().offset_to(x, y), MOVEMENT);
            assert!(f >= last, "step {step}: {f} < {last}");
            assert!((0.0..4.0).contains(&f));
            last = f;
        }
        // Completing the loop returns to the start.
        assert_eq!(snap_fraction(pip().offset_to(0, 0), MOVEMENT), 0.0);
    }

    proptest! {
        #[test]
        fn apply_inverts_fraction_on_the_perimeter(step in 0i32..4800) {
            let (x, y) = perimeter_point(step);
            let r = pip().offset_to(x, y);
            let f = snap_fraction(r, MOVEMENT);
            prop_assert_eq!(apply_snap_fraction(r, MOVEMENT, f), r);
        }
    }
}
