//! Integer geometry in display pixel space, plus float points for raw input.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer point in display pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate, growing downwards.
    pub y: i32,
}

impl Point {
    /// Point at `(x, y)`.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Sub-pixel point as reported by the input system.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl PointF {
    /// Point at `(x, y)`.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn distance_to(self, other: Self) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Point halfway to `other`.
    #[inline]
    pub fn midpoint(self, other: Self) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }
}

/// Width/height pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: i32,
    /// Vertical extent.
    pub height: i32,
}

impl Size {
    /// Size of `width` x `height`.
    #[inline]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// The smaller of the two dimensions.
    #[inline]
    pub fn shorter(self) -> i32 {
        self.width.min(self.height)
    }

    /// Component-wise `min <= self <= max`.
    #[inline]
    pub fn within(self, min: Self, max: Self) -> bool {
        self.width >= min.width
            && self.height >= min.height
            && self.width <= max.width
            && self.height <= max.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-edge insets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Insets {
    /// Left inset.
    pub left: i32,
    /// Top inset.
    pub top: i32,
    /// Right inset.
    pub right: i32,
    /// Bottom inset.
    pub bottom: i32,
}

impl Insets {
    /// Insets in left, top, right, bottom order.
    #[inline]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Axis-aligned rectangle, `left <= right` and `top <= bottom`.
///
/// Edges are half-open for containment: a point on `right` or `bottom` is
/// outside, matching how the input system reports pixel hits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge, inclusive.
    pub left: i32,
    /// Top edge, inclusive.
    pub top: i32,
    /// Right edge, exclusive.
    pub right: i32,
    /// Bottom edge, exclusive.
    pub bottom: i32,
}

impl Rect {
    /// Rectangle from its four edges.
    #[inline]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of `size` with its top-left corner at `origin`.
    #[inline]
    pub const fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(
            origin.x,
            origin.y,
            origin.x + size.width,
            origin.y + size.height,
        )
    }

    /// `right - left`.
    #[inline]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    /// `bottom - top`.
    #[inline]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Width and height.
    #[inline]
    pub const fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// True when either dimension is zero or negative.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Integer horizontal centre, rounding down.
    #[inline]
    pub const fn center_x(&self) -> i32 {
        (self.left + self.right) >> 1
    }

    /// Integer vertical centre, rounding down.
    #[inline]
    pub const fn center_y(&self) -> i32 {
        (self.top + self.bottom) >> 1
    }

    /// Centre without rounding.
    #[inline]
    pub fn exact_center(&self) -> PointF {
        PointF::new(
            (self.left + self.right) as f32 * 0.5,
            (self.top + self.bottom) as f32 * 0.5,
        )
    }

    /// Half-open containment test.
    #[inline]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        !self.is_empty() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Containment test for a raw input point, taking the pixel it falls in.
    #[inline]
    pub fn contains_f(&self, p: PointF) -> bool {
        self.contains(p.x.floor() as i32, p.y.floor() as i32)
    }

    /// True when the two rectangles overlap by at least one pixel.
    #[inline]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Translate by `(dx, dy)`.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Same size, moved so the top-left corner is at `(left, top)`.
    #[inline]
    pub const fn offset_to(self, left: i32, top: i32) -> Self {
        Self::new(left, top, left + self.width(), top + self.height())
    }

    /// Shrink each edge inwards by `insets`.
    #[inline]
    pub const fn inset(self, insets: Insets) -> Self {
        Self::new(
            self.left + insets.left,
            self.top + insets.top,
            self.right - insets.right,
            self.bottom - insets.bottom,
        )
    }

    /// Resize to `size` keeping the integer centre fixed.
    pub fn resize_about_center(self, size: Size) -> Self {
        let cx = self.center_x();
        let cy = self.center_y();
        let left = cx - size.width / 2;
        let top = cy - size.height / 2;
        Self::new(left, top, left + size.width, top + size.height)
    }

    /// Square of edge `edge` centred on `(x, y)`.
    #[inline]
    pub const fn square_at(x: i32, y: i32, edge: i32) -> Self {
        let half = edge / 2;
        Self::new(x - half, y - half, x - half + edge, y - half + edge)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{},{})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// True when `a` and `b` differ by at most `eps`.
#[inline]
pub fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_edges_and_center() {
        let r = Rect::new(10, 20, 40, 60);
        assert_eq!(r.width(), 30);
        assert_eq!(r.height(), 40);
        assert_eq!(r.center_x(), 25);
        assert_eq!(r.center_y(), 40);
        assert_eq!(r.exact_center(), PointF::new(25.0, 40.0));
    }

    #[test]
    fn sub_pixel_points_floor_into_their_pixel() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(!r.contains_f(PointF::new(-0.5, 5.0)));
        assert!(!r.contains_f(PointF::new(5.0, -0.25)));
        assert!(r.contains_f(PointF::new(0.0, 5.0)));
        assert!(r.contains_f(PointF::new(9.5, 9.5)));
        assert!(!r.contains_f(PointF::new(10.0, 5.0)));
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(r.contains(0, 0));
        assert!(r.contains(9, 9));
        assert!(!r.contains(10, 5));
        assert!(!r.contains(5, 10));
        assert!(!Rect::new(5, 5, 5, 5).contains(5, 5));
    }

    #[test]
    fn resize_about_center_keeps_center() {
        let r = Rect::new(100, 100, 300, 300).resize_about_center(Size::new(100, 50));
        assert_eq!(r, Rect::new(150, 175, 250, 225));
        assert_eq!(r.center_x(), 200);
        assert_eq!(r.center_y(), 200);
    }

    #[test]
    fn offset_to_preserves_size() {
        let r = Rect::new(3, 4, 13, 24).offset_to(-5, 0);
        assert_eq!(r, Rect::new(-5, 0, 5, 20));
    }

    #[test]
    fn square_at_straddles_point() {
        let sq = Rect::square_at(100, 100, 40);
        assert_eq!(sq, Rect::new(80, 80, 120, 120));
        assert!(sq.contains(100, 100));
    }

    #[test]
    fn intersects_excludes_touching_edges() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(9, 9, 20, 20)));
        assert!(!a.intersects(&Rect::new(10, 0, 20, 10)));
    }
}
