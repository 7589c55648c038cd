//! Exact rational aspect ratios.
//!
//! Aspect corrections are computed with integer arithmetic on a reduced
//! `width:height` fraction. Float ratios drift by a pixel between frames,
//! which shows up as a visible one-pixel oscillation of the dragged edge.

use std::fmt;

use serde::Serialize;

use crate::geom::Size;

/// Largest denominator used when approximating a float ratio.
const MAX_DENOMINATOR: u32 = 1000;

/// Reduced `width:height` ratio, both terms positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AspectRatio {
    /// Numerator, in lowest terms.
    width: u32,
    /// Denominator, in lowest terms.
    height: u32,
}

/// Greatest common divisor by Euclid.
const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Integer `round(value * num / den)` for non-negative values.
#[inline]
fn mul_div_round(value: i32, num: u32, den: u32) -> i32 {
    let v = i64::from(value.max(0)) * i64::from(num);
    let d = i64::from(den);
    ((v + d / 2) / d) as i32
}

impl AspectRatio {
    /// 1:1.
    pub const SQUARE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Build from integer terms, reducing by their gcd. `None` if either is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let g = gcd(width, height);
        Some(Self {
            width: width / g,
            height: height / g,
        })
    }

    /// Best rational approximation of `ratio` with a bounded denominator.
    pub fn from_f32(ratio: f32) -> Option<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return None;
        }
        // Continued-fraction convergents h/k.
        let target = f64::from(ratio);
        let (mut h0, mut h1) = (0u64, 1u64);
        let (mut k0, mut k1) = (1u64, 0u64);
        let mut x = target;
        loop {
            let a = x.floor();
            let h2 = (a as u64).saturating_mul(h1).saturating_add(h0);
            let k2 = (a as u64).saturating_mul(k1).saturating_add(k0);
            if k2 > u64::from(MAX_DENOMINATOR) || h2 > u64::from(u32::MAX) {
                break;
            }
            (h0, h1, k0, k1) = (h1, h2, k1, k2);
            let frac = x - a;
            if frac < 1e-9 {
                break;
            }
            x = 1.0 / frac;
        }
        if k1 == 0 || h1 == 0 {
            return None;
        }
        Self::new(h1 as u32, k1 as u32)
    }

    /// Ratio as width over height.
    #[inline]
    pub fn as_f32(self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Width term of the reduced fraction.
    #[inline]
    pub fn width_term(self) -> u32 {
        self.width
    }

    /// Height term of the reduced fraction.
    #[inline]
    pub fn height_term(self) -> u32 {
        self.height
    }

    /// True when the overlay is at most as wide as it is tall.
    #[inline]
    pub fn is_portrait_or_square(self) -> bool {
        self.width <= self.height
    }

    /// Clamp into `[min, max]` (float limits from configuration).
    pub fn clamp(self, min: f32, max: f32) -> Self {
        let r = self.as_f32();
        if r < min {
            Self::from_f32(min).unwrap_or(self)
        } else if r > max {
            Self::from_f32(max).unwrap_or(self)
        } else {
            self
        }
    }

    /// Height matching `width` at this ratio, rounded to nearest.
    #[inline]
    pub fn height_for_width(self, width: i32) -> i32 {
        mul_div_round(width, self.height, self.width)
    }

    /// Width matching `height` at this ratio, rounded to nearest.
    #[inline]
    pub fn width_for_height(self, height: i32) -> i32 {
        mul_div_round(height, self.width, self.height)
    }

    /// Size whose shorter edge is `edge`.
    pub fn size_for_shorter_edge(self, edge: i32) -> Size {
        if self.is_portrait_or_square() {
            Size::new(edge, self.height_for_width(edge))
        } else {
            Size::new(self.width_for_height(edge), edge)
        }
    }

    /// Largest size with this ratio fitting inside `bound`.
    pub fn fit_within(self, bound: Size) -> Size {
        let by_width = Size::new(bound.width, self.height_for_width(bound.width));
        if by_width.height <= bound.height {
            by_width
        } else {
            Size::new(self.width_for_height(bound.height), bound.height)
        }
    }

    /// Project a freeform size onto this ratio.
    ///
    /// The shorter edge of `size` (never below the shorter edge of `min`) is
    /// kept and the other edge derived from the ratio; the result is then
    /// shrunk to fit `max` if needed.
    pub fn project(self, size: Size, min: Size, max: Size) -> Size {
        let edge = size.shorter().max(min.shorter());
        let projected = self.size_for_shorter_edge(edge);
        if projected.width > max.width || projected.height > max.height {
            self.fit_within(max)
        } else {
            projected
        }
    }

    /// Project a freeform drag result onto this ratio, following the edge
    /// that moved.
    ///
    /// One candidate is driven by the width of `size` and one by its height,
    /// both clamped to `[min, max]`. When `size` grew relative to `from` the
    /// larger candidate wins, when it shrank the smaller one does; motion
    /// along a single axis is therefore never discarded.
    pub fn project_from(self, from: Size, size: Size, min: Size, max: Size) -> Size {
        let by_width = self.clamp_size(
            Size::new(size.width, self.height_for_width(size.width)),
            min,
            max,
        );
        let by_height = self.clamp_size(
            Size::new(self.width_for_height(size.height), size.height),
            min,
            max,
        );
        let growth = (size.width - from.width) + (size.height - from.height);
        let (small, large) = if by_width.width <= by_height.width {
            (by_width, by_height)
        } else {
            (by_height, by_width)
        };
        match growth.signum() {
            1 => large,
            -1 => small,
            _ => self.project(size, min, max),
        }
    }

    /// Scale `size`, which already has this ratio, into `[min, max]`.
    fn clamp_size(self, size: Size, min: Size, max: Size) -> Size {
        let mut out = size;
        if out.width < min.width || out.height < min.height {
            let by_width = Size::new(min.width, self.height_for_width(min.width));
            let by_height = Size::new(self.width_for_height(min.height), min.height);
            out = if by_width.width >= by_height.width {
                by_width
            } else {
                by_height
            };
        }
        if out.width > max.width || out.height > max.height {
            out = self.fit_within(max);
        }
        out
    }

    /// Whether `size` satisfies this ratio within one pixel on either axis.
    pub fn matches(self, size: Size) -> bool {
        (size.height - self.height_for_width(size.width)).abs() <= 1
            || (size.width - self.width_for_height(size.height)).abs() <= 1
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}
