//! Display layout: identity, rotation, bounds and stable insets.

use std::fmt;

use pip_ids::DisplayId;
use serde::Serialize;

use crate::geom::{Insets, Rect};

/// Display rotation in quarter turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Rotation {
    /// Natural orientation.
    #[default]
    R0,
    /// Quarter turn clockwise.
    R90,
    /// Upside down.
    R180,
    /// Three quarter turns clockwise.
    R270,
}

impl Rotation {
    /// Number of clockwise quarter turns from natural orientation.
    pub const fn quarter_turns(self) -> u8 {
        match self {
            Self::R0 => 0,
            Self::R90 => 1,
            Self::R180 => 2,
            Self::R270 => 3,
        }
    }

    /// Inverse of [`Self::quarter_turns`], wrapping modulo four.
    const fn from_quarter_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => Self::R0,
            1 => Self::R90,
            2 => Self::R180,
            _ => Self::R270,
        }
    }
}

/// Geometry of the display hosting the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayLayout {
    /// Display the overlay lives on.
    pub display_id: DisplayId,
    /// Current rotation relative to natural orientation.
    pub rotation: Rotation,
    /// Full display bounds in the current rotation, origin at (0, 0).
    pub bounds: Rect,
    /// Stable insets (system bars, cutouts) in the current rotation.
    pub stable_insets: Insets,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            display_id: DisplayId::default(),
            rotation: Rotation::R0,
            bounds: Rect::new(0, 0, 1080, 2340),
            stable_insets: Insets::new(0, 0, 0, 0),
        }
    }
}

impl DisplayLayout {
    /// Unrotated layout of a `width` x `height` display.
    pub fn new(display_id: DisplayId, width: i32, height: i32, stable_insets: Insets) -> Self {
        Self {
            display_id,
            rotation: Rotation::R0,
            bounds: Rect::new(0, 0, width, height),
            stable_insets,
        }
    }

    /// Display bounds minus stable insets: where the overlay may live.
    pub fn inset_bounds(&self) -> Rect {
        self.bounds.inset(self.stable_insets)
    }

    /// This layout re-expressed in `target` rotation.
    ///
    /// Width and height swap on odd quarter turns and the insets rotate with
    /// the device, so a bottom nav bar at R0 becomes a right-hand bar at R90.
    pub fn rotate_to(&self, target: Rotation) -> Self {
        let mut out = *self;
        let delta = (4 + target.quarter_turns() - self.rotation.quarter_turns()) % 4;
        for _ in 0..delta {
            out = out.rotate_once();
        }
        out.rotation = target;
        out
    }

    /// One clockwise quarter turn.
    fn rotate_once(self) -> Self {
        let i = self.stable_insets;
        Self {
            display_id: self.display_id,
            rotation: Rotation::from_quarter_turns(self.rotation.quarter_turns() + 1),
            bounds: Rect::new(0, 0, self.bounds.height(), self.bounds.width()),
            stable_insets: Insets::new(i.bottom, i.left, i.top, i.right),
        }
    }
}

impl fmt::Display for DisplayLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rot={:?} bounds={} inset_bounds={}",
            self.display_id,
            self.rotation,
            self.bounds,
            self.inset_bounds()
        )
    }
}
