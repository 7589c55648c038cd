//! Configuration snapshot for the coordinator.
//!
//! A [`PipConfig`] is loaded once at startup (from RON or defaults), validated,
//! and then handed by value to every component that needs it. Nothing in the
//! crate reads configuration from process-wide state.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// Gesture defaults
/// Corner hit region edge, in pixels.
pub(crate) const DRAG_CORNER_SIZE: i32 = 48;
/// Pointer travel before a gesture captures the stream.
pub(crate) const TOUCH_SLOP: f32 = 8.0;
/// Pinch release snaps to max above this fraction of it.
pub(crate) const PINCH_AUTO_MAX_RATIO: f32 = 0.9;

// Size defaults
/// Shorter edge of the smallest overlay.
pub(crate) const MIN_EDGE_SIZE: i32 = 108;
/// Max shorter edge as a fraction of the shorter display edge.
pub(crate) const MAX_SIZE_PERCENT: f32 = 0.6;
/// Entry shorter edge as a fraction of the shorter display edge.
pub(crate) const DEFAULT_SIZE_PERCENT: f32 = 0.4;
/// Ratio used when the app requests none.
pub(crate) const DEFAULT_ASPECT_RATIO: f32 = 16.0 / 9.0;
/// Tallest accepted ratio, 100:239.
pub(crate) const MIN_ASPECT_RATIO: f32 = 100.0 / 239.0;
/// Widest accepted ratio, 239:100.
pub(crate) const MAX_ASPECT_RATIO: f32 = 239.0 / 100.0;

// Timing defaults
/// Settle animation length.
pub(crate) const RESIZE_SNAP_DURATION_MS: u64 = 250;
/// Screenshot fade length.
pub(crate) const CROSSFADE_DURATION_MS: u64 = 250;
/// About 60 frames per second.
pub(crate) const FRAME_INTERVAL_MS: u64 = 16;

// Runtime defaults
/// Coordinator command queue depth.
pub(crate) const COMMAND_CAPACITY: usize = 64;
/// Input control queue depth.
pub(crate) const INPUT_CONTROL_CAPACITY: usize = 16;
/// Transitions one drain may dispatch.
pub(crate) const MAX_REENTRANT_TRANSITIONS: usize = 16;

/// Serde default for flags that start enabled.
const fn default_true() -> bool {
    true
}
/// Serde default for `drag_corner_size`.
const fn default_drag_corner_size() -> i32 {
    DRAG_CORNER_SIZE
}
/// Serde default for `touch_slop`.
const fn default_touch_slop() -> f32 {
    TOUCH_SLOP
}
/// Serde default for `pinch_auto_max_ratio`.
const fn default_pinch_auto_max_ratio() -> f32 {
    PINCH_AUTO_MAX_RATIO
}
/// Serde default for `min_edge_size`.
const fn default_min_edge_size() -> i32 {
    MIN_EDGE_SIZE
}
/// Serde default for `max_size_percent`.
const fn default_max_size_percent() -> f32 {
    MAX_SIZE_PERCENT
}
/// Serde default for `default_size_percent`.
const fn default_default_size_percent() -> f32 {
    DEFAULT_SIZE_PERCENT
}
/// Serde default for `aspect_ratio`.
const fn default_aspect_ratio() -> f32 {
    DEFAULT_ASPECT_RATIO
}
/// Serde default for `min_aspect_ratio`.
const fn default_min_aspect_ratio() -> f32 {
    MIN_ASPECT_RATIO
}
/// Serde default for `max_aspect_ratio`.
const fn default_max_aspect_ratio() -> f32 {
    MAX_ASPECT_RATIO
}
/// Serde default for `resize_snap_duration_ms`.
const fn default_resize_snap_duration_ms() -> u64 {
    RESIZE_SNAP_DURATION_MS
}
/// Serde default for `crossfade_duration_ms`.
const fn default_crossfade_duration_ms() -> u64 {
    CROSSFADE_DURATION_MS
}
/// Serde default for `frame_interval_ms`.
const fn default_frame_interval_ms() -> u64 {
    FRAME_INTERVAL_MS
}
/// Serde default for `command_capacity`.
const fn default_command_capacity() -> usize {
    COMMAND_CAPACITY
}
/// Serde default for `input_control_capacity`.
const fn default_input_control_capacity() -> usize {
    INPUT_CONTROL_CAPACITY
}
/// Serde default for `max_reentrant_transitions`.
const fn default_max_reentrant_transitions() -> usize {
    MAX_REENTRANT_TRANSITIONS
}

/// Static configuration for the overlay coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipConfig {
    /// Enable single-pointer corner-drag resizing.
    #[serde(default = "default_true")]
    pub drag_resize_enabled: bool,
    /// Enable two-pointer pinch resizing.
    #[serde(default = "default_true")]
    pub pinch_resize_enabled: bool,
    /// Edge of the square hit regions centred on each corner, in pixels.
    #[serde(default = "default_drag_corner_size")]
    pub drag_corner_size: i32,
    /// Movement, in pixels, before a gesture captures the pointer stream.
    #[serde(default = "default_touch_slop")]
    pub touch_slop: f32,
    /// Fraction of the max size at which a pinch release snaps to max.
    #[serde(default = "default_pinch_auto_max_ratio")]
    pub pinch_auto_max_ratio: f32,
    /// Minimum length of the overlay's shorter edge, in pixels.
    #[serde(default = "default_min_edge_size")]
    pub min_edge_size: i32,
    /// Max shorter edge as a fraction of the shorter inset display edge.
    #[serde(default = "default_max_size_percent")]
    pub max_size_percent: f32,
    /// Default shorter edge on entry as a fraction of the shorter inset display edge.
    #[serde(default = "default_default_size_percent")]
    pub default_size_percent: f32,
    /// Aspect ratio used when the hosted app does not request one.
    #[serde(default = "default_aspect_ratio")]
    pub default_aspect_ratio: f32,
    /// Smallest accepted aspect ratio (width / height).
    #[serde(default = "default_min_aspect_ratio")]
    pub min_aspect_ratio: f32,
    /// Largest accepted aspect ratio (width / height).
    #[serde(default = "default_max_aspect_ratio")]
    pub max_aspect_ratio: f32,
    /// Duration of the animated resize that settles a gesture.
    #[serde(default = "default_resize_snap_duration_ms")]
    pub resize_snap_duration_ms: u64,
    /// Duration of the screenshot cross-fade after a non-seamless resize.
    #[serde(default = "default_crossfade_duration_ms")]
    pub crossfade_duration_ms: u64,
    /// Coordinator frame interval while an animation is running.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Capacity of the coordinator command channel.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
    /// Capacity of the input-thread control channel.
    #[serde(default = "default_input_control_capacity")]
    pub input_control_capacity: usize,
    /// Maximum transitions dispatched by one drain of the pending queue.
    #[serde(default = "default_max_reentrant_transitions")]
    pub max_reentrant_transitions: usize,
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            drag_resize_enabled: true,
            pinch_resize_enabled: true,
            drag_corner_size: DRAG_CORNER_SIZE,
            touch_slop: TOUCH_SLOP,
            pinch_auto_max_ratio: PINCH_AUTO_MAX_RATIO,
            min_edge_size: MIN_EDGE_SIZE,
            max_size_percent: MAX_SIZE_PERCENT,
            default_size_percent: DEFAULT_SIZE_PERCENT,
            default_aspect_ratio: DEFAULT_ASPECT_RATIO,
            min_aspect_ratio: MIN_ASPECT_RATIO,
            max_aspect_ratio: MAX_ASPECT_RATIO,
            resize_snap_duration_ms: RESIZE_SNAP_DURATION_MS,
            crossfade_duration_ms: CROSSFADE_DURATION_MS,
            frame_interval_ms: FRAME_INTERVAL_MS,
            command_capacity: COMMAND_CAPACITY,
            input_control_capacity: INPUT_CONTROL_CAPACITY,
            max_reentrant_transitions: MAX_REENTRANT_TRANSITIONS,
        }
    }
}

impl PipConfig {
    /// Parse and validate a RON document. Missing fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        let cfg: Self = ron::from_str(text).map_err(|source| Error::ConfigParse {
            path: None,
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Self = ron::from_str(&text).map_err(|source| Error::ConfigParse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.drag_corner_size <= 0 {
            return bad("drag_corner_size must be positive");
        }
        if !(self.touch_slop >= 0.0) {
            return bad("touch_slop must be non-negative");
        }
        if !(self.pinch_auto_max_ratio > 0.0 && self.pinch_auto_max_ratio <= 1.0) {
            return bad("pinch_auto_max_ratio must be in (0, 1]");
        }
        if self.min_edge_size <= 0 {
            return bad("min_edge_size must be positive");
        }
        if !(self.max_size_percent > 0.0 && self.max_size_percent <= 1.0) {
            return bad("max_size_percent must be in (0, 1]");
        }
        if !(self.default_size_percent > 0.0 && self.default_size_percent <= self.max_size_percent)
        {
            return bad("default_size_percent must be in (0, max_size_percent]");
        }
        if !(self.min_aspect_ratio > 0.0 && self.min_aspect_ratio <= self.max_aspect_ratio) {
            return bad("min_aspect_ratio must be positive and <= max_aspect_ratio");
        }
        if !(self.default_aspect_ratio >= self.min_aspect_ratio
            && self.default_aspect_ratio <= self.max_aspect_ratio)
        {
            return bad("default_aspect_ratio must lie within the aspect ratio limits");
        }
        if self.command_capacity == 0 || self.input_control_capacity == 0 {
            return bad("channel capacities must be non-zero");
        }
        if self.max_reentrant_transitions == 0 {
            return bad("max_reentrant_transitions must be non-zero");
        }
        Ok(())
    }

    /// [`Self::resize_snap_duration_ms`] as a [`Duration`].
    pub fn resize_snap_duration(&self) -> Duration {
        Duration::from_millis(self.resize_snap_duration_ms)
    }

    /// [`Self::crossfade_duration_ms`] as a [`Duration`].
    pub fn crossfade_duration(&self) -> Duration {
        Duration::from_millis(self.crossfade_duration_ms)
    }

    /// [`Self::frame_interval_ms`] as a [`Duration`].
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = PipConfig::from_ron("(drag_resize_enabled: true)").unwrap();
        assert_eq!(cfg, PipConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = PipConfig::from_ron("(pinch_resize_enabled: false, touch_slop: 12.0)").unwrap();
        assert!(!cfg.pinch_resize_enabled);
        assert!(cfg.drag_resize_enabled);
        assert_eq!(cfg.touch_slop, 12.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = PipConfig::from_ron("(no_such_field: 1)").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }), "{err}");
    }

    #[test]
    fn validation_catches_bad_ratios() {
        let err = PipConfig::from_ron("(pinch_auto_max_ratio: 1.5)").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        let err = PipConfig::from_ron("(default_aspect_ratio: 5.0)").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn durations_are_derived_from_millis() {
        let cfg = PipConfig {
            frame_interval_ms: 0,
            ..PipConfig::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(1));
        assert_eq!(cfg.resize_snap_duration(), Duration::from_millis(250));
    }
}
