//! Committed overlay geometry and the immutable snapshot handed to the input
//! thread.

use std::{collections::BTreeMap, fmt::Write as _};

use pip_ids::{LeashId, TaskId};
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    aspect::AspectRatio,
    config::PipConfig,
    display::DisplayLayout,
    geom::{Rect, Size},
    snap,
};

/// Callback invoked with the full exclusion map whenever it changes.
pub type ExclusionObserver = Box<dyn FnMut(&BTreeMap<String, Rect>) + Send>;

/// Where to restore the overlay on the next entry of the same task.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReentryState {
    /// Task the state was saved for.
    pub task: TaskId,
    /// Size to restore; only recorded when the user had resized.
    pub size: Option<Size>,
    /// Position along the movement bounds perimeter.
    pub snap_fraction: f32,
}

/// Min and max overlay size for `aspect` on `display`.
///
/// The min size has a shorter edge of `min_edge_size`. The max size has a
/// shorter edge of `max_size_percent` of the shorter inset display edge (never
/// below the min) and is shrunk to fit the inset display bounds.
pub fn size_limits(aspect: AspectRatio, display: &DisplayLayout, cfg: &PipConfig) -> (Size, Size) {
    let inset = display.inset_bounds().size();
    let min = aspect.size_for_shorter_edge(cfg.min_edge_size);
    let max_edge = percent_of(inset.shorter(), cfg.max_size_percent).max(cfg.min_edge_size);
    let mut max = aspect.size_for_shorter_edge(max_edge);
    if max.width > inset.width || max.height > inset.height {
        max = aspect.fit_within(inset);
    }
    if max.width < min.width || max.height < min.height {
        max = min;
    }
    (min, max)
}

/// Entry size when no reentry state is saved.
pub fn default_size(aspect: AspectRatio, display: &DisplayLayout, cfg: &PipConfig) -> Size {
    let (min, max) = size_limits(aspect, display, cfg);
    let edge = percent_of(display.inset_bounds().size().shorter(), cfg.default_size_percent);
    aspect.project(aspect.size_for_shorter_edge(edge), min, max)
}

/// `percent` of `value`, rounded to nearest.
fn percent_of(value: i32, percent: f32) -> i32 {
    (value as f32 * percent).round() as i32
}

/// Bounds, size limits and placement state of the overlay.
///
/// Owned by the coordinator thread. The input thread only ever sees a
/// [`PipSnapshot`].
pub struct BoundsState {
    /// Committed bounds.
    bounds: Rect,
    /// Smallest allowed size.
    min_size: Size,
    /// Largest allowed size.
    max_size: Size,
    /// Ratio sizes are projected onto.
    aspect_ratio: AspectRatio,
    /// Tucked against a display edge.
    stashed: bool,
    /// Set by the first completed user resize of a session.
    has_user_resized: bool,
    /// Bounds of the last completed user resize.
    user_resize_bounds: Option<Rect>,
    /// Areas the overlay keeps clear of, by name.
    named_exclusion_areas: BTreeMap<String, Rect>,
    /// Notified when the exclusion map changes.
    exclusion_observers: Vec<ExclusionObserver>,
    /// Placement to restore on the next entry.
    reentry: Option<ReentryState>,
}

impl BoundsState {
    /// Empty bounds with limits derived from `aspect_ratio` on `display`.
    pub fn new(aspect_ratio: AspectRatio, display: &DisplayLayout, cfg: &PipConfig) -> Self {
        let (min_size, max_size) = size_limits(aspect_ratio, display, cfg);
        Self {
            bounds: Rect::default(),
            min_size,
            max_size,
            aspect_ratio,
            stashed: false,
            has_user_resized: false,
            user_resize_bounds: None,
            named_exclusion_areas: BTreeMap::new(),
            exclusion_observers: Vec::new(),
            reentry: None,
        }
    }

    /// Record committed bounds.
    pub fn set_bounds(&mut self, bounds: Rect) {
        if !bounds.size().within(self.min_size, self.max_size) {
            debug!(%bounds, min = %self.min_size, max = %self.max_size, "bounds_outside_limits");
        }
        trace!(%bounds, "set_bounds");
        self.bounds = bounds;
    }

    /// Committed bounds.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Current minimum size.
    pub fn min_size(&self) -> Size {
        self.min_size
    }

    /// Current maximum size.
    pub fn max_size(&self) -> Size {
        self.max_size
    }

    /// Override the computed limits, e.g. with limits requested by the app.
    pub fn set_size_limits(&mut self, min: Size, max: Size) {
        let max = Size::new(max.width.max(min.width), max.height.max(min.height));
        self.min_size = min;
        self.max_size = max;
    }

    /// Current aspect ratio.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Adopt `aspect_ratio` without recomputing the limits.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Recompute min/max size for `aspect` on `display` and adopt `aspect`.
    pub fn update_min_max_size(
        &mut self,
        aspect: AspectRatio,
        display: &DisplayLayout,
        cfg: &PipConfig,
    ) {
        let (min, max) = size_limits(aspect, display, cfg);
        debug!(%aspect, %min, %max, "update_min_max_size");
        self.aspect_ratio = aspect;
        self.min_size = min;
        self.max_size = max;
    }

    /// Project `size` onto the current aspect ratio within the current limits.
    pub fn constrain_size(&self, size: Size) -> Size {
        self.aspect_ratio.project(size, self.min_size, self.max_size)
    }

    /// True when the overlay is tucked against a display edge.
    pub fn is_stashed(&self) -> bool {
        self.stashed
    }

    /// Tuck or untuck the overlay.
    pub fn set_stashed(&mut self, stashed: bool) {
        self.stashed = stashed;
    }

    /// True once the user has resized the overlay this session.
    pub fn has_user_resized(&self) -> bool {
        self.has_user_resized
    }

    /// Set whether the user has resized this session.
    pub fn set_has_user_resized(&mut self, resized: bool) {
        self.has_user_resized = resized;
    }

    /// Bounds last produced by a completed user resize.
    pub fn user_resize_bounds(&self) -> Option<Rect> {
        self.user_resize_bounds
    }

    /// Remember the bounds of a completed user resize.
    pub fn set_user_resize_bounds(&mut self, bounds: Rect) {
        self.user_resize_bounds = Some(bounds);
    }

    /// Set or clear (`None`) a named exclusion area.
    ///
    /// Observers are notified with the whole map only if it changed.
    pub fn set_named_exclusion_area(&mut self, name: &str, area: Option<Rect>) {
        let changed = match area {
            Some(rect) => self.named_exclusion_areas.insert(name.to_string(), rect) != Some(rect),
            None => self.named_exclusion_areas.remove(name).is_some(),
        };
        if !changed {
            return;
        }
        debug!(name, ?area, "exclusion_area_changed");
        for observer in &mut self.exclusion_observers {
            observer(&self.named_exclusion_areas);
        }
    }

    /// Named exclusion areas, ordered by name.
    pub fn named_exclusion_areas(&self) -> &BTreeMap<String, Rect> {
        &self.named_exclusion_areas
    }

    /// Register `observer` for exclusion map changes.
    pub fn add_exclusion_observer(&mut self, observer: ExclusionObserver) {
        self.exclusion_observers.push(observer);
    }

    /// Height reserved above the bottom inset edge: the tallest exclusion
    /// area overlapping the inset display bounds.
    pub fn bottom_offset(&self, display: &DisplayLayout) -> i32 {
        let inset = display.inset_bounds();
        self.named_exclusion_areas
            .values()
            .filter(|area| area.intersects(&inset))
            .map(Rect::height)
            .max()
            .unwrap_or(0)
    }

    /// Movement bounds for an overlay the size of `rect`.
    pub fn movement_bounds(&self, rect: Rect, display: &DisplayLayout) -> Rect {
        snap::movement_bounds(display.inset_bounds(), rect.size(), self.bottom_offset(display))
    }

    /// Current snap fraction of the committed bounds.
    pub fn snap_fraction(&self, display: &DisplayLayout) -> f32 {
        snap::snap_fraction(self.bounds, self.movement_bounds(self.bounds, display))
    }

    /// Remember where the overlay was so the next entry restores it.
    pub fn save_reentry_state(&mut self, task: TaskId, display: &DisplayLayout) {
        let state = ReentryState {
            task,
            size: self.has_user_resized.then(|| self.bounds.size()),
            snap_fraction: self.snap_fraction(display),
        };
        debug!(?state, "save_reentry_state");
        self.reentry = Some(state);
    }

    /// Saved reentry state for any task.
    pub fn reentry_state(&self) -> Option<ReentryState> {
        self.reentry
    }

    /// Saved reentry state, if it was saved for `task`.
    pub fn reentry_state_for(&self, task: TaskId) -> Option<ReentryState> {
        self.reentry.filter(|r| r.task == task)
    }

    /// Forget the saved reentry state.
    pub fn clear_reentry_state(&mut self) {
        self.reentry = None;
    }

    /// Forget per-session state at the end of a session.
    pub fn on_session_ended(&mut self) {
        self.stashed = false;
        self.has_user_resized = false;
        self.user_resize_bounds = None;
    }

    /// Append a human-readable description to `out`.
    pub fn dump(&self, out: &mut String, prefix: &str) {
        let _ = writeln!(out, "{prefix}BoundsState");
        let _ = writeln!(out, "{prefix}  bounds={}", self.bounds);
        let _ = writeln!(out, "{prefix}  min_size={} max_size={}", self.min_size, self.max_size);
        let _ = writeln!(out, "{prefix}  aspect_ratio={}", self.aspect_ratio);
        let _ = writeln!(
            out,
            "{prefix}  stashed={} has_user_resized={}",
            self.stashed, self.has_user_resized
        );
        if let Some(b) = self.user_resize_bounds {
            let _ = writeln!(out, "{prefix}  user_resize_bounds={b}");
        }
        for (name, area) in &self.named_exclusion_areas {
            let _ = writeln!(out, "{prefix}  exclusion[{name}]={area}");
        }
        if let Some(r) = self.reentry {
            let _ = writeln!(out, "{prefix}  reentry={r:?}");
        }
    }
}

/// Read-only view of the coordinator's state for hit-testing and clamping on
/// the input thread.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PipSnapshot {
    /// Committed bounds.
    pub bounds: Rect,
    /// Smallest allowed size.
    pub min_size: Size,
    /// Largest allowed size.
    pub max_size: Size,
    /// Ratio sizes are projected onto.
    pub aspect_ratio: AspectRatio,
    /// Tucked against a display edge.
    pub stashed: bool,
    /// The overlay is entering or entered.
    pub in_pip: bool,
    /// A transition owns the surface; gestures are ignored.
    pub input_suppressed: bool,
    /// Leash carrying the task while attached.
    pub leash: Option<LeashId>,
    /// Display the overlay lives on.
    pub display: DisplayLayout,
    /// Height reserved above the bottom inset edge.
    pub bottom_offset: i32,
}

impl Default for PipSnapshot {
    fn default() -> Self {
        Self {
            bounds: Rect::default(),
            min_size: Size::default(),
            max_size: Size::default(),
            aspect_ratio: AspectRatio::SQUARE,
            stashed: false,
            in_pip: false,
            input_suppressed: false,
            leash: None,
            display: DisplayLayout::default(),
            bottom_offset: 0,
        }
    }
}

impl PipSnapshot {
    /// Capture `state` together with the coordinator flags.
    pub fn capture(
        state: &BoundsState,
        display: &DisplayLayout,
        in_pip: bool,
        input_suppressed: bool,
        leash: Option<LeashId>,
    ) -> Self {
        Self {
            bounds: state.bounds(),
            min_size: state.min_size(),
            max_size: state.max_size(),
            aspect_ratio: state.aspect_ratio(),
            stashed: state.is_stashed(),
            in_pip,
            input_suppressed,
            leash,
            display: *display,
            bottom_offset: state.bottom_offset(display),
        }
    }

    /// Movement bounds for an overlay the size of `rect`.
    pub fn movement_bounds(&self, rect: Rect) -> Rect {
        snap::movement_bounds(self.display.inset_bounds(), rect.size(), self.bottom_offset)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use pip_ids::DisplayId;

    use super::*;
    use crate::geom::Insets;

    fn display() -> DisplayLayout {
        DisplayLayout::new(DisplayId::new(0), 1000, 2000, Insets::new(0, 0, 0, 0))
    }

    fn square_state() -> BoundsState {
        BoundsState::new(AspectRatio::SQUARE, &display(), &PipConfig::default())
    }

    #[test]
    fn limits_follow_min_edge_and_percent() {
        let (min, max) = size_limits(AspectRatio::SQUARE, &display(), &PipConfig::default());
        assert_eq!(min, Size::new(108, 108));
        assert_eq!(max, Size::new(600, 600));
    }

    #[test]
    fn wide_max_is_fitted_to_display() {
        let wide = AspectRatio::new(239, 100).unwrap();
        let d = DisplayLayout::new(DisplayId::new(0), 1000, 1000, Insets::default());
        let (_, max) = size_limits(wide, &d, &PipConfig::default());
        assert!(max.width <= 1000 && max.height <= 1000, "{max}");
        assert!(wide.matches(max));
    }

    #[test]
    fn default_size_sits_between_limits() {
        let s = default_size(AspectRatio::new(16, 9).unwrap(), &display(), &PipConfig::default());
        assert_eq!(s.height, 400);
        assert_eq!(s.width, 711);
    }

    #[test]
    fn observers_fire_only_on_change() {
        let mut state = square_state();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        state.add_exclusion_observer(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let shelf = Rect::new(0, 1800, 1000, 2000);
        state.set_named_exclusion_area("shelf", Some(shelf));
        state.set_named_exclusion_area("shelf", Some(shelf));
        state.set_named_exclusion_area("ime", None);
        state.set_named_exclusion_area("shelf", None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tallest_overlapping_area_offsets_movement_bottom() {
        let mut state = square_state();
        state.set_named_exclusion_area("shelf", Some(Rect::new(0, 1900, 1000, 2000)));
        state.set_named_exclusion_area("ime", Some(Rect::new(0, 1700, 1000, 2000)));
        state.set_named_exclusion_area("offscreen", Some(Rect::new(0, 3000, 1000, 3900)));
        let mb = state.movement_bounds(Rect::new(0, 0, 200, 200), &display());
        assert_eq!(mb, Rect::new(0, 0, 800, 1500));
    }

    #[test]
    fn reentry_size_recorded_only_after_user_resize() {
        let mut state = square_state();
        state.set_bounds(Rect::new(800, 1800, 1000, 2000));
        let task = TaskId::new(7);
        state.save_reentry_state(task, &display());
        let r = state.reentry_state().unwrap();
        assert_eq!(r.size, None);
        assert_eq!(r.snap_fraction, 2.0);

        state.set_has_user_resized(true);
        state.save_reentry_state(task, &display());
        assert_eq!(state.reentry_state_for(task).unwrap().size, Some(Size::new(200, 200)));
        assert!(state.reentry_state_for(TaskId::new(8)).is_none());
    }

    #[test]
    fn snapshot_carries_movement_inputs() {
        let mut state = square_state();
        state.set_bounds(Rect::new(0, 0, 200, 200));
        state.set_named_exclusion_area("shelf", Some(Rect::new(0, 1900, 1000, 2000)));
        let snap = PipSnapshot::capture(&state, &display(), true, false, None);
        assert_eq!(snap.bottom_offset, 100);
        assert_eq!(
            snap.movement_bounds(snap.bounds),
            state.movement_bounds(state.bounds(), &display())
        );
    }
}
