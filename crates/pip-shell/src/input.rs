//! Pointer events as delivered by the input monitor.

use crossbeam_channel::Receiver;

use crate::geom::{PointF, Rect};

/// Masked pointer action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// First pointer went down.
    Down,
    /// One or more pointers moved.
    Move,
    /// An additional pointer went down; `action_index` names it.
    PointerDown,
    /// A non-final pointer went up; `action_index` names it.
    PointerUp,
    /// The last pointer went up.
    Up,
    /// The gesture was aborted by the system.
    Cancel,
}

/// One pointer of a motion event, in raw display coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pointer {
    /// Stable id for the life of the pointer.
    pub id: u32,
    /// Position in display pixels.
    pub pos: PointF,
}

/// A pointer event with every pointer currently down.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionEvent {
    /// What happened.
    pub action: Action,
    /// Every pointer currently down, including one going up.
    pub pointers: Vec<Pointer>,
    /// Index into `pointers` of the pointer that changed.
    pub action_index: usize,
}

impl MotionEvent {
    /// Event with pointer ids assigned in order from zero.
    pub fn new(action: Action, points: &[(f32, f32)]) -> Self {
        let pointers = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Pointer {
                id: i as u32,
                pos: PointF::new(x, y),
            })
            .collect::<Vec<_>>();
        let action_index = match action {
            Action::PointerDown | Action::PointerUp => pointers.len().saturating_sub(1),
            _ => 0,
        };
        Self {
            action,
            pointers,
            action_index,
        }
    }

    /// Single pointer pressed at `(x, y)`.
    pub fn down(x: f32, y: f32) -> Self {
        Self::new(Action::Down, &[(x, y)])
    }

    /// Pointers moved to `points`.
    pub fn move_to(points: &[(f32, f32)]) -> Self {
        Self::new(Action::Move, points)
    }

    /// A further pointer landed; the last of `points` is the new one.
    pub fn pointer_down(points: &[(f32, f32)]) -> Self {
        Self::new(Action::PointerDown, points)
    }

    /// The last of `points` is lifting.
    pub fn pointer_up(points: &[(f32, f32)]) -> Self {
        Self::new(Action::PointerUp, points)
    }

    /// Final pointer released at `(x, y)`.
    pub fn up(x: f32, y: f32) -> Self {
        Self::new(Action::Up, &[(x, y)])
    }

    /// Gesture aborted.
    pub fn cancel() -> Self {
        Self::new(Action::Cancel, &[])
    }

    /// Number of pointers down.
    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Position of the `index`th pointer.
    pub fn point(&self, index: usize) -> Option<PointF> {
        self.pointers.get(index).map(|p| p.pos)
    }

    /// Position of the pointer with `id`.
    pub fn point_by_id(&self, id: u32) -> Option<PointF> {
        self.pointers.iter().find(|p| p.id == id).map(|p| p.pos)
    }
}

/// What a gesture handler wants done after consuming an event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureOutcome {
    /// The event is not part of this gesture.
    Ignored,
    /// The gesture is armed or continuing; nothing to apply.
    Tracking,
    /// Show `bounds` rotated by `angle` degrees as live feedback. `pilfer`
    /// is set on the event that captured the pointer stream.
    Preview {
        /// Bounds to show.
        bounds: Rect,
        /// Rotation in degrees.
        angle: f32,
        /// Capture the pointer stream with this event.
        pilfer: bool,
    },
    /// The gesture was disabled; restore the committed surface transform.
    Rejected,
    /// Pointers lifted or cancelled; finalize the resize.
    Finished,
}

/// Monitor-style input channel attached to a display.
pub struct InputMonitor {
    /// Events in delivery order.
    events: Receiver<MotionEvent>,
    /// Steals active pointers from other consumers.
    pilfer: Box<dyn Fn() + Send>,
}

impl InputMonitor {
    /// Wrap an event stream; `pilfer` steals the active pointers from other
    /// consumers.
    pub fn new(events: Receiver<MotionEvent>, pilfer: impl Fn() + Send + 'static) -> Self {
        Self {
            events,
            pilfer: Box::new(pilfer),
        }
    }

    /// Incoming events.
    pub fn events(&self) -> &Receiver<MotionEvent> {
        &self.events
    }

    /// Capture the pointers currently down.
    pub fn pilfer_pointers(&self) {
        (self.pilfer)();
    }
}

impl std::fmt::Debug for InputMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputMonitor").finish_non_exhaustive()
    }
}
