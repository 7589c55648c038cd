//! Bounded in-memory tail of recent tracing events.
//!
//! The coordinator's diagnostics dump appends this tail so that a dump taken
//! after a misbehaving gesture shows what led up to it. The layer is cheap:
//! one render and one short lock per event.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::fmt::{RenderedLog, render_event};

/// Default number of retained events.
pub const DEFAULT_TAIL_CAPACITY: usize = 256;

/// Shared ring buffer of rendered events.
#[derive(Clone, Debug)]
pub struct LogTail {
    /// Rendered events, oldest first.
    inner: Arc<Mutex<VecDeque<RenderedLog>>>,
    /// Maximum retained events.
    capacity: usize,
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_CAPACITY)
    }
}

impl LogTail {
    /// Create a tail retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Layer that records into this tail.
    pub fn layer(&self) -> TailLayer {
        TailLayer { tail: self.clone() }
    }

    /// Append a rendered event, evicting the oldest when full.
    pub fn push(&self, log: RenderedLog) {
        let mut guard = self.inner.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(log);
    }

    /// Snapshot of retained events, oldest first.
    pub fn snapshot(&self) -> Vec<RenderedLog> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Retained events rendered as logfmt lines.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().iter().map(RenderedLog::to_line).collect()
    }
}

/// Tracing layer feeding a [`LogTail`].
pub struct TailLayer {
    /// Destination buffer.
    tail: LogTail,
}

impl<S> Layer<S> for TailLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.tail.push(render_event(event));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry};

    use super::*;

    #[test]
    fn tail_keeps_most_recent_events() {
        let tail = LogTail::new(2);
        let subscriber = registry().with(tail.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(n = 1, "first");
            tracing::info!(n = 2, "second");
            tracing::warn!("third");
        });
        let logs = tail.snapshot();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second n=2");
        assert_eq!(logs[1].level, "WARN");
        assert_eq!(logs[1].message, "third");
    }

    #[test]
    fn lines_render_as_logfmt() {
        let tail = LogTail::new(4);
        let subscriber = registry().with(tail.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(bounds = "(0,0,1,1)", "commit");
        });
        let lines = tail.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("level=DEBUG target="));
        assert!(lines[0].ends_with("commit bounds=\"(0,0,1,1)\""));
    }
}
