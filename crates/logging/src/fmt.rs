//! Render `tracing` events as single logfmt lines.
//!
//! Used by [`crate::tail::LogTail`] to keep recent coordinator events in a
//! stable `key=value` form for diagnostics reports.

use std::fmt::{self, Debug, Write};

use tracing::{
    Event,
    field::{Field, Visit},
};

/// One event reduced to strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLog {
    /// Severity, e.g. `INFO`.
    pub level: String,
    /// Event target, usually the module path.
    pub target: String,
    /// Event name followed by its fields as `key=value`.
    pub message: String,
}

impl RenderedLog {
    /// Single-line logfmt form: `level=.. target=.. msg`.
    pub fn to_line(&self) -> String {
        format!("level={} target={} {}", self.level, self.target, self.message)
    }
}

impl fmt::Display for RenderedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Collects the event name and its fields in declaration order.
#[derive(Default)]
struct LineVisitor {
    /// The `message` field, which carries the snake_case event name.
    name: Option<String>,
    /// Every other field, already rendered.
    fields: Vec<String>,
}

impl LineVisitor {
    /// Record one field, routing `message` to the event name.
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.name = Some(value);
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    /// Join the name and fields with single spaces.
    fn finish(self) -> String {
        let mut out = self.name.unwrap_or_default();
        for f in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&f);
        }
        out
    }
}

impl Visit for LineVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.push(field, value.to_string());
        } else {
            self.push(field, format!("{value:?}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        let mut s = String::new();
        let _ignored = write!(s, "{value:?}");
        self.push(field, s);
    }
}

/// Reduce `event` to level, target and a logfmt message.
pub fn render_event(event: &Event<'_>) -> RenderedLog {
    let meta = event.metadata();
    let mut vis = LineVisitor::default();
    event.record(&mut vis);
    RenderedLog {
        level: meta.level().to_string(),
        target: meta.target().to_string(),
        message: vis.finish(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing::{Subscriber, debug, info, warn};
    use tracing_subscriber::{
        layer::{Context, Layer},
        prelude::*,
    };

    use super::*;

    struct Capture(Arc<Mutex<Vec<RenderedLog>>>);

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().push(render_event(event));
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<RenderedLog> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Capture(seen.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let out = seen.lock().clone();
        out
    }

    #[test]
    fn name_precedes_fields_in_order() {
        let logs = capture(|| {
            info!(token = 3u64, to_split = false, "schedule_exit_via_expand");
        });
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, "INFO");
        assert_eq!(logs[0].message, "schedule_exit_via_expand token=3 to_split=false");
    }

    #[test]
    fn strings_are_quoted_and_display_fields_are_bare() {
        let logs = capture(|| {
            let bounds = "(0, 0, 10, 10)";
            warn!(what = "task", %bounds, "invariant_violation");
        });
        assert_eq!(
            logs[0].message,
            "invariant_violation what=\"task\" bounds=(0, 0, 10, 10)"
        );
    }

    #[test]
    fn fields_without_name_render_alone() {
        let logs = capture(|| debug!(ratio = -1i64));
        assert_eq!(logs[0].message, "ratio=-1");
        assert!(logs[0].to_line().starts_with("level=DEBUG target="));
    }
}
