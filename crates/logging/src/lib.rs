#![warn(missing_docs)]

//! Shared logging helpers, CLI argument definitions, and tracing utilities for the pip-shell workspace.
//!
//! This crate consolidates logging infrastructure:
//! - [`fmt`]: Render tracing events to logfmt strings
//! - [`tail`]: Keep a bounded tail of recent events for diagnostics dumps
//! - CLI argument parsing for log level configuration
//! - [`init`]: install the standard subscriber for binaries

use std::env;

use clap::Args;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt, prelude::*, registry};

pub mod fmt;
pub mod tail;

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "pip_shell=trace,pipctl=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Filter spec derived from these arguments; see [`compute_spec`].
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// List of crate targets that constitute "our" logs.
pub fn our_crates() -> &'static [&'static str] {
    &["pip_shell", "pip_ids", "pipctl", "logging"]
}

/// Build a filter directive string that sets the same `level` for all of our crates.
pub fn level_spec_for(level: &str) -> String {
    let lvl = level.to_ascii_lowercase();
    our_crates()
        .iter()
        .map(|t| format!("{}={}", t, lvl))
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    env::var("RUST_LOG").unwrap_or_else(|_| level_spec_for("info"))
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}

/// Install the standard subscriber: the filter from `spec` plus a compact fmt
/// layer without timestamps. Returns `false` when a global subscriber already
/// exists, which is expected under test harnesses.
pub fn init(spec: &str) -> bool {
    install(spec, None)
}

/// Like [`init`], additionally recording rendered events into `tail`.
pub fn init_with_tail(spec: &str, tail: &tail::LogTail) -> bool {
    install(spec, Some(tail))
}

/// Install the global subscriber, optionally mirroring events into `recent`.
fn install(spec: &str, recent: Option<&tail::LogTail>) -> bool {
    registry()
        .with(env_filter_from_spec(spec))
        .with(subscriber_fmt::layer().without_time())
        .with(recent.map(tail::LogTail::layer))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let spec = compute_spec(true, false, Some("warn"), Some("pip_shell=trace"));
        assert_eq!(spec, "pip_shell=trace");
    }

    #[test]
    fn level_is_scoped_to_our_crates() {
        let spec = compute_spec(false, false, Some("DEBUG"), None);
        for krate in our_crates() {
            assert!(spec.contains(&format!("{krate}=debug")), "{spec}");
        }
    }

    #[test]
    fn trace_flag_beats_level() {
        let spec = compute_spec(true, false, Some("warn"), None);
        assert!(spec.contains("pip_shell=trace"));
    }
}
