//! Error types and result alias for the pip-shell crate.
use std::{io, path::PathBuf, result::Result as StdResult};

use thiserror::Error;
use tracing::error;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// Error variants produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A bounds-dependent field was read while no task is attached.
    #[error("no task attached: overlay is not in pip")]
    NotInPip,

    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("config parse error{}: {source}", path_suffix(.path))]
    ConfigParse {
        /// Optional path associated with the parse error.
        path: Option<PathBuf>,
        /// Underlying RON error with span information.
        #[source]
        source: ron::error::SpannedError,
    },

    /// I/O failure while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A coordinator or input channel was closed by its peer.
    #[error("channel closed")]
    ChannelClosed,

    /// The windowing service could not provide an input monitor.
    #[error("input monitor unavailable: {0}")]
    InputMonitor(String),

    /// A runtime thread panicked or could not be joined.
    #[error("thread join failed: {0}")]
    ThreadJoin(&'static str),
}

/// Format the optional path for the parse error message.
fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// Report an internal invariant violation.
///
/// Loud in development (panics under `debug_assertions`) and logged at error
/// severity in production so that a live session is not taken down.
#[track_caller]
pub fn report_invariant(what: &str) {
    error!(what, "invariant_violation");
    debug_assert!(false, "invariant violation: {what}");
}
