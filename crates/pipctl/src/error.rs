//! Error handling for the pipctl crate.

use std::{io, result, time::Duration};

use thiserror::Error;

/// Convenient result type for pipctl operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while driving a session.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Errors surfaced by the overlay coordinator.
    #[error("coordinator error: {0}")]
    Shell(#[from] pip_shell::Error),
    /// Failed to encode the JSON report.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    /// The coordinator never opened its input monitor.
    #[error("input monitor not ready after {0:?}")]
    InputUnavailable(Duration),
    /// The scripted gesture cannot start from the requested corner.
    #[error("{0}")]
    Scenario(String),
}

impl Error {
    /// Helper for scenario setup failures.
    pub fn scenario<M: Into<String>>(msg: M) -> Self {
        Self::Scenario(msg.into())
    }
}
