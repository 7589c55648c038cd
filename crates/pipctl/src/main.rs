#![warn(missing_docs)]

//! Entry point for the `pipctl` binary.

mod cli;
mod error;
mod gesture;
mod session;
mod sim;

use std::process;

use clap::Parser;
use logging::tail::{DEFAULT_TAIL_CAPACITY, LogTail};
use tracing::error;

use crate::{cli::Cli, error::Result};

/// Run, reporting any failure on stderr with a non-zero exit.
fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and run the chosen scenario.
fn run() -> Result<()> {
    let Cli {
        log,
        session,
        command,
    } = Cli::parse();
    let tail = LogTail::new(DEFAULT_TAIL_CAPACITY);
    logging::init_with_tail(&log.spec(), &tail);
    session::run(&session, &command, &tail)
}
