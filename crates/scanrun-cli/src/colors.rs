//! Terminal color constants and utilities for CLI output.

use std::io::{self, Write};

use scanrun_core::RunStatus;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// Color for a sealed run's status line.
pub fn for_status(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => GREEN,
        RunStatus::Cancelled => YELLOW,
        RunStatus::Failed | RunStatus::TimedOut => RED,
    }
}

/// Flush stderr so a progress line without a trailing newline shows up.
#[inline]
pub fn flush_stderr() {
    io::stderr().flush().ok();
}
