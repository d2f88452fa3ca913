//! Output side-channel for rendered command results.
//!
//! The executor never prints directly; it hands rendered lines to an
//! [`Output`]. [`StdoutOutput`] is what the interactive shell uses and
//! [`CaptureOutput`] collects lines for headless callers and tests.

use colored::Colorize;
use std::io::Write;
use std::sync::{Arc, Mutex};

pub trait Output: Send + Sync {
    /// Regular output line.
    fn line(&self, text: &str);

    /// Human-readable error line.
    fn error(&self, text: &str);
}

/// Writes to stdout/stderr.
///
/// A `BrokenPipe` (e.g. when piped into `head`) is ignored instead of
/// aborting the command.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn line(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{text}") {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                tracing::warn!(error = %e, "failed to write output");
            }
        }
    }

    fn error(&self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{} {}", "Error:".red().bold(), text);
    }
}

/// Captured output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Line(String),
    Error(String),
}

/// Collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct CaptureOutput {
    lines: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|c| match c {
                Captured::Line(l) => Some(l),
                Captured::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|c| match c {
                Captured::Error(e) => Some(e),
                Captured::Line(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Vec<Captured> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn push(&self, entry: Captured) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(entry);
        }
    }
}

impl Output for CaptureOutput {
    fn line(&self, text: &str) {
        self.push(Captured::Line(text.to_string()));
    }

    fn error(&self, text: &str) {
        self.push(Captured::Error(text.to_string()));
    }
}
