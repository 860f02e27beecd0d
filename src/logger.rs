//! Diagnostic logging seam
//!
//! The exec flow reports non-fatal diagnostics (container defaulting,
//! unclassified stream errors) through [`Logger`] so callers can route them
//! wherever their test output goes. Logging never fails.

use parking_lot::Mutex;

/// Sink for formatted diagnostic messages
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Severity of a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

/// Keeps every diagnostic in memory, in the order it was logged
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded diagnostics
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.by_level(LogLevel::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.by_level(LogLevel::Warn)
    }

    fn by_level(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        tracing::debug!("recorded info: {}", message);
        self.entries.lock().push((LogLevel::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        tracing::debug!("recorded warning: {}", message);
        self.entries.lock().push((LogLevel::Warn, message.to_string()));
    }
}
