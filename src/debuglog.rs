//! Rule-engine debug log.
//!
//! Events carry a ModSecurity debug level (1 = errors .. 9 = everything).
//! An event is emitted only when its level is at or below the configured
//! `SecDebugLogLevel`; it then goes to `tracing` and, when `SecDebugLog`
//! names a file, is appended to that file as well.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Highest debug level.
pub const MAX_DEBUG_LEVEL: u8 = 9;

/// Shared debug sink.
#[derive(Debug, Default)]
pub struct DebugLogger {
    file: Option<Mutex<File>>,
}

impl DebugLogger {
    /// Logger that only forwards to `tracing`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger that also appends to `path`.
    pub fn with_file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::RuleFileLoad {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    /// A handle bound to one transaction and its current level.
    pub fn scope<'a>(&'a self, level: u8, tx_id: &'a str) -> DebugScope<'a> {
        DebugScope {
            logger: self,
            level,
            tx_id,
        }
    }

    fn emit(&self, level: u8, tx_id: &str, message: fmt::Arguments<'_>) {
        match level {
            0 => return,
            1 => tracing::error!(tx = tx_id, "{}", message),
            2 => tracing::warn!(tx = tx_id, "{}", message),
            3 => tracing::info!(tx = tx_id, "{}", message),
            4..=8 => tracing::debug!(tx = tx_id, "{}", message),
            _ => tracing::trace!(tx = tx_id, "{}", message),
        }
        if let Some(file) = &self.file {
            let line = format!(
                "[{}] [{}] [{}] {}\n",
                chrono::Utc::now().format("%d/%b/%Y:%H:%M:%S%.6f %z"),
                tx_id,
                level,
                message
            );
            if let Err(e) = file.lock().write_all(line.as_bytes()) {
                tracing::warn!(error = %e, "debug log write failed");
            }
        }
    }
}

/// A [`DebugLogger`] bound to a transaction.
#[derive(Debug, Clone, Copy)]
pub struct DebugScope<'a> {
    logger: &'a DebugLogger,
    level: u8,
    tx_id: &'a str,
}

impl<'a> DebugScope<'a> {
    /// Whether events at `level` are emitted.
    pub fn enabled(&self, level: u8) -> bool {
        level != 0 && level <= self.level
    }

    /// Emit an event at `level`.
    pub fn log(&self, level: u8, message: fmt::Arguments<'_>) {
        if self.enabled(level) {
            self.logger.emit(level, self.tx_id, message);
        }
    }

    /// Level 1.
    pub fn error(&self, message: impl fmt::Display) {
        self.log(1, format_args!("{}", message));
    }

    /// Level 2.
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(2, format_args!("{}", message));
    }

    /// Level 4.
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(4, format_args!("{}", message));
    }

    /// Level 9.
    pub fn trace(&self, message: impl fmt::Display) {
        self.log(9, format_args!("{}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_gating() {
        let logger = DebugLogger::new();
        let scope = logger.scope(3, "tx1");
        assert!(scope.enabled(1));
        assert!(scope.enabled(3));
        assert!(!scope.enabled(4));
        assert!(!logger.scope(0, "tx1").enabled(1));
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let logger = DebugLogger::with_file(&path).unwrap();

        let scope = logger.scope(4, "abc");
        scope.warn("rule 1 matched");
        scope.trace("not written");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[abc] [2] rule 1 matched"));
        assert!(!content.contains("not written"));
    }
}
