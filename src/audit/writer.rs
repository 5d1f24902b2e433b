//! Audit record sinks.

use super::{AuditLog, AuditLogFormat};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination for audit records. Shared by every transaction of a WAF.
pub trait AuditWriter: Send + Sync {
    /// Write one record.
    fn write(&self, log: &AuditLog) -> Result<()>;
}

/// Appends formatted records to one file.
///
/// Records are rendered before the lock is taken, so concurrent
/// transactions only serialize on the append itself.
#[derive(Debug)]
pub struct SerialAuditWriter {
    path: PathBuf,
    format: AuditLogFormat,
    file: Mutex<File>,
}

impl SerialAuditWriter {
    /// Open (or create) `path` for appending.
    pub fn open(path: &Path, format: AuditLogFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::AuditLog {
                message: format!("{}: {}", path.display(), e),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            file: Mutex::new(file),
        })
    }

    /// The log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditWriter for SerialAuditWriter {
    fn write(&self, log: &AuditLog) -> Result<()> {
        let mut record = self.format.format(log)?;
        record.push('\n');
        let mut file = self.file.lock();
        file.write_all(record.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::AuditLog {
                message: format!("{}: {}", self.path.display(), e),
            })
    }
}

/// Keeps records in memory. Handy for hosts that ship records themselves.
#[derive(Debug, Default)]
pub struct MemoryAuditWriter {
    records: Mutex<Vec<AuditLog>>,
}

impl MemoryAuditWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every record written so far.
    pub fn drain(&self) -> Vec<AuditLog> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl AuditWriter for MemoryAuditWriter {
    fn write(&self, log: &AuditLog) -> Result<()> {
        self.records.lock().push(log.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditContext, AuditLogParts};
    use crate::engine::EngineMode;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(id: &str) -> AuditLog {
        AuditLog::build(
            AuditContext {
                id,
                started: Utc::now(),
                elapsed: Duration::ZERO,
                client: ("127.0.0.1", 1),
                server: ("127.0.0.1", 2),
                sensor_id: None,
                method: "GET",
                uri: "/",
                protocol: "HTTP/1.1",
                request_headers: &[],
                request_body: None,
                request_body_no_files: None,
                files: &[],
                response_status: None,
                response_headers: &[],
                response_body: None,
                engine: EngineMode::On,
                components: &[],
                matched: &[],
                intervention: None,
            },
            AuditLogParts::default(),
        )
    }

    #[test]
    fn test_serial_writer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let writer = Arc::new(SerialAuditWriter::open(&path, AuditLogFormat::Json).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || writer.write(&record(&format!("tx-{i}"))).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value["transaction"]["id"].as_str().unwrap().starts_with("tx-"));
        }
    }

    #[test]
    fn test_memory_writer() {
        let writer = MemoryAuditWriter::new();
        writer.write(&record("a")).unwrap();
        writer.write(&record("b")).unwrap();
        let records = writer.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].transaction.id, "b");
        assert!(writer.drain().is_empty());
    }
}
