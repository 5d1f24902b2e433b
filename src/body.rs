//! Request and response body buffering.
//!
//! Bodies stay in memory up to the in-memory limit and then spill to a
//! temporary file. The spill file is removed on [`BodyBuffer::close`]
//! or when the buffer is dropped.

use crate::error::Result;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// An append-only body buffer.
#[derive(Debug)]
pub struct BodyBuffer {
    memory: Vec<u8>,
    file: Option<NamedTempFile>,
    size: usize,
    memory_limit: usize,
    tmp_dir: Option<PathBuf>,
}

impl BodyBuffer {
    /// Create a buffer keeping at most `memory_limit` bytes in memory.
    /// Spill files go to `tmp_dir`, or the system temporary directory.
    pub fn new(memory_limit: usize, tmp_dir: Option<PathBuf>) -> Self {
        Self {
            memory: Vec::new(),
            file: None,
            size: 0,
            memory_limit,
            tmp_dir,
        }
    }

    /// Append a chunk.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.file.is_none() && self.size + chunk.len() > self.memory_limit {
            self.spill()?;
        }
        match &mut self.file {
            Some(file) => {
                file.seek(SeekFrom::End(0))?;
                file.write_all(chunk)?;
            }
            None => self.memory.extend_from_slice(chunk),
        }
        self.size += chunk.len();
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("zentinel-body-");
        let mut file = match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&self.memory)?;
        tracing::debug!(bytes = self.memory.len(), path = %file.path().display(), "body spilled to disk");
        self.memory = Vec::new();
        self.file = Some(file);
        Ok(())
    }

    /// Number of bytes written.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the body lives in a spill file.
    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    /// A reader positioned at the start of the body.
    pub fn reader(&mut self) -> Result<Box<dyn Read + '_>> {
        match &mut self.file {
            Some(file) => {
                let handle = file.as_file_mut();
                handle.seek(SeekFrom::Start(0))?;
                Ok(Box::new(handle.try_clone()?))
            }
            None => Ok(Box::new(Cursor::new(self.memory.as_slice()))),
        }
    }

    /// The whole body as bytes.
    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size);
        self.reader()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// The whole body as text; invalid UTF-8 is replaced.
    pub fn string(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Drop the contents and remove any spill file.
    pub fn close(&mut self) {
        self.memory = Vec::new();
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                tracing::warn!(error = %e, "failed to remove body spill file");
            }
        }
        self.size = 0;
    }
}
