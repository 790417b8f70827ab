//! # JSON Lines Journal
//!
//! Appends each run event as one JSON object per line.

use protogate_core::{ProtogateError, RunEvent, RunJournal};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// File-backed [`RunJournal`]. Existing content is never truncated.
#[derive(Debug)]
pub struct JsonLinesJournal {
    writer: BufWriter<File>,
}

impl JsonLinesJournal {
    /// Open (or create) a journal file for appending.
    pub fn open(path: &Path) -> Result<Self, ProtogateError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtogateError::IoError(format!("Open journal: {}", e)))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl RunJournal for JsonLinesJournal {
    fn append(&mut self, event: &RunEvent) -> Result<(), ProtogateError> {
        serde_json::to_writer(&mut self.writer, event)
            .map_err(|e| ProtogateError::SerializationError(format!("Journal event: {}", e)))?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(|e| ProtogateError::IoError(format!("Write journal: {}", e)))
    }
}
