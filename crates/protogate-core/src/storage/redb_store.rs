//! # redb-backed Artifact Storage
//!
//! A disk-backed artifact store using the redb embedded database, providing:
//! - ACID transactions (the write-once check and the insert share one)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Artifact metadata is postcard-encoded; content is stored raw in a
//! separate table so listing records never loads content.

use super::{ArtifactRecord, ArtifactStore, ProducedArtifact, StoredArtifact, prepare_record};
use crate::{ArtifactName, ProtogateError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};

/// Table for records: artifact name -> postcard-encoded `ArtifactRecord`
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifact_records");

/// Table for content: artifact name -> raw bytes
const CONTENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifact_contents");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_SEQUENCE_KEY: &str = "next_sequence";

fn io_err(e: impl std::fmt::Display) -> ProtogateError {
    ProtogateError::IoError(e.to_string())
}

fn encode_record(record: &ArtifactRecord) -> Result<Vec<u8>, ProtogateError> {
    postcard::to_allocvec(record).map_err(|e| ProtogateError::SerializationError(e.to_string()))
}

fn decode_record(bytes: &[u8]) -> Result<ArtifactRecord, ProtogateError> {
    postcard::from_bytes(bytes).map_err(|e| ProtogateError::DeserializationError(e.to_string()))
}

/// A disk-backed artifact store using redb.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create an artifact store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProtogateError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(RECORDS).map_err(io_err)?;
            let _ = write_txn.open_table(CONTENTS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        tracing::debug!(path = %path.display(), "opened artifact store");
        Ok(Self { db, path })
    }

    /// Path of the underlying database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), ProtogateError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }
}

impl ArtifactStore for RedbStore {
    fn put(
        &mut self,
        artifact: ProducedArtifact,
        producer: &str,
    ) -> Result<ArtifactRecord, ProtogateError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;

        let record = {
            let mut records = write_txn.open_table(RECORDS).map_err(io_err)?;
            let mut contents = write_txn.open_table(CONTENTS).map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;

            // Dropping the uncommitted transaction aborts it.
            if records
                .get(artifact.name.as_str())
                .map_err(io_err)?
                .is_some()
            {
                return Err(ProtogateError::ArtifactWriteConflict(artifact.name));
            }

            let sequence = meta
                .get(NEXT_SEQUENCE_KEY)
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0);

            let location = format!("redb://{}#{}", self.path.display(), artifact.name);
            let record = prepare_record(&artifact, producer, location, sequence)?;
            let encoded = encode_record(&record)?;

            records
                .insert(artifact.name.as_str(), encoded.as_slice())
                .map_err(io_err)?;
            contents
                .insert(artifact.name.as_str(), artifact.content.as_slice())
                .map_err(io_err)?;
            meta.insert(NEXT_SEQUENCE_KEY, sequence.saturating_add(1))
                .map_err(io_err)?;
            record
        };

        write_txn.commit().map_err(io_err)?;
        Ok(record)
    }

    fn get(&self, name: &ArtifactName) -> Result<StoredArtifact, ProtogateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let records = read_txn.open_table(RECORDS).map_err(io_err)?;
        let contents = read_txn.open_table(CONTENTS).map_err(io_err)?;

        let record = match records.get(name.as_str()).map_err(io_err)? {
            Some(bytes) => decode_record(bytes.value())?,
            None => return Err(ProtogateError::ArtifactNotFound(name.clone())),
        };
        let content = contents
            .get(name.as_str())
            .map_err(io_err)?
            .map(|bytes| bytes.value().to_vec())
            .ok_or_else(|| {
                ProtogateError::IoError(format!("Content missing for artifact '{}'", name))
            })?;

        Ok(StoredArtifact { record, content })
    }

    fn record(&self, name: &ArtifactName) -> Result<Option<ArtifactRecord>, ProtogateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let records = read_txn.open_table(RECORDS).map_err(io_err)?;
        match records.get(name.as_str()).map_err(io_err)? {
            Some(bytes) => decode_record(bytes.value()).map(Some),
            None => Ok(None),
        }
    }

    fn add_consumer(&mut self, name: &ArtifactName, consumer: &str) -> Result<(), ProtogateError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut records = write_txn.open_table(RECORDS).map_err(io_err)?;
            let existing = records
                .get(name.as_str())
                .map_err(io_err)?
                .map(|bytes| bytes.value().to_vec())
                .ok_or_else(|| ProtogateError::ArtifactNotFound(name.clone()))?;

            let mut record = decode_record(&existing)?;
            if !record.consumers.insert(consumer.to_string()) {
                return Ok(());
            }
            let encoded = encode_record(&record)?;
            records
                .insert(name.as_str(), encoded.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<ArtifactRecord>, ProtogateError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let records = read_txn.open_table(RECORDS).map_err(io_err)?;

        let mut result = Vec::new();
        for entry in records.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            result.push(decode_record(value.value())?);
        }
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
