//! # Artifact Storage
//!
//! Named, checksummed evidence artifacts.
//!
//! Every store enforces the same contract:
//! - Single writer: an artifact name can be written exactly once
//! - Multi reader: any later phase may read it and is recorded as a consumer
//! - Checksums (BLAKE3) are computed and recorded at write time
//! - Each write gets a strictly increasing sequence number
//!
//! ## Backends
//!
//! - `MemoryStore`: in-process `BTreeMap` (volatile)
//! - `RedbStore`: disk-backed ACID storage using redb

mod redb_store;

pub use redb_store::RedbStore;

use crate::primitives::MAX_ARTIFACT_SIZE;
use crate::types::validate_artifact_name;
use crate::{ArtifactName, ProtogateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ARTIFACT TYPES
// =============================================================================

/// Metadata recorded for a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Artifact name (unique within a store).
    pub name: ArtifactName,
    /// Where the content came from or lives.
    pub location: String,
    /// BLAKE3 hex digest of the content.
    pub checksum: String,
    /// Protocol (or phase) that produced the artifact.
    pub producer: String,
    /// Protocols (or phases) that have read the artifact.
    pub consumers: BTreeSet<String>,
    /// Logical write sequence number (store-wide, strictly increasing).
    pub sequence: u64,
    /// Content size in bytes.
    pub size: u64,
}

/// A stored artifact: metadata plus content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub record: ArtifactRecord,
    pub content: Vec<u8>,
}

impl StoredArtifact {
    /// Recompute the content checksum and compare with the recorded one.
    pub fn verify(&self) -> Result<(), ProtogateError> {
        let actual = checksum(&self.content);
        if actual != self.record.checksum {
            return Err(ProtogateError::IoError(format!(
                "Checksum mismatch for artifact '{}': recorded {}, computed {}",
                self.record.name, self.record.checksum, actual
            )));
        }
        Ok(())
    }

    /// Content as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// An artifact produced by a protocol step, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub name: ArtifactName,
    pub content: Vec<u8>,
    /// Original location (e.g. the file it was read from).
    pub origin: Option<String>,
}

impl ProducedArtifact {
    /// Create a produced artifact with no recorded origin.
    #[must_use]
    pub fn new(name: impl Into<ArtifactName>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            origin: None,
        }
    }

    /// Record where the content came from.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Compute the BLAKE3 hex checksum of artifact content.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Validate an artifact before it is written and build its record.
fn prepare_record(
    artifact: &ProducedArtifact,
    producer: &str,
    default_location: String,
    sequence: u64,
) -> Result<ArtifactRecord, ProtogateError> {
    validate_artifact_name(artifact.name.as_str())?;
    if artifact.content.len() > MAX_ARTIFACT_SIZE {
        return Err(ProtogateError::IoError(format!(
            "Artifact '{}' is {} bytes (max {})",
            artifact.name,
            artifact.content.len(),
            MAX_ARTIFACT_SIZE
        )));
    }

    Ok(ArtifactRecord {
        name: artifact.name.clone(),
        location: artifact.origin.clone().unwrap_or(default_location),
        checksum: checksum(&artifact.content),
        producer: producer.to_string(),
        consumers: BTreeSet::new(),
        sequence,
        size: artifact.content.len() as u64,
    })
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Common interface for artifact stores.
pub trait ArtifactStore {
    /// Write a new artifact. Fails with `ArtifactWriteConflict` if the name exists.
    fn put(
        &mut self,
        artifact: ProducedArtifact,
        producer: &str,
    ) -> Result<ArtifactRecord, ProtogateError>;

    /// Read an artifact. Fails with `ArtifactNotFound` if absent.
    fn get(&self, name: &ArtifactName) -> Result<StoredArtifact, ProtogateError>;

    /// Read only the metadata of an artifact.
    fn record(&self, name: &ArtifactName) -> Result<Option<ArtifactRecord>, ProtogateError>;

    /// Record that `consumer` read the artifact.
    fn add_consumer(&mut self, name: &ArtifactName, consumer: &str) -> Result<(), ProtogateError>;

    /// All artifact records, ordered by name.
    fn records(&self) -> Result<Vec<ArtifactRecord>, ProtogateError>;

    /// Check if an artifact exists.
    fn contains(&self, name: &ArtifactName) -> Result<bool, ProtogateError> {
        Ok(self.record(name)?.is_some())
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory artifact store (fast, volatile).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: BTreeMap<ArtifactName, StoredArtifact>,
    next_sequence: u64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(
        &mut self,
        artifact: ProducedArtifact,
        producer: &str,
    ) -> Result<ArtifactRecord, ProtogateError> {
        if self.artifacts.contains_key(&artifact.name) {
            return Err(ProtogateError::ArtifactWriteConflict(artifact.name));
        }

        let location = format!("memory://{}", artifact.name);
        let record = prepare_record(&artifact, producer, location, self.next_sequence)?;
        self.next_sequence = self.next_sequence.saturating_add(1);

        self.artifacts.insert(
            artifact.name,
            StoredArtifact {
                record: record.clone(),
                content: artifact.content,
            },
        );
        Ok(record)
    }

    fn get(&self, name: &ArtifactName) -> Result<StoredArtifact, ProtogateError> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| ProtogateError::ArtifactNotFound(name.clone()))
    }

    fn record(&self, name: &ArtifactName) -> Result<Option<ArtifactRecord>, ProtogateError> {
        Ok(self.artifacts.get(name).map(|a| a.record.clone()))
    }

    fn add_consumer(&mut self, name: &ArtifactName, consumer: &str) -> Result<(), ProtogateError> {
        let artifact = self
            .artifacts
            .get_mut(name)
            .ok_or_else(|| ProtogateError::ArtifactNotFound(name.clone()))?;
        artifact.record.consumers.insert(consumer.to_string());
        Ok(())
    }

    fn records(&self) -> Result<Vec<ArtifactRecord>, ProtogateError> {
        Ok(self.artifacts.values().map(|a| a.record.clone()).collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_records_checksum_and_sequence() {
        let mut store = MemoryStore::new();
        let first = store
            .put(ProducedArtifact::new("coverage_pct", "0.82"), "audit")
            .expect("put");
        let second = store
            .put(ProducedArtifact::new("lint.json", "{}"), "audit")
            .expect("put");

        assert_eq!(first.checksum, checksum(b"0.82"));
        assert_eq!(first.location, "memory://coverage_pct");
        assert_eq!(first.size, 4);
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn second_write_is_a_conflict() {
        let mut store = MemoryStore::new();
        store
            .put(ProducedArtifact::new("report", "a"), "p1")
            .expect("put");
        let result = store.put(ProducedArtifact::new("report", "b"), "p2");

        assert!(matches!(
            result,
            Err(ProtogateError::ArtifactWriteConflict(name)) if name.as_str() == "report"
        ));
        // original content untouched
        let stored = store.get(&ArtifactName::new("report")).expect("get");
        assert_eq!(stored.content, b"a");
        assert_eq!(stored.record.producer, "p1");
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let store = MemoryStore::new();
        let result = store.get(&ArtifactName::new("absent"));
        assert!(matches!(result, Err(ProtogateError::ArtifactNotFound(_))));
        assert!(!store.contains(&ArtifactName::new("absent")).expect("contains"));
    }

    #[test]
    fn consumers_accumulate() {
        let mut store = MemoryStore::new();
        let name = ArtifactName::new("design.md");
        store
            .put(ProducedArtifact::new(name.clone(), "# design"), "design")
            .expect("put");
        store.add_consumer(&name, "audit").expect("consume");
        store.add_consumer(&name, "closure").expect("consume");
        store.add_consumer(&name, "audit").expect("consume");

        let record = store.record(&name).expect("record").expect("exists");
        let consumers: Vec<_> = record.consumers.iter().map(String::as_str).collect();
        assert_eq!(consumers, vec!["audit", "closure"]);
    }

    #[test]
    fn origin_overrides_location() {
        let mut store = MemoryStore::new();
        let record = store
            .put(
                ProducedArtifact::new("coverage_pct", "0.9").with_origin("reports/cov.txt"),
                "audit",
            )
            .expect("put");
        assert_eq!(record.location, "reports/cov.txt");
    }

    #[test]
    fn verify_detects_tampering() {
        let mut store = MemoryStore::new();
        store
            .put(ProducedArtifact::new("a", "original"), "p")
            .expect("put");
        let mut stored = store.get(&ArtifactName::new("a")).expect("get");
        assert!(stored.verify().is_ok());

        stored.content = b"tampered".to_vec();
        assert!(stored.verify().is_err());
    }

    #[test]
    fn rejects_invalid_names() {
        let mut store = MemoryStore::new();
        let result = store.put(ProducedArtifact::new("", "x"), "p");
        assert!(matches!(result, Err(ProtogateError::InvalidDefinition(_))));
        let result = store.put(ProducedArtifact::new("a:b", "x"), "p");
        assert!(matches!(result, Err(ProtogateError::InvalidDefinition(_))));
        assert!(store.is_empty());
    }
}
