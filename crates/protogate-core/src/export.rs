//! # Record Export Module
//!
//! Canonical, checksummed binary form of an [`ExecutionRecord`] for audit.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [RecordHeader (postcard)] [ExecutionRecord (postcard)]
//! ```
//!
//! The header carries a BLAKE3 checksum of the record bytes; import
//! recomputes it and rejects any mismatch. JSON output is provided for
//! human review and is not verified.

use crate::ProtogateError;
use crate::primitives::{MAX_IMPORT_PHASES, RECORD_FORMAT_VERSION, RECORD_MAGIC};
use crate::record::ExecutionRecord;
use serde::{Deserialize, Serialize};

/// Header for exported records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
    /// Number of phase entries in the record.
    pub phase_count: u64,
    /// BLAKE3 hex digest of the postcard-encoded record.
    pub checksum: String,
}

impl RecordHeader {
    #[must_use]
    pub fn new(phase_count: u64, checksum: String) -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: RECORD_FORMAT_VERSION,
            phase_count,
            checksum,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), ProtogateError> {
        if self.magic != RECORD_MAGIC {
            return Err(ProtogateError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != RECORD_FORMAT_VERSION {
            return Err(ProtogateError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

fn encode(record: &ExecutionRecord) -> Result<Vec<u8>, ProtogateError> {
    postcard::to_allocvec(record)
        .map_err(|e| ProtogateError::SerializationError(format!("Record: {}", e)))
}

/// BLAKE3 hex checksum of a record's canonical encoding.
pub fn record_checksum(record: &ExecutionRecord) -> Result<String, ProtogateError> {
    Ok(blake3::hash(&encode(record)?).to_hex().to_string())
}

/// Export a record to the canonical binary format.
pub fn export_record(record: &ExecutionRecord) -> Result<Vec<u8>, ProtogateError> {
    let data = encode(record)?;
    let header = RecordHeader::new(
        record.entries().len() as u64,
        blake3::hash(&data).to_hex().to_string(),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| ProtogateError::SerializationError(format!("Header: {}", e)))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| ProtogateError::SerializationError("Header too large".to_string()))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data.len());
    result.extend_from_slice(&header_len.to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data);
    Ok(result)
}

/// Read and validate the header of an exported record.
pub fn read_header(data: &[u8]) -> Result<(RecordHeader, &[u8]), ProtogateError> {
    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| ProtogateError::DeserializationError("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(ProtogateError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: RecordHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| ProtogateError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;

    if header.phase_count > MAX_IMPORT_PHASES {
        return Err(ProtogateError::DeserializationError(format!(
            "Phase count {} exceeds maximum allowed {}",
            header.phase_count, MAX_IMPORT_PHASES
        )));
    }
    Ok((header, body))
}

/// Import and verify an exported record.
pub fn import_record(data: &[u8]) -> Result<ExecutionRecord, ProtogateError> {
    let (header, body) = read_header(data)?;

    let computed = blake3::hash(body).to_hex().to_string();
    if computed != header.checksum {
        return Err(ProtogateError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let record: ExecutionRecord = postcard::from_bytes(body)
        .map_err(|e| ProtogateError::DeserializationError(format!("Record: {}", e)))?;

    if record.entries().len() as u64 != header.phase_count {
        return Err(ProtogateError::DeserializationError(
            "Phase count mismatch".to_string(),
        ));
    }
    Ok(record)
}

/// Render a record as pretty JSON.
pub fn record_to_json(record: &ExecutionRecord) -> Result<String, ProtogateError> {
    serde_json::to_string_pretty(record)
        .map_err(|e| ProtogateError::SerializationError(format!("Record JSON: {}", e)))
}
