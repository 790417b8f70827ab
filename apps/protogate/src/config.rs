//! # Configuration Loading
//!
//! Reads pipeline definitions and waiver files (TOML) and inline evidence
//! arguments. Every input file is path-validated and size-checked before
//! it is read.

use protogate_core::{
    EvidenceValue, Pipeline, PipelineDefinition, ProtogateError, Waiver, WaiverBook,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a pipeline definition or waiver file (1 MB).
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum size of an exported record accepted by `verify` (100 MB).
pub const MAX_RECORD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ProtogateError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ProtogateError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ProtogateError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it is a regular file.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, ProtogateError> {
    let canonical = path.canonicalize().map_err(|e| {
        ProtogateError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ProtogateError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
pub fn validate_output_path(path: &Path) -> Result<PathBuf, ProtogateError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        ProtogateError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(ProtogateError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| ProtogateError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a validated, size-limited text file.
fn read_config_file(path: &Path) -> Result<(PathBuf, String), ProtogateError> {
    let canonical = validate_file_path(path)?;
    validate_file_size(&canonical, MAX_CONFIG_FILE_SIZE)?;
    let content = std::fs::read_to_string(&canonical)
        .map_err(|e| ProtogateError::IoError(format!("Read '{}': {}", path.display(), e)))?;
    Ok((canonical, content))
}

// =============================================================================
// PIPELINE DEFINITIONS
// =============================================================================

/// Parse a pipeline definition from TOML text.
pub fn parse_definition(text: &str) -> Result<PipelineDefinition, ProtogateError> {
    toml::from_str(text)
        .map_err(|e| ProtogateError::DeserializationError(format!("Pipeline definition: {}", e)))
}

/// Load a pipeline definition file.
pub fn load_definition(path: &Path) -> Result<PipelineDefinition, ProtogateError> {
    let (canonical, text) = read_config_file(path)?;
    tracing::debug!(path = %canonical.display(), "loading pipeline definition");
    parse_definition(&text)
}

/// Load and compile a pipeline definition file.
pub fn load_pipeline(path: &Path) -> Result<Pipeline, ProtogateError> {
    load_definition(path)?.compile()
}

// =============================================================================
// WAIVERS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct WaiverFile {
    #[serde(default)]
    waivers: Vec<Waiver>,
}

/// Parse waivers from TOML text (`[[waivers]]` entries).
///
/// Incomplete waivers are kept; the orchestrator rejects them when they
/// are consulted, so the rejection is recorded in the run.
pub fn parse_waivers(text: &str) -> Result<WaiverBook, ProtogateError> {
    let file: WaiverFile = toml::from_str(text)
        .map_err(|e| ProtogateError::DeserializationError(format!("Waivers: {}", e)))?;
    Ok(file.waivers.into_iter().collect())
}

/// Load a waiver file.
pub fn load_waivers(path: &Path) -> Result<WaiverBook, ProtogateError> {
    let (_, text) = read_config_file(path)?;
    let book = parse_waivers(&text)?;
    tracing::debug!(waivers = book.len(), "waivers loaded");
    Ok(book)
}

// =============================================================================
// INLINE EVIDENCE
// =============================================================================

/// Parse a `key=value` evidence argument.
pub fn parse_evidence_arg(arg: &str) -> Result<(String, EvidenceValue), ProtogateError> {
    let (key, value) = arg.split_once('=').ok_or_else(|| {
        ProtogateError::InvalidDefinition(format!("evidence '{}' is not key=value", arg))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ProtogateError::InvalidDefinition(format!(
            "evidence '{}' has an empty key",
            arg
        )));
    }
    Ok((key.to_string(), EvidenceValue::parse_scalar(value)))
}
