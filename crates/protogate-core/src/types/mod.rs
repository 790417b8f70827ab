//! # Core Type Definitions
//!
//! This module contains the identifier types shared by every Protogate
//! component and the single error type:
//! - Names (`ModeName`, `ProtocolId`, `ArtifactName`)
//! - Name validation
//! - Error types (`ProtogateError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers:
//! - Are plain strings wrapped in newtypes (no interning, no hashing)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use crate::primitives::{EVIDENCE_FIELD_SEPARATOR, MAX_NAME_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// A requested category of review or process (e.g. `comprehensive`).
    /// Modes are mapped to protocols by the registry.
    ModeName
}

string_id! {
    /// Identifier of a concrete protocol (instruction set).
    ProtocolId
}

string_id! {
    /// Name of an evidence artifact in an artifact store.
    ArtifactName
}

/// Validate a user-supplied name.
///
/// A name is valid if it is non-empty, has no surrounding whitespace,
/// contains no control characters and fits within `MAX_NAME_LENGTH` bytes.
pub fn validate_name(kind: &str, name: &str) -> Result<(), ProtogateError> {
    if name.is_empty() {
        return Err(ProtogateError::InvalidDefinition(format!(
            "{} name is empty",
            kind
        )));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ProtogateError::InvalidDefinition(format!(
            "{} name exceeds {} bytes",
            kind, MAX_NAME_LENGTH
        )));
    }
    if name.trim() != name || name.chars().any(char::is_control) {
        return Err(ProtogateError::InvalidDefinition(format!(
            "{} name '{}' contains surrounding whitespace or control characters",
            kind,
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Validate an artifact name.
///
/// Artifact names follow [`validate_name`] and must not contain the
/// evidence field separator, otherwise the artifact could never be
/// addressed as a whole from an evidence key.
pub fn validate_artifact_name(name: &str) -> Result<(), ProtogateError> {
    validate_name("artifact", name)?;
    if name.contains(EVIDENCE_FIELD_SEPARATOR) {
        return Err(ProtogateError::InvalidDefinition(format!(
            "artifact name '{}' contains the field separator '{}'",
            name, EVIDENCE_FIELD_SEPARATOR
        )));
    }
    Ok(())
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Protogate system.
///
/// - No silent failures
/// - Use `Result<T, ProtogateError>` for fallible operations
/// - Routing, evidence and gate failures are captured in the execution record;
///   this type is how they surface to callers
#[derive(Debug, Error)]
pub enum ProtogateError {
    /// No candidate protocol in the fallback chain is loaded.
    #[error("Unresolved mode '{mode}' (tried {} candidate(s))", .tried.len())]
    UnresolvedMode {
        mode: ModeName,
        tried: Vec<ProtocolId>,
    },

    /// A required evidence artifact was absent.
    #[error("Missing evidence: {0}")]
    MissingEvidence(ArtifactName),

    /// The requested artifact does not exist in the store.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactName),

    /// A second write to an existing artifact name.
    #[error("Artifact already written: {0}")]
    ArtifactWriteConflict(ArtifactName),

    /// A gate's criteria were not satisfied and no waiver applied.
    #[error("Gate '{gate}' failed: {rationale}")]
    GateFailure { gate: String, rationale: String },

    /// A supplied waiver lacks a justification or approver.
    #[error("Waiver for gate '{gate}' rejected: {reason}")]
    WaiverRejected { gate: String, reason: String },

    /// A protocol step reported a failure.
    #[error("Step failed in phase '{phase}': {message}")]
    StepFailed { phase: String, message: String },

    /// A pipeline, protocol or gate definition is malformed.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// The execution record is halted or completed and cannot advance.
    #[error("Run already terminated")]
    RunTerminated,

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
