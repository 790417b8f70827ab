//! # Evidence Module
//!
//! Typed evidence values read by gate criteria.
//!
//! Evidence comes from two places:
//! - Artifacts in a store (`Evidence::collect`), each item carrying the
//!   artifact name and checksum it was read from
//! - Inline values supplied directly by a caller (`Evidence::insert`)
//!
//! An evidence key is either an artifact name (`coverage_pct`) or an
//! artifact name plus a field path (`coverage.json:totals.line_pct`).
//! JSON artifacts are addressed with dotted paths; CSV artifacts with a
//! column name (the value comes from the last data row).

use crate::primitives::EVIDENCE_FIELD_SEPARATOR;
use crate::storage::{ArtifactStore, StoredArtifact};
use crate::{ArtifactName, ProtogateError, Score};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// EVIDENCE VALUE
// =============================================================================

/// A single observed evidence value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceValue {
    /// Boolean outcome (`true`/`false`, `pass`/`fail`, `yes`/`no`).
    Flag(bool),
    /// Numeric value (fixed-point).
    Number(Score),
    /// Anything else.
    Text(String),
}

impl EvidenceValue {
    /// Interpret a scalar text value.
    ///
    /// Booleans and numbers are recognized; everything else is text.
    #[must_use]
    pub fn parse_scalar(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "pass" | "passed" | "yes" => return Self::Flag(true),
            "false" | "fail" | "failed" | "no" => return Self::Flag(false),
            _ => {}
        }
        match Score::parse(trimmed) {
            Ok(score) => Self::Number(score),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// Convert a JSON value. `null` has no evidence value.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::Flag(*b)),
            serde_json::Value::Number(n) => Some(
                Score::parse(&n.to_string())
                    .map(Self::Number)
                    .unwrap_or_else(|_| Self::Text(n.to_string())),
            ),
            serde_json::Value::String(s) => Some(Self::parse_scalar(s)),
            other => Some(Self::Text(other.to_string())),
        }
    }

    /// Short name of the value kind, used in rationales.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for EvidenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => write!(f, "{:?}", t),
        }
    }
}

// =============================================================================
// EVIDENCE KEY
// =============================================================================

/// A parsed evidence key: artifact plus optional field path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EvidenceKey {
    pub artifact: ArtifactName,
    pub field: Option<String>,
}

impl EvidenceKey {
    /// Parse `artifact` or `artifact:field.path`.
    #[must_use]
    pub fn parse(key: &str) -> Self {
        match key.split_once(EVIDENCE_FIELD_SEPARATOR) {
            Some((artifact, field)) if !field.is_empty() => Self {
                artifact: ArtifactName::new(artifact),
                field: Some(field.to_string()),
            },
            _ => Self {
                artifact: ArtifactName::new(key.trim_end_matches(EVIDENCE_FIELD_SEPARATOR)),
                field: None,
            },
        }
    }
}

// =============================================================================
// EVIDENCE SET
// =============================================================================

/// Reference to the artifact an evidence item was read from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: ArtifactName,
    pub checksum: String,
}

/// One evidence item: a value and, when read from a store, its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    pub value: EvidenceValue,
    pub source: Option<ArtifactRef>,
}

/// Evidence available to gate evaluation, keyed by evidence key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    items: BTreeMap<String, EvidenceItem>,
}

impl Evidence {
    /// Create an empty evidence set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an inline value (no artifact source).
    pub fn insert(&mut self, key: impl Into<String>, value: EvidenceValue) {
        self.items.insert(
            key.into(),
            EvidenceItem {
                value,
                source: None,
            },
        );
    }

    /// Builder form of [`Evidence::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: EvidenceValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up an evidence item.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EvidenceItem> {
        self.items.get(key)
    }

    /// Number of evidence items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if there is no evidence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over evidence keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Collect evidence for the given keys from an artifact store.
    ///
    /// Keys whose artifact is absent, or whose field cannot be extracted,
    /// are left out; gate evaluation reports them as missing evidence.
    /// Every collected artifact is checksum-verified first; a mismatch is
    /// an error, never a silent pass.
    pub fn collect<'k, S: ArtifactStore + ?Sized>(
        store: &S,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> Result<Self, ProtogateError> {
        let mut evidence = Self::new();
        let mut loaded: BTreeMap<ArtifactName, Option<StoredArtifact>> = BTreeMap::new();

        for key in keys {
            if evidence.items.contains_key(key) {
                continue;
            }
            let parsed = EvidenceKey::parse(key);

            if !loaded.contains_key(&parsed.artifact) {
                let artifact = match store.get(&parsed.artifact) {
                    Ok(artifact) => {
                        artifact.verify()?;
                        Some(artifact)
                    }
                    Err(ProtogateError::ArtifactNotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                loaded.insert(parsed.artifact.clone(), artifact);
            }

            let Some(Some(artifact)) = loaded.get(&parsed.artifact) else {
                tracing::debug!(key, "evidence artifact absent");
                continue;
            };

            match extract(artifact, parsed.field.as_deref()) {
                Some(value) => {
                    evidence.items.insert(
                        key.to_string(),
                        EvidenceItem {
                            value,
                            source: Some(ArtifactRef {
                                name: artifact.record.name.clone(),
                                checksum: artifact.record.checksum.clone(),
                            }),
                        },
                    );
                }
                None => tracing::debug!(key, "evidence field not extractable"),
            }
        }

        Ok(evidence)
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Extract a value from artifact content.
fn extract(artifact: &StoredArtifact, field: Option<&str>) -> Option<EvidenceValue> {
    let text = artifact.text()?;

    match field {
        None => match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) if !json.is_object() && !json.is_array() => EvidenceValue::from_json(&json),
            _ => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| EvidenceValue::parse_scalar(trimmed))
            }
        },
        Some(path) if artifact.record.name.as_str().ends_with(".csv") => csv_field(text, path),
        Some(path) => {
            let json: serde_json::Value = serde_json::from_str(text).ok()?;
            let mut current = &json;
            for segment in path.split('.') {
                current = match current {
                    serde_json::Value::Object(map) => map.get(segment)?,
                    serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                    _ => return None,
                };
            }
            EvidenceValue::from_json(current)
        }
    }
}

/// Read `column` from the last data row of a CSV document.
///
/// Quoted cells may contain commas and doubled quotes; a quoted cell
/// spanning several lines is not supported.
fn csv_field(text: &str, column: &str) -> Option<EvidenceValue> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = csv_cells(lines.next()?);
    let index = header.iter().position(|h| h.trim() == column)?;
    let row = csv_cells(lines.last()?);
    let cell = row.get(index)?.trim();
    (!cell.is_empty()).then(|| EvidenceValue::parse_scalar(cell))
}

/// Split one CSV line into unquoted cells.
fn csv_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

// =============================================================================
// TESTS
// =============================================================================
