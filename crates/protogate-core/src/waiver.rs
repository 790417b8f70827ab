//! # Waivers
//!
//! Explicit overrides for failed `waiver-eligible` gates.
//!
//! A waiver is only honored when it names a justification and an approver.
//! An absent waiver and a rejected waiver both leave the gate failed.

use crate::ProtogateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A waiver supplied by an external caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiver {
    /// Name of the gate being waived.
    pub gate: String,
    /// Why the failure is acceptable.
    #[serde(default)]
    pub justification: String,
    /// Who approved the waiver.
    #[serde(default)]
    pub approver: String,
}

impl Waiver {
    /// Create a waiver.
    #[must_use]
    pub fn new(
        gate: impl Into<String>,
        justification: impl Into<String>,
        approver: impl Into<String>,
    ) -> Self {
        Self {
            gate: gate.into(),
            justification: justification.into(),
            approver: approver.into(),
        }
    }

    /// Check that the waiver carries a justification and an approver.
    pub fn validate(&self) -> Result<(), ProtogateError> {
        let reason = if self.justification.trim().is_empty() {
            "missing justification"
        } else if self.approver.trim().is_empty() {
            "missing approver"
        } else {
            return Ok(());
        };
        Err(ProtogateError::WaiverRejected {
            gate: self.gate.clone(),
            reason: reason.to_string(),
        })
    }
}

/// Waivers keyed by gate name.
///
/// A later waiver for the same gate replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaiverBook {
    waivers: BTreeMap<String, Waiver>,
}

impl WaiverBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waiver.
    pub fn insert(&mut self, waiver: Waiver) {
        self.waivers.insert(waiver.gate.clone(), waiver);
    }

    /// Builder form of [`WaiverBook::insert`].
    #[must_use]
    pub fn with(mut self, waiver: Waiver) -> Self {
        self.insert(waiver);
        self
    }

    /// Look up the waiver for a gate.
    #[must_use]
    pub fn get(&self, gate: &str) -> Option<&Waiver> {
        self.waivers.get(gate)
    }

    /// Number of waivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waivers.len()
    }

    /// Check if the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waivers.is_empty()
    }
}

impl FromIterator<Waiver> for WaiverBook {
    fn from_iter<I: IntoIterator<Item = Waiver>>(iter: I) -> Self {
        let mut book = Self::new();
        for waiver in iter {
            book.insert(waiver);
        }
        book
    }
}

/// A waiver that was honored during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedWaiver {
    pub gate: String,
    pub justification: String,
    pub approver: String,
}

impl From<&Waiver> for AppliedWaiver {
    fn from(waiver: &Waiver) -> Self {
        Self {
            gate: waiver.gate.clone(),
            justification: waiver.justification.clone(),
            approver: waiver.approver.clone(),
        }
    }
}
