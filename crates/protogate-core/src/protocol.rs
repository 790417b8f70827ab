//! # Protocol Definitions
//!
//! A protocol is a concrete instruction set: what it consumes, what it
//! produces and which gates guard its output. Protocols are immutable once
//! loaded into a registry.

use crate::gate::Gate;
use crate::types::{validate_artifact_name, validate_name};
use crate::{ArtifactName, ProtocolId, ProtogateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A loaded protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    id: ProtocolId,
    version: String,
    requires: BTreeSet<ArtifactName>,
    produces: BTreeSet<ArtifactName>,
    gates: Vec<Gate>,
}

impl Protocol {
    /// Create a protocol with no dependencies, outputs or gates.
    #[must_use]
    pub fn new(id: impl Into<ProtocolId>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            requires: BTreeSet::new(),
            produces: BTreeSet::new(),
            gates: Vec::new(),
        }
    }

    /// Declare a required input artifact.
    #[must_use]
    pub fn requiring(mut self, artifact: impl Into<ArtifactName>) -> Self {
        self.requires.insert(artifact.into());
        self
    }

    /// Declare a produced artifact.
    #[must_use]
    pub fn producing(mut self, artifact: impl Into<ArtifactName>) -> Self {
        self.produces.insert(artifact.into());
        self
    }

    /// Attach a gate evaluated after the protocol runs.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    #[must_use]
    pub fn id(&self) -> &ProtocolId {
        &self.id
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn requires(&self) -> &BTreeSet<ArtifactName> {
        &self.requires
    }

    #[must_use]
    pub fn produces(&self) -> &BTreeSet<ArtifactName> {
        &self.produces
    }

    #[must_use]
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Validate identifiers, artifact names and gates.
    pub fn validate(&self) -> Result<(), ProtogateError> {
        validate_name("protocol", self.id.as_str())?;
        if self.version.trim().is_empty() {
            return Err(ProtogateError::InvalidDefinition(format!(
                "protocol '{}' has no version",
                self.id
            )));
        }
        for artifact in self.requires.iter().chain(&self.produces) {
            validate_artifact_name(artifact.as_str())?;
        }
        if let Some(both) = self.requires.intersection(&self.produces).next() {
            return Err(ProtogateError::InvalidDefinition(format!(
                "protocol '{}' both requires and produces '{}'",
                self.id, both
            )));
        }
        for gate in &self.gates {
            gate.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Criterion;

    #[test]
    fn builder_collects_declarations() {
        let protocol = Protocol::new("security-audit", "2.1.0")
            .requiring("design.md")
            .producing("findings.json")
            .with_gate(Gate::new("No Criticals").with_criterion(Criterion::new(
                "no critical findings",
                "findings.json:critical_clear",
            )));

        assert_eq!(protocol.id().as_str(), "security-audit");
        assert!(protocol.requires().contains(&ArtifactName::new("design.md")));
        assert!(protocol.produces().contains(&ArtifactName::new("findings.json")));
        assert_eq!(protocol.gates().len(), 1);
        assert!(protocol.validate().is_ok());
    }

    #[test]
    fn self_dependency_is_invalid() {
        let protocol = Protocol::new("loop", "1").requiring("x").producing("x");
        assert!(matches!(
            protocol.validate(),
            Err(ProtogateError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn blank_version_is_invalid() {
        assert!(Protocol::new("p", " ").validate().is_err());
    }
}
