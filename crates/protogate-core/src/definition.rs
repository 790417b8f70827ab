//! # Pipeline Definitions
//!
//! Declarative, serde-deserializable description of protocols, modes,
//! phases and gates. The core never parses a file format itself; callers
//! deserialize a [`PipelineDefinition`] (from TOML, JSON, ...) and
//! [`compile`](PipelineDefinition::compile) it into a validated [`Pipeline`].

use crate::gate::Gate;
use crate::orchestrator::{Phase, Pipeline};
use crate::protocol::Protocol;
use crate::registry::ProtocolRegistry;
use crate::{ModeName, ProtogateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A protocol as written in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub gates: Vec<Gate>,
}

/// A mode registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDefinition {
    pub name: String,
    pub protocol: String,
    /// Append this mode to another mode's fallback list.
    #[serde(default)]
    pub fallback_of: Option<String>,
}

/// A phase as written in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub name: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub gates: Vec<Gate>,
    /// Artifact name → location.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// A complete pipeline definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Mode tried last for every resolution.
    #[serde(default)]
    pub generic: Option<String>,
    #[serde(default)]
    pub protocols: Vec<ProtocolDefinition>,
    #[serde(default)]
    pub modes: Vec<ModeDefinition>,
    #[serde(default)]
    pub phases: Vec<PhaseDefinition>,
}

impl ProtocolDefinition {
    fn to_protocol(&self) -> Protocol {
        let mut protocol = Protocol::new(self.id.as_str(), self.version.as_str());
        for artifact in &self.requires {
            protocol = protocol.requiring(artifact.as_str());
        }
        for artifact in &self.produces {
            protocol = protocol.producing(artifact.as_str());
        }
        for gate in &self.gates {
            protocol = protocol.with_gate(gate.clone());
        }
        protocol
    }
}

impl PhaseDefinition {
    fn to_phase(&self) -> Phase {
        let mut phase = Phase::new(self.name.as_str());
        if let Some(mode) = &self.mode {
            phase = phase.with_mode(mode.as_str());
        }
        for gate in &self.gates {
            phase = phase.with_gate(gate.clone());
        }
        for (artifact, location) in &self.outputs {
            phase = phase.with_output(artifact.as_str(), location.as_str());
        }
        phase
    }
}

impl PipelineDefinition {
    /// Build the registry and phases, validating everything.
    pub fn compile(&self) -> Result<Pipeline, ProtogateError> {
        let mut builder = ProtocolRegistry::builder();

        for protocol in &self.protocols {
            builder.load(protocol.to_protocol())?;
        }
        for mode in &self.modes {
            builder.register(
                mode.name.as_str(),
                mode.protocol.as_str(),
                mode.fallback_of.as_deref().map(ModeName::from),
            )?;
        }
        if let Some(generic) = &self.generic {
            builder.generic(generic.as_str());
        }

        let registry = builder.build()?;
        let phases = self.phases.iter().map(PhaseDefinition::to_phase).collect();
        let pipeline = Pipeline::new(registry, phases)?;

        tracing::debug!(
            protocols = self.protocols.len(),
            modes = self.modes.len(),
            phases = self.phases.len(),
            "pipeline compiled"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{Criterion, FailurePolicy, PassThreshold};
    use crate::Score;

    fn definition() -> PipelineDefinition {
        PipelineDefinition {
            generic: Some("generic".to_string()),
            protocols: vec![ProtocolDefinition {
                id: "generic".to_string(),
                version: "1.0.0".to_string(),
                requires: Vec::new(),
                produces: vec!["coverage_pct".to_string()],
                gates: vec![
                    Gate::new("Coverage Gate")
                        .with_criterion(Criterion::new("line coverage", "coverage_pct"))
                        .with_threshold(PassThreshold::Minimum(Score::from_percent(80))),
                ],
            }],
            modes: vec![ModeDefinition {
                name: "comprehensive".to_string(),
                protocol: "comprehensive".to_string(),
                fallback_of: None,
            }],
            phases: vec![PhaseDefinition {
                name: "audit".to_string(),
                mode: Some("comprehensive".to_string()),
                gates: Vec::new(),
                outputs: BTreeMap::new(),
            }],
        }
    }

    #[test]
    fn compiles_into_pipeline() {
        let pipeline = definition().compile().expect("compile");
        assert_eq!(pipeline.phases().len(), 1);

        let resolution = pipeline.registry().resolve("comprehensive");
        assert_eq!(resolution.resolved.map(|p| p.0), Some("generic".to_string()));

        let gate = pipeline.gate("Coverage Gate").expect("gate");
        assert_eq!(gate.policy, FailurePolicy::Halt);
    }

    #[test]
    fn gate_without_criteria_is_rejected() {
        let mut def = definition();
        def.protocols[0].gates.push(Gate::new("Empty"));
        assert!(matches!(
            def.compile(),
            Err(ProtogateError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let mut def = definition();
        def.phases.clear();
        assert!(def.compile().is_err());
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "protocols": [{
                "id": "generic",
                "version": "1",
                "gates": [{
                    "name": "Tests Gate",
                    "policy": "waiver-eligible",
                    "criteria": [{ "description": "suite green", "evidence": "tests" }]
                }]
            }],
            "phases": [{ "name": "verify", "mode": "generic" }]
        }"#;
        let def: PipelineDefinition = serde_json::from_str(json).expect("parse");
        let pipeline = def.compile().expect("compile");
        let gate = pipeline.gate("Tests Gate").expect("gate");
        assert_eq!(gate.policy, FailurePolicy::WaiverEligible);
        assert_eq!(gate.threshold, PassThreshold::AllTrue);
    }
}
