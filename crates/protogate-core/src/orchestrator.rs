//! # Orchestrator
//!
//! Sequences routing, external step execution and gate evaluation across
//! strictly ordered phases.
//!
//! ## Phase Procedure
//!
//! For phase `i`:
//! 1. Resolve the phase mode (if any) through the [`Router`]
//! 2. Check the resolved protocol's required artifacts exist
//! 3. Run the external step ([`StepExecutor`]) and write its artifacts
//! 4. Collect evidence and evaluate every gate: the phase's own gates,
//!    then the protocol's
//! 5. Halt on the first failing gate that is not validly waived,
//!    otherwise advance to `i + 1`
//!
//! A halted or completed record is frozen. [`Orchestrator::resuming`]
//! starts a new record at the first phase a previous run did not complete.

use crate::evidence::{ArtifactRef, Evidence};
use crate::gate::{FailurePolicy, Gate, GateEvaluator, GateResult};
use crate::journal::{RunEvent, RunJournal};
use crate::protocol::Protocol;
use crate::record::{ExecutionRecord, HaltReason, PhaseEntry, RunState, RunWarning};
use crate::registry::ProtocolRegistry;
use crate::router::Router;
use crate::storage::{ArtifactStore, ProducedArtifact};
use crate::types::{validate_artifact_name, validate_name};
use crate::waiver::{AppliedWaiver, WaiverBook};
use crate::{ArtifactName, ModeName, ProtogateError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PIPELINE
// =============================================================================

/// One phase of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    name: String,
    mode: Option<ModeName>,
    gates: Vec<Gate>,
    /// Artifact name → location the step should read or write it from.
    outputs: BTreeMap<ArtifactName, String>,
}

impl Phase {
    /// Create a phase with no mode, gates or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
            gates: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Route this phase through a mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<ModeName>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Add a phase-level gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Declare an output location.
    #[must_use]
    pub fn with_output(
        mut self,
        artifact: impl Into<ArtifactName>,
        location: impl Into<String>,
    ) -> Self {
        self.outputs.insert(artifact.into(), location.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mode(&self) -> Option<&ModeName> {
        self.mode.as_ref()
    }

    #[must_use]
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<ArtifactName, String> {
        &self.outputs
    }

    fn validate(&self) -> Result<(), ProtogateError> {
        validate_name("phase", &self.name)?;
        if let Some(mode) = &self.mode {
            validate_name("mode", mode.as_str())?;
        }
        let mut seen = BTreeSet::new();
        for gate in &self.gates {
            gate.validate()?;
            if !seen.insert(gate.name.as_str()) {
                return Err(ProtogateError::InvalidDefinition(format!(
                    "phase '{}' declares gate '{}' twice",
                    self.name, gate.name
                )));
            }
        }
        for artifact in self.outputs.keys() {
            validate_artifact_name(artifact.as_str())?;
        }
        Ok(())
    }
}

/// A validated registry plus its ordered phases.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: ProtocolRegistry,
    phases: Vec<Phase>,
}

impl Pipeline {
    /// Create a pipeline. Phase names must be unique and there must be at
    /// least one phase.
    pub fn new(registry: ProtocolRegistry, phases: Vec<Phase>) -> Result<Self, ProtogateError> {
        if phases.is_empty() {
            return Err(ProtogateError::InvalidDefinition(
                "pipeline has no phases".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for phase in &phases {
            phase.validate()?;
            if !seen.insert(phase.name.as_str()) {
                return Err(ProtogateError::InvalidDefinition(format!(
                    "phase '{}' declared twice",
                    phase.name
                )));
            }
        }
        Ok(Self { registry, phases })
    }

    #[must_use]
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Look up a phase by name.
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Find a gate by name: phase gates first (in phase order), then
    /// protocol gates (in protocol id order).
    #[must_use]
    pub fn gate(&self, name: &str) -> Option<&Gate> {
        self.phases
            .iter()
            .flat_map(|p| p.gates.iter())
            .chain(self.registry.protocols().flat_map(|p| p.gates().iter()))
            .find(|g| g.name == name)
    }
}

// =============================================================================
// STEP EXECUTION
// =============================================================================

/// What an external step sees.
pub struct StepContext<'a> {
    /// Position of the phase in the pipeline.
    pub index: usize,
    pub phase: &'a Phase,
    /// The resolved protocol, `None` for phases without a mode.
    pub protocol: Option<&'a Protocol>,
    /// Read access to artifacts written so far.
    pub store: &'a dyn ArtifactStore,
}

/// The opaque, external work done by a phase.
pub trait StepExecutor {
    /// Run the step and return the artifacts it produced.
    fn execute(&mut self, ctx: &StepContext<'_>) -> Result<Vec<ProducedArtifact>, ProtogateError>;
}

impl<F> StepExecutor for F
where
    F: FnMut(&StepContext<'_>) -> Result<Vec<ProducedArtifact>, ProtogateError>,
{
    fn execute(&mut self, ctx: &StepContext<'_>) -> Result<Vec<ProducedArtifact>, ProtogateError> {
        self(ctx)
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Drives one run over a pipeline.
pub struct Orchestrator<'a> {
    pipeline: &'a Pipeline,
    store: &'a mut dyn ArtifactStore,
    executor: &'a mut dyn StepExecutor,
    journal: Option<&'a mut dyn RunJournal>,
    waivers: WaiverBook,
    record: ExecutionRecord,
    journal_failure: Option<String>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator with a fresh record.
    pub fn new(
        pipeline: &'a Pipeline,
        store: &'a mut dyn ArtifactStore,
        executor: &'a mut dyn StepExecutor,
    ) -> Self {
        Self {
            pipeline,
            store,
            executor,
            journal: None,
            waivers: WaiverBook::new(),
            record: ExecutionRecord::new(),
            journal_failure: None,
        }
    }

    /// Append every state change to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: &'a mut dyn RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Waivers consulted for failed `waiver-eligible` gates.
    #[must_use]
    pub fn with_waivers(mut self, waivers: WaiverBook) -> Self {
        self.waivers = waivers;
        self
    }

    /// Start a new record at the first phase `previous` did not complete.
    ///
    /// `previous` is left untouched.
    pub fn resuming(mut self, previous: &ExecutionRecord) -> Result<Self, ProtogateError> {
        let start = previous.resume_point();
        if start > self.pipeline.phases.len() {
            return Err(ProtogateError::InvalidDefinition(format!(
                "previous record completed {} phases but the pipeline has {}",
                start,
                self.pipeline.phases.len()
            )));
        }
        self.record = ExecutionRecord::seeded(start);
        Ok(self)
    }

    /// The record of this run.
    #[must_use]
    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    /// The first journal error of this run, if any.
    #[must_use]
    pub fn journal_failure(&self) -> Option<&str> {
        self.journal_failure.as_deref()
    }

    /// Consume the orchestrator, keeping the record.
    #[must_use]
    pub fn into_record(self) -> ExecutionRecord {
        self.record
    }

    /// Move `Pending` to `Running` at the start phase.
    pub fn start(&mut self) -> Result<RunState, ProtogateError> {
        if self.record.state() != RunState::Pending {
            return Err(ProtogateError::RunTerminated);
        }
        let start = self.record.start_phase();
        let phases = self.pipeline.phases.len();

        tracing::info!(phases, start, "run started");
        self.emit(RunEvent::RunStarted {
            phases,
            start_phase: start,
        });

        if start >= phases {
            self.record.set_state(RunState::Completed);
            self.emit(RunEvent::RunCompleted);
        } else {
            self.record.set_state(RunState::Running { phase: start });
        }
        Ok(self.record.state())
    }

    /// Execute the current phase and advance the state machine.
    ///
    /// Fails with `RunTerminated` once the record is halted or completed.
    /// Halts are recorded, not returned. After a journal failure the
    /// current phase halts and the record is frozen.
    pub fn step(&mut self) -> Result<RunState, ProtogateError> {
        let index = match self.record.state() {
            RunState::Pending => return self.start(),
            RunState::Running { phase } => phase,
            RunState::Halted { .. } | RunState::Completed => {
                return Err(ProtogateError::RunTerminated);
            }
        };

        let pipeline: &'a Pipeline = self.pipeline;
        let Some(phase) = pipeline.phases.get(index) else {
            return Err(ProtogateError::InvalidDefinition(format!(
                "phase index {} out of range",
                index
            )));
        };

        let mut entry = if self.journal_failure.is_some() {
            PhaseEntry::new(index, phase.name.clone())
        } else {
            self.run_phase(index, phase)
        };
        if entry.halt.is_none() {
            if let Some(message) = &self.journal_failure {
                entry.halt = Some(HaltReason::JournalFailure {
                    message: message.clone(),
                });
            }
        }

        match entry.halt.clone() {
            Some(reason) => {
                tracing::warn!(phase = %phase.name, %reason, "run halted");
                self.record.push_entry(entry);
                self.record.set_state(RunState::Halted { phase: index });
                self.emit(RunEvent::RunHalted {
                    index,
                    phase: phase.name.clone(),
                    reason,
                });
            }
            None => {
                tracing::info!(phase = %phase.name, index, "phase completed");
                self.record.push_entry(entry);
                self.emit(RunEvent::PhaseCompleted {
                    index,
                    phase: phase.name.clone(),
                });
                if index + 1 < pipeline.phases.len() {
                    self.record.set_state(RunState::Running { phase: index + 1 });
                } else {
                    tracing::info!("run completed");
                    self.record.set_state(RunState::Completed);
                    self.emit(RunEvent::RunCompleted);
                }
            }
        }

        Ok(self.record.state())
    }

    /// Step until the record is terminal.
    pub fn run(&mut self) -> Result<&ExecutionRecord, ProtogateError> {
        while !self.record.is_terminal() {
            self.step()?;
        }
        Ok(&self.record)
    }

    /// Append an event. The first journal error is kept and the journal
    /// is dropped; the current phase then halts with `JournalFailure`.
    fn emit(&mut self, event: RunEvent) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if let Err(e) = journal.append(&event) {
            tracing::error!(error = %e, "run journal failed");
            self.journal_failure = Some(e.to_string());
            self.journal = None;
        }
    }

    fn run_phase(&mut self, index: usize, phase: &'a Phase) -> PhaseEntry {
        let pipeline: &'a Pipeline = self.pipeline;
        let mut entry = PhaseEntry::new(index, phase.name.clone());

        tracing::info!(phase = %phase.name, index, "phase started");
        self.emit(RunEvent::PhaseStarted {
            index,
            phase: phase.name.clone(),
        });

        // 1. Routing
        let mut protocol: Option<&'a Protocol> = None;
        if let Some(mode) = &phase.mode {
            let resolution = Router::new(&pipeline.registry).resolve(mode.as_str());
            entry.resolution = Some(resolution.clone());
            self.emit(RunEvent::ModeResolved {
                phase: phase.name.clone(),
                resolution: resolution.clone(),
            });

            let Some(resolved) = resolution.resolved.clone() else {
                entry.halt = Some(HaltReason::UnresolvedMode {
                    mode: resolution.requested,
                    tried: resolution.chain,
                });
                return entry;
            };
            if resolution.is_degraded() {
                entry.warnings.push(RunWarning::DegradedResolution {
                    requested: resolution.requested.clone(),
                    resolved: resolved.clone(),
                    chain: resolution.chain.clone(),
                });
            }
            protocol = pipeline.registry.protocol(&resolved);
        }

        let actor = protocol
            .map(|p| p.id().as_str())
            .unwrap_or(phase.name.as_str());

        // 2. Required inputs
        if let Some(protocol) = protocol {
            for artifact in protocol.requires() {
                match self.store.contains(artifact) {
                    Ok(true) => {
                        if let Err(e) = self.store.add_consumer(artifact, actor) {
                            entry.halt = Some(store_failure(e));
                            return entry;
                        }
                    }
                    Ok(false) => {
                        entry.halt = Some(HaltReason::MissingEvidence {
                            artifact: artifact.clone(),
                        });
                        return entry;
                    }
                    Err(e) => {
                        entry.halt = Some(store_failure(e));
                        return entry;
                    }
                }
            }
        }

        // 3. External step
        let produced = {
            let ctx = StepContext {
                index,
                phase,
                protocol,
                store: &*self.store,
            };
            self.executor.execute(&ctx)
        };
        let produced = match produced {
            Ok(produced) => produced,
            Err(e) => {
                entry.halt = Some(HaltReason::StepFailed {
                    message: e.to_string(),
                });
                return entry;
            }
        };

        let mut written = BTreeSet::new();
        for artifact in produced {
            match self.store.put(artifact, actor) {
                Ok(record) => {
                    tracing::debug!(
                        artifact = %record.name,
                        sequence = record.sequence,
                        "artifact written"
                    );
                    written.insert(record.name.clone());
                    entry.artifacts.push(ArtifactRef {
                        name: record.name.clone(),
                        checksum: record.checksum.clone(),
                    });
                    self.emit(RunEvent::ArtifactWritten {
                        phase: phase.name.clone(),
                        record,
                    });
                }
                Err(ProtogateError::ArtifactWriteConflict(artifact)) => {
                    entry.halt = Some(HaltReason::ArtifactWriteConflict { artifact });
                    return entry;
                }
                Err(e) => {
                    entry.halt = Some(store_failure(e));
                    return entry;
                }
            }
        }

        if let Some(protocol) = protocol {
            for artifact in protocol.produces().difference(&written) {
                tracing::warn!(protocol = %protocol.id(), %artifact, "declared output not produced");
                entry.warnings.push(RunWarning::MissingDeclaredOutput {
                    protocol: protocol.id().clone(),
                    artifact: artifact.clone(),
                });
            }
        }

        // 4. Gates
        let gates: Vec<&'a Gate> = phase
            .gates
            .iter()
            .chain(protocol.map(Protocol::gates).unwrap_or_default())
            .collect();

        let keys = gates.iter().copied().flat_map(Gate::evidence_keys);
        let evidence = match Evidence::collect(&*self.store, keys) {
            Ok(evidence) => evidence,
            Err(e) => {
                entry.halt = Some(store_failure(e));
                return entry;
            }
        };

        for gate in &gates {
            let result = GateEvaluator::evaluate(gate, &evidence);
            let read: BTreeSet<&ArtifactName> = result.sources().map(|s| &s.name).collect();
            for artifact in read {
                if let Err(e) = self.store.add_consumer(artifact, actor) {
                    entry.halt = Some(store_failure(e));
                    return entry;
                }
            }
            self.emit(RunEvent::GateEvaluated {
                phase: phase.name.clone(),
                result: result.clone(),
            });
            entry.gate_results.push(result);
        }

        // 5. Failure policy
        let failed: Vec<GateResult> = entry
            .gate_results
            .iter()
            .filter(|r| !r.passed)
            .cloned()
            .collect();
        for result in failed {
            let waiver = match result.policy {
                FailurePolicy::Halt => None,
                FailurePolicy::WaiverEligible => self.waivers.get(&result.gate).cloned(),
            };
            let Some(waiver) = waiver else {
                entry.halt = Some(gate_failure(result));
                return entry;
            };
            match waiver.validate() {
                Ok(()) => {
                    tracing::warn!(
                        gate = %result.gate,
                        approver = %waiver.approver,
                        "gate failure waived"
                    );
                    let applied = AppliedWaiver::from(&waiver);
                    self.emit(RunEvent::WaiverApplied {
                        phase: phase.name.clone(),
                        waiver: applied.clone(),
                    });
                    entry.waivers.push(applied);
                }
                Err(e) => {
                    let reason = match e {
                        ProtogateError::WaiverRejected { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    tracing::warn!(gate = %result.gate, %reason, "waiver rejected");
                    entry.warnings.push(RunWarning::WaiverRejected {
                        gate: result.gate.clone(),
                        reason,
                    });
                    entry.halt = Some(gate_failure(result));
                    return entry;
                }
            }
        }

        entry
    }
}

fn gate_failure(result: GateResult) -> HaltReason {
    HaltReason::GateFailure {
        gate: result.gate,
        rationale: result.rationale,
    }
}

fn store_failure(error: ProtogateError) -> HaltReason {
    HaltReason::StoreFailure {
        message: error.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceValue;
    use crate::gate::{Criterion, PassThreshold};
    use crate::journal::MemoryJournal;
    use crate::storage::MemoryStore;
    use crate::waiver::Waiver;
    use crate::Score;

    fn coverage_gate(policy: FailurePolicy) -> Gate {
        Gate::new("Coverage Gate")
            .with_criterion(Criterion::new("line coverage", "coverage_pct"))
            .with_threshold(PassThreshold::Minimum(Score::from_percent(80)))
            .with_policy(policy)
    }

    fn pipeline(policy: FailurePolicy) -> Pipeline {
        let mut builder = ProtocolRegistry::builder();
        builder
            .load(Protocol::new("generic", "1.0.0").producing("coverage_pct"))
            .expect("load")
            .register("comprehensive", "comprehensive", None)
            .expect("reg")
            .register("generic", "generic", Some("comprehensive".into()))
            .expect("reg");
        let registry = builder.build().expect("build");

        Pipeline::new(
            registry,
            vec![
                Phase::new("audit")
                    .with_mode("comprehensive")
                    .with_gate(coverage_gate(policy)),
                Phase::new("closure"),
            ],
        )
        .expect("pipeline")
    }

    type StepResult = Result<Vec<ProducedArtifact>, ProtogateError>;

    fn coverage(value: &'static str) -> impl FnMut(&StepContext<'_>) -> StepResult {
        move |ctx: &StepContext<'_>| {
            if ctx.phase.name() == "audit" {
                Ok(vec![ProducedArtifact::new("coverage_pct", value)])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn passing_run_completes() {
        let pipeline = pipeline(FailurePolicy::Halt);
        let mut store = MemoryStore::new();
        let mut executor = coverage("0.82");
        let mut journal = MemoryJournal::new();

        let mut orchestrator =
            Orchestrator::new(&pipeline, &mut store, &mut executor).with_journal(&mut journal);
        let record = orchestrator.run().expect("run").clone();
        drop(orchestrator);

        assert_eq!(record.state(), RunState::Completed);
        assert_eq!(record.entries().len(), 2);
        assert!(record.outcome().is_ok());

        let audit = record.phase("audit").expect("audit entry");
        assert!(audit.gate_results[0].passed);
        assert!(matches!(
            audit.warnings.as_slice(),
            [RunWarning::DegradedResolution { .. }]
        ));
        assert_eq!(journal.events().last(), Some(&RunEvent::RunCompleted));

        let stored = store
            .record(&ArtifactName::new("coverage_pct"))
            .expect("record")
            .expect("present");
        assert_eq!(stored.producer, "generic");
        assert!(stored.consumers.contains("generic"));
    }

    #[test]
    fn halt_policy_stops_before_next_phase() {
        let pipeline = pipeline(FailurePolicy::Halt);
        let mut store = MemoryStore::new();
        let mut executor = coverage("0.5");

        let mut orchestrator = Orchestrator::new(&pipeline, &mut store, &mut executor);
        let record = orchestrator.run().expect("run");

        assert_eq!(record.state(), RunState::Halted { phase: 0 });
        assert_eq!(record.entries().len(), 1);
        assert!(record.phase("closure").is_none());
        assert!(matches!(
            record.outcome(),
            Err(ProtogateError::GateFailure { gate, .. }) if gate == "Coverage Gate"
        ));
        assert!(matches!(orchestrator.step(), Err(ProtogateError::RunTerminated)));
    }

    #[test]
    fn valid_waiver_lets_run_continue() {
        let pipeline = pipeline(FailurePolicy::WaiverEligible);
        let mut store = MemoryStore::new();
        let mut executor = coverage("0.5");
        let waivers = WaiverBook::new().with(Waiver::new(
            "Coverage Gate",
            "legacy module excluded",
            "tech lead",
        ));

        let mut orchestrator =
            Orchestrator::new(&pipeline, &mut store, &mut executor).with_waivers(waivers);
        let record = orchestrator.run().expect("run");

        assert_eq!(record.state(), RunState::Completed);
        assert_eq!(record.entries()[0].waivers.len(), 1);
    }

    #[test]
    fn rejected_waiver_is_no_waiver() {
        let pipeline = pipeline(FailurePolicy::WaiverEligible);
        let mut store = MemoryStore::new();
        let mut executor = coverage("0.5");
        let waivers = WaiverBook::new().with(Waiver::new("Coverage Gate", "", "tech lead"));

        let mut orchestrator =
            Orchestrator::new(&pipeline, &mut store, &mut executor).with_waivers(waivers);
        let record = orchestrator.run().expect("run");

        assert_eq!(record.state(), RunState::Halted { phase: 0 });
        assert!(record
            .warnings()
            .any(|w| matches!(w, RunWarning::WaiverRejected { .. })));
    }

    #[test]
    fn step_failure_halts() {
        let pipeline = pipeline(FailurePolicy::Halt);
        let mut store = MemoryStore::new();
        let mut executor = |_: &StepContext<'_>| -> StepResult {
            Err(ProtogateError::IoError("tool crashed".to_string()))
        };

        let mut orchestrator = Orchestrator::new(&pipeline, &mut store, &mut executor);
        let record = orchestrator.run().expect("run");

        assert!(matches!(
            record.entries()[0].halt,
            Some(HaltReason::StepFailed { .. })
        ));
    }

    #[test]
    fn resume_starts_at_first_incomplete_phase() {
        let pipeline = pipeline(FailurePolicy::Halt);
        let mut store = MemoryStore::new();
        let mut first_executor = coverage("0.5");
        let first = {
            let mut orchestrator = Orchestrator::new(&pipeline, &mut store, &mut first_executor);
            orchestrator.run().expect("run").clone()
        };
        assert_eq!(first.resume_point(), 0);

        // A fresh store: the retried step writes coverage again.
        let mut retry_store = MemoryStore::new();
        let mut retry_executor = coverage("0.9");
        let mut orchestrator = Orchestrator::new(&pipeline, &mut retry_store, &mut retry_executor)
            .resuming(&first)
            .expect("resume");
        let second = orchestrator.run().expect("run");

        assert_eq!(second.state(), RunState::Completed);
        assert_eq!(first.state(), RunState::Halted { phase: 0 });
    }

    /// Journal that rejects gate events.
    struct GateRejectingJournal {
        accepted: usize,
    }

    impl RunJournal for GateRejectingJournal {
        fn append(&mut self, event: &RunEvent) -> Result<(), ProtogateError> {
            if matches!(event, RunEvent::GateEvaluated { .. }) {
                return Err(ProtogateError::IoError("disk full".to_string()));
            }
            self.accepted += 1;
            Ok(())
        }
    }

    #[test]
    fn journal_failure_halts_with_recorded_entry() {
        let pipeline = pipeline(FailurePolicy::Halt);
        let mut store = MemoryStore::new();
        let mut executor = coverage("0.95");
        let mut journal = GateRejectingJournal { accepted: 0 };

        let mut orchestrator =
            Orchestrator::new(&pipeline, &mut store, &mut executor).with_journal(&mut journal);
        let record = orchestrator.run().expect("run").clone();

        assert_eq!(record.state(), RunState::Halted { phase: 0 });
        assert_eq!(record.entries().len(), 1);
        let audit = &record.entries()[0];
        assert!(matches!(
            &audit.halt,
            Some(HaltReason::JournalFailure { message }) if message.contains("disk full")
        ));
        assert_eq!(audit.artifacts.len(), 1);
        assert!(audit.gate_results[0].passed);
        assert!(matches!(
            record.outcome(),
            Err(ProtogateError::IoError(_))
        ));
        assert!(
            orchestrator
                .journal_failure()
                .is_some_and(|m| m.contains("disk full"))
        );
        assert!(matches!(orchestrator.step(), Err(ProtogateError::RunTerminated)));
        drop(orchestrator);

        // no event after the failure reached the journal
        assert_eq!(journal.accepted, 4);
        assert!(record.phase("closure").is_none());
    }

    #[test]
    fn pipeline_rejects_duplicate_phases() {
        let registry = ProtocolRegistry::builder().build().expect("build");
        let result = Pipeline::new(registry, vec![Phase::new("a"), Phase::new("a")]);
        assert!(matches!(result, Err(ProtogateError::InvalidDefinition(_))));
    }

    #[test]
    fn inline_evidence_type_is_shared_with_gates() {
        let gate = coverage_gate(FailurePolicy::Halt);
        let evidence = Evidence::new().with("coverage_pct", EvidenceValue::parse_scalar("0.80"));
        assert!(GateEvaluator::evaluate(&gate, &evidence).passed);
    }
}
