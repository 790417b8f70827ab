//! # protogate-core
//!
//! The deterministic routing and gate engine for Protogate.
//!
//! This crate resolves requested modes to protocols through explicit
//! fallback chains, evaluates quality gates against checksummed evidence
//! artifacts and sequences both across strictly ordered phases.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is deterministic: `BTreeMap`/`BTreeSet` only, fixed-point scores, no
//!   wall clock, no randomness
//! - Never hides a failure: missing evidence fails its criterion, an
//!   unresolved mode halts the run, a halted record is frozen
//! - Holds no global state: stores, executors and journals are injected
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod definition;
pub mod evidence;
pub mod export;
pub mod gate;
pub mod journal;
pub mod orchestrator;
pub mod primitives;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod router;
pub mod score;
pub mod storage;
pub mod types;
pub mod waiver;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use score::Score;
pub use types::{
    ArtifactName, ModeName, ProtocolId, ProtogateError, validate_artifact_name, validate_name,
};

// =============================================================================
// RE-EXPORTS: Routing
// =============================================================================

pub use protocol::Protocol;
pub use registry::{ModeResolution, ProtocolRegistry, RegistryBuilder, ResolutionOutcome};
pub use router::Router;

// =============================================================================
// RE-EXPORTS: Evidence & Gates
// =============================================================================

pub use evidence::{ArtifactRef, Evidence, EvidenceItem, EvidenceKey, EvidenceValue};
pub use gate::{
    Criterion, CriterionOutcome, CriterionReason, FailurePolicy, Gate, GateEvaluator, GateResult,
    PassThreshold, Predicate,
};
pub use waiver::{AppliedWaiver, Waiver, WaiverBook};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{
    ArtifactRecord, ArtifactStore, MemoryStore, ProducedArtifact, RedbStore, StoredArtifact,
};

// =============================================================================
// RE-EXPORTS: Orchestration
// =============================================================================

pub use definition::{ModeDefinition, PhaseDefinition, PipelineDefinition, ProtocolDefinition};
pub use export::{RecordHeader, export_record, import_record, record_checksum, record_to_json};
pub use journal::{MemoryJournal, RunEvent, RunJournal};
pub use orchestrator::{Orchestrator, Phase, Pipeline, StepContext, StepExecutor};
pub use record::{ExecutionRecord, HaltReason, PhaseEntry, RunState, RunWarning};
