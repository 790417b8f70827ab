//! # Execution Record
//!
//! The append-only audit log of one run.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running(i) → { Halted(i) | Running(i+1) | Completed }
//! ```
//!
//! `Halted` and `Completed` are terminal. A terminal record is frozen:
//! a new attempt starts a new record (see [`ExecutionRecord::resume_point`]).
//! Only the orchestrator mutates a record.

use crate::evidence::ArtifactRef;
use crate::gate::GateResult;
use crate::registry::ModeResolution;
use crate::waiver::AppliedWaiver;
use crate::{ArtifactName, ModeName, ProtocolId, ProtogateError};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// RUN STATE
// =============================================================================

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    #[default]
    Pending,
    Running {
        phase: usize,
    },
    Halted {
        phase: usize,
    },
    Completed,
}

impl RunState {
    /// Check if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted { .. } | Self::Completed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running { phase } => write!(f, "running (phase {})", phase),
            Self::Halted { phase } => write!(f, "halted (phase {})", phase),
            Self::Completed => f.write_str("completed"),
        }
    }
}

// =============================================================================
// HALT REASONS & WARNINGS
// =============================================================================

/// Why a phase halted the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HaltReason {
    UnresolvedMode {
        mode: ModeName,
        tried: Vec<ProtocolId>,
    },
    MissingEvidence {
        artifact: ArtifactName,
    },
    ArtifactWriteConflict {
        artifact: ArtifactName,
    },
    GateFailure {
        gate: String,
        rationale: String,
    },
    StepFailed {
        message: String,
    },
    /// The artifact store failed while the phase was running.
    StoreFailure {
        message: String,
    },
    /// The run journal rejected an event.
    JournalFailure {
        message: String,
    },
}

impl HaltReason {
    /// The error a caller sees for this halt.
    #[must_use]
    pub fn to_error(&self, phase: &str) -> ProtogateError {
        match self {
            Self::UnresolvedMode { mode, tried } => ProtogateError::UnresolvedMode {
                mode: mode.clone(),
                tried: tried.clone(),
            },
            Self::MissingEvidence { artifact } => {
                ProtogateError::MissingEvidence(artifact.clone())
            }
            Self::ArtifactWriteConflict { artifact } => {
                ProtogateError::ArtifactWriteConflict(artifact.clone())
            }
            Self::GateFailure { gate, rationale } => ProtogateError::GateFailure {
                gate: gate.clone(),
                rationale: rationale.clone(),
            },
            Self::StepFailed { message } => ProtogateError::StepFailed {
                phase: phase.to_string(),
                message: message.clone(),
            },
            Self::StoreFailure { message } | Self::JournalFailure { message } => {
                ProtogateError::IoError(message.clone())
            }
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedMode { mode, tried } => {
                write!(f, "unresolved mode '{}' (tried {} candidate(s))", mode, tried.len())
            }
            Self::MissingEvidence { artifact } => write!(f, "missing evidence '{}'", artifact),
            Self::ArtifactWriteConflict { artifact } => {
                write!(f, "artifact '{}' already written", artifact)
            }
            Self::GateFailure { gate, rationale } => write!(f, "gate '{}': {}", gate, rationale),
            Self::StepFailed { message } => write!(f, "step failed: {}", message),
            Self::StoreFailure { message } => write!(f, "store failure: {}", message),
            Self::JournalFailure { message } => write!(f, "journal failure: {}", message),
        }
    }
}

/// A non-fatal condition recorded during a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunWarning {
    /// The requested mode resolved through a fallback.
    DegradedResolution {
        requested: ModeName,
        resolved: ProtocolId,
        chain: Vec<ProtocolId>,
    },
    /// A protocol declared an output its step did not produce.
    MissingDeclaredOutput {
        protocol: ProtocolId,
        artifact: ArtifactName,
    },
    /// A waiver was supplied but did not carry a justification and approver.
    WaiverRejected { gate: String, reason: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DegradedResolution {
                requested,
                resolved,
                chain,
            } => write!(
                f,
                "mode '{}' degraded to '{}' after {} candidate(s)",
                requested,
                resolved,
                chain.len()
            ),
            Self::MissingDeclaredOutput { protocol, artifact } => write!(
                f,
                "protocol '{}' did not produce declared output '{}'",
                protocol, artifact
            ),
            Self::WaiverRejected { gate, reason } => {
                write!(f, "waiver for gate '{}' rejected: {}", gate, reason)
            }
        }
    }
}

// =============================================================================
// PHASE ENTRY
// =============================================================================

/// Everything recorded for one phase of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    /// Position of the phase in the pipeline.
    pub index: usize,
    pub phase: String,
    /// `None` for phases without a mode.
    pub resolution: Option<ModeResolution>,
    /// Artifacts written by the phase's step.
    pub artifacts: Vec<ArtifactRef>,
    pub gate_results: Vec<GateResult>,
    pub waivers: Vec<AppliedWaiver>,
    pub warnings: Vec<RunWarning>,
    pub halt: Option<HaltReason>,
}

impl PhaseEntry {
    pub(crate) fn new(index: usize, phase: impl Into<String>) -> Self {
        Self {
            index,
            phase: phase.into(),
            resolution: None,
            artifacts: Vec::new(),
            gate_results: Vec::new(),
            waivers: Vec::new(),
            warnings: Vec::new(),
            halt: None,
        }
    }

    /// Check if the phase ran to completion.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.halt.is_none()
    }
}

// =============================================================================
// EXECUTION RECORD
// =============================================================================

/// The ordered log of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Index of the first phase this run executes.
    start_phase: usize,
    state: RunState,
    entries: Vec<PhaseEntry>,
}

impl ExecutionRecord {
    /// Create a record for a run starting at the first phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for a run starting at `start_phase`.
    #[must_use]
    pub fn seeded(start_phase: usize) -> Self {
        Self {
            start_phase,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn start_phase(&self) -> usize {
        self.start_phase
    }

    #[must_use]
    pub fn entries(&self) -> &[PhaseEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Look up the entry for a phase by name.
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&PhaseEntry> {
        self.entries.iter().find(|e| e.phase == name)
    }

    /// The entry that halted the run, if any.
    #[must_use]
    pub fn halted_entry(&self) -> Option<&PhaseEntry> {
        self.entries.iter().find(|e| e.halt.is_some())
    }

    /// All warnings, in phase order.
    pub fn warnings(&self) -> impl Iterator<Item = &RunWarning> {
        self.entries.iter().flat_map(|e| e.warnings.iter())
    }

    /// Index of the first phase this record did not complete.
    #[must_use]
    pub fn resume_point(&self) -> usize {
        self.start_phase + self.entries.iter().filter(|e| e.is_completed()).count()
    }

    /// `Err` with the halt reason if the run halted, `Ok` otherwise.
    pub fn outcome(&self) -> Result<(), ProtogateError> {
        match self.halted_entry() {
            Some(entry) => match &entry.halt {
                Some(reason) => Err(reason.to_error(&entry.phase)),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub(crate) fn push_entry(&mut self, entry: PhaseEntry) {
        self.entries.push(entry);
    }
}

// =============================================================================
// TESTS
// =============================================================================
