//! # Run Journal
//!
//! Append-only sink for run events.
//!
//! The journal is injected into the orchestrator; there is no global
//! knowledge base. Appending never rewrites earlier events.

use crate::ProtogateError;
use crate::gate::GateResult;
use crate::record::HaltReason;
use crate::registry::ModeResolution;
use crate::storage::ArtifactRecord;
use crate::waiver::AppliedWaiver;
use serde::{Deserialize, Serialize};

/// One state change of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunEvent {
    RunStarted {
        phases: usize,
        start_phase: usize,
    },
    PhaseStarted {
        index: usize,
        phase: String,
    },
    ModeResolved {
        phase: String,
        resolution: ModeResolution,
    },
    ArtifactWritten {
        phase: String,
        record: ArtifactRecord,
    },
    GateEvaluated {
        phase: String,
        result: GateResult,
    },
    WaiverApplied {
        phase: String,
        waiver: AppliedWaiver,
    },
    PhaseCompleted {
        index: usize,
        phase: String,
    },
    RunHalted {
        index: usize,
        phase: String,
        reason: HaltReason,
    },
    RunCompleted,
}

/// Append-only event sink.
pub trait RunJournal {
    /// Append one event.
    fn append(&mut self, event: &RunEvent) -> Result<(), ProtogateError>;
}

/// In-memory journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    events: Vec<RunEvent>,
}

impl MemoryJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in append order.
    #[must_use]
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl RunJournal for MemoryJournal {
    fn append(&mut self, event: &RunEvent) -> Result<(), ProtogateError> {
        self.events.push(event.clone());
        Ok(())
    }
}
