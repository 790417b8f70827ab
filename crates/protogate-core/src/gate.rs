//! # Gate Module
//!
//! Named pass/fail checkpoints evaluated against evidence.
//!
//! ## Semantics
//!
//! - Every criterion reads one evidence key and applies one predicate
//! - A missing key fails that criterion with `missing-evidence`; the other
//!   criteria are still evaluated
//! - The gate passes only if ALL criteria pass (AND)
//! - A numeric-minimum threshold applies `observed >= threshold` (closed
//!   lower bound) to every criterion without its own predicate
//!
//! Failure handling (halt vs waiver) is carried on the gate but decided by
//! the orchestrator.

use crate::evidence::{ArtifactRef, Evidence, EvidenceValue};
use crate::primitives::MAX_CRITERIA_PER_GATE;
use crate::types::validate_name;
use crate::{ProtogateError, Score};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// GATE DEFINITION
// =============================================================================

/// What happens when a gate fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the run.
    #[default]
    Halt,
    /// Continue only if an explicit, valid waiver is supplied.
    WaiverEligible,
}

impl FailurePolicy {
    /// Stable name of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::WaiverEligible => "waiver-eligible",
        }
    }
}

/// The gate-wide pass threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassThreshold {
    /// Every criterion must observe `true`.
    #[default]
    AllTrue,
    /// Every criterion must observe a number `>=` the minimum.
    Minimum(Score),
}

/// A predicate applied to one observed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    /// Observed flag is `true`.
    IsTrue,
    /// Observed number `>=` bound.
    AtLeast(Score),
    /// Observed number `<=` bound.
    AtMost(Score),
    /// Observed value equals the text (numbers and flags compared by value).
    Equals(String),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsTrue => f.write_str("is true"),
            Self::AtLeast(bound) => write!(f, ">= {}", bound),
            Self::AtMost(bound) => write!(f, "<= {}", bound),
            Self::Equals(expected) => write!(f, "== {:?}", expected),
        }
    }
}

/// One gate criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Human-readable description of what is checked.
    pub description: String,
    /// Evidence key read by this criterion.
    pub evidence: String,
    /// Explicit predicate; inherited from the gate threshold when absent.
    #[serde(default)]
    pub predicate: Option<Predicate>,
}

impl Criterion {
    /// Create a criterion that inherits the gate threshold.
    #[must_use]
    pub fn new(description: impl Into<String>, evidence: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            evidence: evidence.into(),
            predicate: None,
        }
    }

    /// Attach an explicit predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// The predicate actually applied under the given threshold.
    #[must_use]
    pub fn effective_predicate(&self, threshold: PassThreshold) -> Predicate {
        match (&self.predicate, threshold) {
            (Some(predicate), _) => predicate.clone(),
            (None, PassThreshold::AllTrue) => Predicate::IsTrue,
            (None, PassThreshold::Minimum(min)) => Predicate::AtLeast(min),
        }
    }
}

/// A named gate: ordered criteria, a threshold and a failure policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub threshold: PassThreshold,
    #[serde(default)]
    pub policy: FailurePolicy,
}

impl Gate {
    /// Create an empty gate with `AllTrue` threshold and `Halt` policy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            criteria: Vec::new(),
            threshold: PassThreshold::AllTrue,
            policy: FailurePolicy::Halt,
        }
    }

    /// Append a criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Set the threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: PassThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Evidence keys read by this gate, in criterion order.
    pub fn evidence_keys(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.evidence.as_str())
    }

    /// Validate the gate definition.
    pub fn validate(&self) -> Result<(), ProtogateError> {
        validate_name("gate", &self.name)?;
        if self.criteria.is_empty() {
            return Err(ProtogateError::InvalidDefinition(format!(
                "gate '{}' has no criteria",
                self.name
            )));
        }
        if self.criteria.len() > MAX_CRITERIA_PER_GATE {
            return Err(ProtogateError::InvalidDefinition(format!(
                "gate '{}' has more than {} criteria",
                self.name, MAX_CRITERIA_PER_GATE
            )));
        }
        for criterion in &self.criteria {
            if criterion.evidence.trim().is_empty() {
                return Err(ProtogateError::InvalidDefinition(format!(
                    "gate '{}' has a criterion without an evidence key",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// GATE RESULT
// =============================================================================

/// Why a criterion passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriterionReason {
    Satisfied,
    NotSatisfied,
    MissingEvidence,
    TypeMismatch,
}

impl CriterionReason {
    /// Stable name of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::NotSatisfied => "not-satisfied",
            Self::MissingEvidence => "missing-evidence",
            Self::TypeMismatch => "type-mismatch",
        }
    }
}

impl fmt::Display for CriterionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionOutcome {
    pub description: String,
    pub evidence: String,
    pub predicate: Predicate,
    pub observed: Option<EvidenceValue>,
    pub source: Option<ArtifactRef>,
    pub passed: bool,
    pub reason: CriterionReason,
}

/// Result of evaluating one gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub policy: FailurePolicy,
    pub outcomes: Vec<CriterionOutcome>,
    pub passed: bool,
    pub rationale: String,
}

impl GateResult {
    /// Criteria that failed, in order.
    pub fn failed_criteria(&self) -> impl Iterator<Item = &CriterionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// Artifacts read while evaluating this gate.
    pub fn sources(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.outcomes.iter().filter_map(|o| o.source.as_ref())
    }
}

// =============================================================================
// GATE EVALUATOR
// =============================================================================

/// Gate Evaluator - pure function from (gate, evidence) to result.
pub struct GateEvaluator;

impl GateEvaluator {
    /// Evaluate a gate against evidence.
    ///
    /// Never fails: missing or mistyped evidence is a failing criterion.
    #[must_use]
    pub fn evaluate(gate: &Gate, evidence: &Evidence) -> GateResult {
        let outcomes: Vec<CriterionOutcome> = gate
            .criteria
            .iter()
            .map(|criterion| Self::evaluate_criterion(criterion, gate.threshold, evidence))
            .collect();

        // An empty gate cannot pass: there is nothing to prove.
        let passed = !outcomes.is_empty() && outcomes.iter().all(|o| o.passed);
        let rationale = Self::rationale(&outcomes, passed);

        tracing::debug!(gate = %gate.name, passed, "gate evaluated");

        GateResult {
            gate: gate.name.clone(),
            policy: gate.policy,
            outcomes,
            passed,
            rationale,
        }
    }

    fn evaluate_criterion(
        criterion: &Criterion,
        threshold: PassThreshold,
        evidence: &Evidence,
    ) -> CriterionOutcome {
        let predicate = criterion.effective_predicate(threshold);
        let item = evidence.get(&criterion.evidence);

        let reason = match item {
            None => CriterionReason::MissingEvidence,
            Some(item) => match Self::check(&predicate, &item.value) {
                Some(true) => CriterionReason::Satisfied,
                Some(false) => CriterionReason::NotSatisfied,
                None => CriterionReason::TypeMismatch,
            },
        };

        CriterionOutcome {
            description: criterion.description.clone(),
            evidence: criterion.evidence.clone(),
            predicate,
            observed: item.map(|i| i.value.clone()),
            source: item.and_then(|i| i.source.clone()),
            passed: reason == CriterionReason::Satisfied,
            reason,
        }
    }

    /// Apply a predicate. `None` means the value has the wrong type.
    fn check(predicate: &Predicate, value: &EvidenceValue) -> Option<bool> {
        match (predicate, value) {
            (Predicate::IsTrue, EvidenceValue::Flag(b)) => Some(*b),
            (Predicate::AtLeast(min), EvidenceValue::Number(n)) => Some(n >= min),
            (Predicate::AtMost(max), EvidenceValue::Number(n)) => Some(n <= max),
            (Predicate::Equals(expected), EvidenceValue::Text(t)) => Some(t == expected),
            (Predicate::Equals(expected), EvidenceValue::Flag(b)) => {
                match EvidenceValue::parse_scalar(expected) {
                    EvidenceValue::Flag(e) => Some(*b == e),
                    _ => None,
                }
            }
            (Predicate::Equals(expected), EvidenceValue::Number(n)) => {
                Score::parse(expected).ok().map(|e| *n == e)
            }
            _ => None,
        }
    }

    fn rationale(outcomes: &[CriterionOutcome], passed: bool) -> String {
        if outcomes.is_empty() {
            return "FAIL: gate has no criteria".to_string();
        }
        if passed {
            return format!("PASS: all {} criteria satisfied", outcomes.len());
        }

        let failures: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| match &o.observed {
                Some(observed) => format!(
                    "{} [{}] observed {} ({}, expected {})",
                    o.description, o.evidence, observed, o.reason, o.predicate
                ),
                None => format!("{} [{}] ({})", o.description, o.evidence, o.reason),
            })
            .collect();

        format!(
            "FAIL: {} of {} criteria failed: {}",
            failures.len(),
            outcomes.len(),
            failures.join("; ")
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
