//! End-to-end tests for CLI command functions against temp directories.

#![allow(clippy::unwrap_used, clippy::panic)]

use protogate::cli::{
    Backend, Output, RecordFormat, RunOptions, cmd_artifacts, cmd_check, cmd_evaluate, cmd_init,
    cmd_route, cmd_run, cmd_verify, open_store, read_record,
};
use protogate_core::{ArtifactName, HaltReason, ProtogateError, RunState};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PIPELINE: &str = r#"
[[protocols]]
id = "generic"
version = "1.0.0"
produces = ["coverage_pct"]

[[protocols.gates]]
name = "Coverage Gate"
policy = "waiver-eligible"
threshold = { minimum = "0.80" }

[[protocols.gates.criteria]]
description = "line coverage"
evidence = "coverage_pct"

[[modes]]
name = "comprehensive"
protocol = "comprehensive"

[[modes]]
name = "generic"
protocol = "generic"
fallback_of = "comprehensive"

[[phases]]
name = "audit"
mode = "comprehensive"
[phases.outputs]
coverage_pct = "reports/coverage.txt"

[[phases]]
name = "closure"
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(coverage: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pipeline.toml"), PIPELINE).unwrap();
        if let Some(value) = coverage {
            fs::create_dir_all(dir.path().join("reports")).unwrap();
            fs::write(dir.path().join("reports/coverage.txt"), value).unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            pipeline: self.path("pipeline.toml"),
            waivers: None,
            base_dir: None,
            output: Some(self.path("run.pgrx")),
            format: RecordFormat::Canonical,
            journal: Some(self.path("journal.jsonl")),
            resume: None,
        }
    }

    fn db(&self) -> PathBuf {
        self.path("artifacts.db")
    }
}

fn quiet() -> Output {
    Output::default()
}

fn journal_lines(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

// =============================================================================
// DEFINITION COMMANDS
// =============================================================================

#[test]
fn test_check_and_route() {
    let ws = Workspace::new(None);
    let pipeline = ws.path("pipeline.toml");

    cmd_check(&pipeline, quiet()).unwrap();
    cmd_route(&pipeline, "comprehensive", quiet()).unwrap();

    let err = cmd_route(&pipeline, "ui-review", quiet()).unwrap_err();
    assert!(matches!(err, ProtogateError::UnresolvedMode { .. }));
}

#[test]
fn test_evaluate_inline_evidence() {
    let ws = Workspace::new(None);
    let pipeline = ws.path("pipeline.toml");

    cmd_evaluate(
        &pipeline,
        "Coverage Gate",
        &["coverage_pct=0.80".to_string()],
        quiet(),
    )
    .unwrap();

    let err = cmd_evaluate(&pipeline, "Coverage Gate", &[], quiet()).unwrap_err();
    assert!(matches!(err, ProtogateError::GateFailure { .. }));

    let err = cmd_evaluate(&pipeline, "No Such Gate", &[], quiet()).unwrap_err();
    assert!(matches!(err, ProtogateError::InvalidDefinition(_)));
}

// =============================================================================
// RUN COMMAND
// =============================================================================

#[test]
fn test_run_completes_and_exports_record() {
    let ws = Workspace::new(Some("0.91"));

    cmd_run(&ws.db(), Backend::Redb, quiet(), &ws.run_options()).unwrap();

    let record = read_record(&ws.path("run.pgrx")).unwrap();
    assert_eq!(record.state(), RunState::Completed);
    assert_eq!(record.entries().len(), 2);
    cmd_verify(&ws.path("run.pgrx"), quiet()).unwrap();

    let store = open_store(&ws.db(), Backend::Redb).unwrap();
    let stored = store
        .record(&ArtifactName::new("coverage_pct"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.producer, "generic");
    assert!(stored.location.ends_with("coverage.txt"));
    drop(store);
    cmd_artifacts(&ws.db(), Backend::Redb, quiet()).unwrap();

    assert!(journal_lines(&ws.path("journal.jsonl")) > 0);
}

#[test]
fn test_run_halts_on_missing_evidence() {
    let ws = Workspace::new(None);

    let err = cmd_run(&ws.db(), Backend::Memory, quiet(), &ws.run_options()).unwrap_err();
    assert!(matches!(err, ProtogateError::GateFailure { .. }));

    let record = read_record(&ws.path("run.pgrx")).unwrap();
    assert_eq!(record.state(), RunState::Halted { phase: 0 });
    assert!(record.phase("closure").is_none());
}

#[test]
fn test_waiver_file_lets_run_continue() {
    let ws = Workspace::new(Some("0.42"));
    fs::write(
        ws.path("waivers.toml"),
        r#"
[[waivers]]
gate = "Coverage Gate"
justification = "legacy module excluded until rewrite"
approver = "qa-lead"
"#,
    )
    .unwrap();

    let mut options = ws.run_options();
    options.waivers = Some(ws.path("waivers.toml"));
    options.format = RecordFormat::Json;
    options.output = Some(ws.path("run.json"));

    cmd_run(&ws.db(), Backend::Memory, quiet(), &options).unwrap();

    let json = fs::read_to_string(ws.path("run.json")).unwrap();
    assert!(json.contains("qa-lead"));
    assert!(json.contains("completed"));
}

#[test]
fn test_resume_after_adding_evidence() {
    let ws = Workspace::new(None);
    let options = ws.run_options();

    assert!(cmd_run(&ws.db(), Backend::Redb, quiet(), &options).is_err());

    fs::create_dir_all(ws.path("reports")).unwrap();
    fs::write(ws.path("reports/coverage.txt"), "0.88").unwrap();

    let mut resumed = ws.run_options();
    resumed.resume = Some(ws.path("run.pgrx"));
    resumed.output = Some(ws.path("resumed.pgrx"));
    cmd_run(&ws.db(), Backend::Redb, quiet(), &resumed).unwrap();

    let record = read_record(&ws.path("resumed.pgrx")).unwrap();
    assert_eq!(record.start_phase(), 0);
    assert_eq!(record.state(), RunState::Completed);
}

#[test]
fn test_second_run_on_persistent_store_is_a_write_conflict() {
    let ws = Workspace::new(Some("0.95"));
    cmd_run(&ws.db(), Backend::Redb, quiet(), &ws.run_options()).unwrap();

    fs::write(ws.path("reports/coverage.txt"), "0.10").unwrap();
    let err = cmd_run(&ws.db(), Backend::Redb, quiet(), &ws.run_options()).unwrap_err();
    assert!(matches!(err, ProtogateError::ArtifactWriteConflict(_)));

    let record = read_record(&ws.path("run.pgrx")).unwrap();
    assert_eq!(record.state(), RunState::Halted { phase: 0 });
    let audit = record.phase("audit").unwrap();
    assert!(matches!(
        &audit.halt,
        Some(HaltReason::ArtifactWriteConflict { artifact }) if artifact.as_str() == "coverage_pct"
    ));
    assert!(audit.gate_results.is_empty());
}

#[test]
fn test_resume_reuses_unchanged_output_and_applies_waiver() {
    let ws = Workspace::new(Some("0.50"));
    let err = cmd_run(&ws.db(), Backend::Redb, quiet(), &ws.run_options()).unwrap_err();
    assert!(matches!(err, ProtogateError::GateFailure { .. }));

    fs::write(
        ws.path("waivers.toml"),
        r#"
[[waivers]]
gate = "Coverage Gate"
justification = "coverage tooling broken on this branch"
approver = "qa-lead"
"#,
    )
    .unwrap();

    let mut resumed = ws.run_options();
    resumed.resume = Some(ws.path("run.pgrx"));
    resumed.waivers = Some(ws.path("waivers.toml"));
    resumed.output = Some(ws.path("resumed.pgrx"));
    cmd_run(&ws.db(), Backend::Redb, quiet(), &resumed).unwrap();

    let record = read_record(&ws.path("resumed.pgrx")).unwrap();
    assert_eq!(record.state(), RunState::Completed);
    let audit = record.phase("audit").unwrap();
    assert!(audit.artifacts.is_empty());
    assert_eq!(audit.waivers.len(), 1);
}

#[test]
fn test_resume_with_changed_output_is_a_write_conflict() {
    let ws = Workspace::new(Some("0.50"));
    assert!(cmd_run(&ws.db(), Backend::Redb, quiet(), &ws.run_options()).is_err());

    fs::write(ws.path("reports/coverage.txt"), "0.95").unwrap();
    let mut resumed = ws.run_options();
    resumed.resume = Some(ws.path("run.pgrx"));
    resumed.output = Some(ws.path("resumed.pgrx"));
    let err = cmd_run(&ws.db(), Backend::Redb, quiet(), &resumed).unwrap_err();
    assert!(matches!(err, ProtogateError::ArtifactWriteConflict(_)));
}

#[test]
fn test_resume_requires_persistent_store() {
    let ws = Workspace::new(None);
    assert!(cmd_run(&ws.db(), Backend::Memory, quiet(), &ws.run_options()).is_err());

    fs::create_dir_all(ws.path("reports")).unwrap();
    fs::write(ws.path("reports/coverage.txt"), "0.88").unwrap();
    let mut resumed = ws.run_options();
    resumed.resume = Some(ws.path("run.pgrx"));
    resumed.output = Some(ws.path("resumed.pgrx"));

    let err = cmd_run(&ws.db(), Backend::Memory, quiet(), &resumed).unwrap_err();
    assert!(matches!(err, ProtogateError::InvalidDefinition(_)));
    assert!(!ws.path("resumed.pgrx").exists());
}

// =============================================================================
// INIT & VERIFY
// =============================================================================

#[test]
fn test_init_refuses_existing_database() {
    let ws = Workspace::new(None);

    cmd_init(&ws.db(), false).unwrap();
    assert!(ws.db().exists());
    assert!(cmd_init(&ws.db(), false).is_err());
    cmd_init(&ws.db(), true).unwrap();
}

#[test]
fn test_verify_rejects_tampered_record() {
    let ws = Workspace::new(Some("0.91"));
    cmd_run(&ws.db(), Backend::Memory, quiet(), &ws.run_options()).unwrap();

    let path = ws.path("run.pgrx");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    assert!(cmd_verify(&path, quiet()).is_err());
}
