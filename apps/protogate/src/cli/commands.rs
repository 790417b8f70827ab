//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{Backend, RecordFormat};
use crate::config::{
    MAX_RECORD_FILE_SIZE, load_pipeline, load_waivers, parse_evidence_arg, validate_file_path,
    validate_file_size, validate_output_path,
};
use crate::executor::FileStepExecutor;
use crate::journal::JsonLinesJournal;
use protogate_core::{
    ArtifactStore, Evidence, ExecutionRecord, GateEvaluator, GateResult, MemoryStore,
    ModeResolution, Orchestrator, ProtogateError, RedbStore, Router, WaiverBook, export_record,
    import_record, record_checksum, record_to_json,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// How command output is rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json_mode: bool,
    pub verbose: bool,
}

/// Arguments of the `run` command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pipeline: PathBuf,
    pub waivers: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: RecordFormat,
    pub journal: Option<PathBuf>,
    pub resume: Option<PathBuf>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ProtogateError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ProtogateError::SerializationError(format!("JSON output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Load and validate a pipeline definition.
pub fn cmd_check(pipeline_path: &Path, output: Output) -> Result<(), ProtogateError> {
    let pipeline = load_pipeline(pipeline_path)?;
    let registry = pipeline.registry();
    let router = Router::new(registry);

    let phases: Vec<serde_json::Value> = pipeline
        .phases()
        .iter()
        .map(|phase| {
            let resolution = phase.mode().map(|mode| router.resolve(mode.as_str()));
            serde_json::json!({
                "name": phase.name(),
                "mode": phase.mode().map(|m| m.as_str()),
                "resolved": resolution.as_ref().and_then(|r| r.resolved.as_ref().map(|p| p.as_str())),
                "degraded": resolution.as_ref().is_some_and(ModeResolution::is_degraded),
                "gates": phase.gates().iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
                "outputs": phase.outputs().len(),
            })
        })
        .collect();

    if output.json_mode {
        return print_json(&serde_json::json!({
            "valid": true,
            "protocols": registry.protocols().map(|p| p.id().as_str()).collect::<Vec<_>>(),
            "modes": registry.modes().count(),
            "generic": registry.generic().map(|g| g.as_str()),
            "phases": phases,
        }));
    }

    println!("Pipeline OK: {}", pipeline_path.display());
    println!("==================");
    println!("Protocols: {}", registry.protocols().count());
    for protocol in registry.protocols() {
        println!(
            "  {} v{} ({} gate(s))",
            protocol.id(),
            protocol.version(),
            protocol.gates().len()
        );
    }
    println!("Modes:     {}", registry.modes().count());
    if let Some(generic) = registry.generic() {
        println!("Generic:   {}", generic);
    }
    println!("Phases:    {}", pipeline.phases().len());
    for (index, phase) in pipeline.phases().iter().enumerate() {
        match phase.mode() {
            Some(mode) => {
                let resolution = router.resolve(mode.as_str());
                let target = resolution
                    .resolved
                    .as_ref()
                    .map(|p| p.as_str())
                    .unwrap_or("UNRESOLVED");
                println!("  {}. {} [mode {} -> {}]", index, phase.name(), mode, target);
            }
            None => println!("  {}. {}", index, phase.name()),
        }
    }

    Ok(())
}

// =============================================================================
// ROUTE COMMAND
// =============================================================================

/// Resolve a mode and print the resolution. Fails if unresolved.
pub fn cmd_route(pipeline_path: &Path, mode: &str, output: Output) -> Result<(), ProtogateError> {
    let pipeline = load_pipeline(pipeline_path)?;
    let resolution = Router::new(pipeline.registry()).resolve(mode);

    if output.json_mode {
        print_json(&resolution)?;
    } else {
        print_resolution(&resolution);
    }

    resolution.into_result().map(|_| ())
}

fn print_resolution(resolution: &ModeResolution) {
    let chain: Vec<&str> = resolution.chain.iter().map(|p| p.as_str()).collect();
    match &resolution.resolved {
        Some(protocol) if resolution.is_degraded() => {
            println!("Mode '{}' -> '{}' (degraded)", resolution.requested, protocol);
        }
        Some(protocol) => println!("Mode '{}' -> '{}'", resolution.requested, protocol),
        None => println!("Mode '{}' is UNRESOLVED", resolution.requested),
    }
    println!("Chain: {}", chain.join(" -> "));
}

// =============================================================================
// EVALUATE COMMAND
// =============================================================================

/// Evaluate one gate against inline `key=value` evidence.
pub fn cmd_evaluate(
    pipeline_path: &Path,
    gate_name: &str,
    evidence_args: &[String],
    output: Output,
) -> Result<(), ProtogateError> {
    let pipeline = load_pipeline(pipeline_path)?;
    let gate = pipeline.gate(gate_name).ok_or_else(|| {
        ProtogateError::InvalidDefinition(format!("gate '{}' not found", gate_name))
    })?;

    let mut evidence = Evidence::new();
    for arg in evidence_args {
        let (key, value) = parse_evidence_arg(arg)?;
        evidence.insert(key, value);
    }

    let result = GateEvaluator::evaluate(gate, &evidence);

    if output.json_mode {
        print_json(&result)?;
    } else {
        print_gate_result(&result, true);
    }

    if result.passed {
        Ok(())
    } else {
        Err(ProtogateError::GateFailure {
            gate: result.gate,
            rationale: result.rationale,
        })
    }
}

fn print_gate_result(result: &GateResult, detailed: bool) {
    println!("  gate '{}' [{}]: {}", result.gate, result.policy.as_str(), result.rationale);
    if !detailed {
        return;
    }
    for outcome in &result.outcomes {
        let observed = outcome
            .observed
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "    [{}] {} ({} {}, observed {})",
            if outcome.passed { "x" } else { " " },
            outcome.description,
            outcome.evidence,
            outcome.predicate,
            observed
        );
    }
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run every phase of a pipeline.
///
/// Returns the halt reason as an error when the run halts.
pub fn cmd_run(
    db_path: &Path,
    backend: Backend,
    output: Output,
    options: &RunOptions,
) -> Result<(), ProtogateError> {
    if options.resume.is_some() && backend == Backend::Memory {
        return Err(ProtogateError::InvalidDefinition(
            "--resume needs the artifacts of completed phases; use --backend redb".to_string(),
        ));
    }
    let pipeline = load_pipeline(&options.pipeline)?;
    let waivers = match &options.waivers {
        Some(path) => load_waivers(path)?,
        None => WaiverBook::new(),
    };
    let base_dir = match &options.base_dir {
        Some(dir) => dir.clone(),
        None => validate_file_path(&options.pipeline)?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let previous = options.resume.as_deref().map(read_record).transpose()?;

    let mut store = open_store(db_path, backend)?;
    let mut executor = FileStepExecutor::new(base_dir).resuming(previous.is_some());
    let mut journal = options
        .journal
        .as_deref()
        .map(JsonLinesJournal::open)
        .transpose()?;

    let (result, record) = {
        let mut orchestrator =
            Orchestrator::new(&pipeline, store.as_mut(), &mut executor).with_waivers(waivers);
        if let Some(journal) = journal.as_mut() {
            orchestrator = orchestrator.with_journal(journal);
        }
        if let Some(previous) = &previous {
            orchestrator = orchestrator.resuming(previous)?;
        }
        let result = orchestrator.run().map(|_| ());
        if let Some(message) = orchestrator.journal_failure() {
            tracing::warn!(%message, "run journal is incomplete");
        }
        (result, orchestrator.into_record())
    };

    if let Some(path) = &options.output {
        write_record(&record, path, options.format)?;
    }

    if output.json_mode {
        print_json(&record)?;
    } else {
        print_record(&record, output.verbose);
    }

    result?;
    record.outcome()
}

fn print_record(record: &ExecutionRecord, verbose: bool) {
    println!("Run: {}", record.state());
    for entry in record.entries() {
        println!("Phase {} '{}'", entry.index, entry.phase);
        if let Some(resolution) = &entry.resolution {
            let target = resolution
                .resolved
                .as_ref()
                .map(|p| p.as_str())
                .unwrap_or("UNRESOLVED");
            println!("  mode '{}' -> {}", resolution.requested, target);
        }
        for artifact in &entry.artifacts {
            println!("  wrote {} ({})", artifact.name, short_checksum(&artifact.checksum));
        }
        for result in &entry.gate_results {
            print_gate_result(result, verbose);
        }
        for waiver in &entry.waivers {
            println!(
                "  waived '{}' by {}: {}",
                waiver.gate, waiver.approver, waiver.justification
            );
        }
        for warning in &entry.warnings {
            println!("  warning: {}", warning);
        }
        if let Some(halt) = &entry.halt {
            println!("  HALTED: {}", halt);
        }
    }
}

fn write_record(
    record: &ExecutionRecord,
    path: &Path,
    format: RecordFormat,
) -> Result<(), ProtogateError> {
    let path = validate_output_path(path)?;
    let data = match format {
        RecordFormat::Canonical => export_record(record)?,
        RecordFormat::Json => record_to_json(record)?.into_bytes(),
    };
    std::fs::write(&path, &data)
        .map_err(|e| ProtogateError::IoError(format!("Write record: {}", e)))?;
    tracing::info!(path = %path.display(), bytes = data.len(), "execution record written");
    Ok(())
}

// =============================================================================
// ARTIFACTS COMMAND
// =============================================================================

/// List artifacts in the store.
pub fn cmd_artifacts(db_path: &Path, backend: Backend, output: Output) -> Result<(), ProtogateError> {
    let store = open_store(db_path, backend)?;
    let records = store.records()?;

    if output.json_mode {
        return print_json(&records);
    }

    println!("Artifacts: {}", records.len());
    for record in &records {
        println!(
            "  #{} {} ({} bytes, {}) producer={} consumers=[{}]",
            record.sequence,
            record.name,
            record.size,
            short_checksum(&record.checksum),
            record.producer,
            record
                .consumers
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        if output.verbose {
            println!("      location: {}", record.location);
        }
    }
    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Verify an exported record and print its summary.
pub fn cmd_verify(input: &Path, output: Output) -> Result<(), ProtogateError> {
    let record = read_record(input)?;
    let checksum = record_checksum(&record)?;

    if output.json_mode {
        return print_json(&serde_json::json!({
            "valid": true,
            "state": record.state(),
            "phases": record.entries().len(),
            "start_phase": record.start_phase(),
            "checksum": checksum,
        }));
    }

    println!("Record OK: {}", input.display());
    println!("State:    {}", record.state());
    println!("Phases:   {}", record.entries().len());
    println!("Checksum: {}", checksum);
    if output.verbose {
        print_record(&record, true);
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new redb artifact database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), ProtogateError> {
    if db_path.exists() {
        if !force {
            return Err(ProtogateError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| ProtogateError::IoError(format!("Remove database: {}", e)))?;
    }

    let _store = RedbStore::open(db_path)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the artifact store for the selected backend.
pub fn open_store(db_path: &Path, backend: Backend) -> Result<Box<dyn ArtifactStore>, ProtogateError> {
    match backend {
        Backend::Memory => Ok(Box::new(MemoryStore::new())),
        Backend::Redb => Ok(Box::new(RedbStore::open(db_path)?)),
    }
}

/// Read and verify an exported canonical record.
pub fn read_record(path: &Path) -> Result<ExecutionRecord, ProtogateError> {
    let canonical = validate_file_path(path)?;
    validate_file_size(&canonical, MAX_RECORD_FILE_SIZE)?;
    let data = std::fs::read(&canonical)
        .map_err(|e| ProtogateError::IoError(format!("Read record: {}", e)))?;
    import_record(&data)
}

fn short_checksum(checksum: &str) -> &str {
    checksum.get(..16).unwrap_or(checksum)
}
