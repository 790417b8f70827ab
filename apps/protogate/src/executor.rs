//! # File Step Executor
//!
//! The external step for CLI runs: each phase's declared outputs are read
//! from disk (relative to a base directory) and handed back as artifacts.
//! A missing output file is logged and skipped; gates that depend on it
//! then fail with `missing-evidence`. Output locations must resolve to
//! regular files inside the base directory.
//!
//! Every output found on disk is handed to the orchestrator, so an
//! artifact already in the store halts the phase with a write conflict.
//! The one exception is a resumed run: an output whose stored checksum
//! matches the file is the same evidence and is not written again.

use crate::config::{validate_file_path, validate_file_size};
use protogate_core::primitives::MAX_ARTIFACT_SIZE;
use protogate_core::storage::checksum;
use protogate_core::{ProducedArtifact, ProtogateError, StepContext, StepExecutor};
use std::path::{Path, PathBuf};

/// Reads phase outputs from files.
#[derive(Debug, Clone)]
pub struct FileStepExecutor {
    base_dir: PathBuf,
    resuming: bool,
}

impl FileStepExecutor {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            resuming: false,
        }
    }

    /// Mark the run as resuming a previous one.
    #[must_use]
    pub fn resuming(mut self, resuming: bool) -> Self {
        self.resuming = resuming;
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve an output location, refusing anything outside the base dir.
    fn resolve(&self, base: &Path, location: &str) -> Result<Option<PathBuf>, ProtogateError> {
        let path = base.join(location);
        if !path.exists() {
            return Ok(None);
        }
        let canonical = validate_file_path(&path)?;
        if !canonical.starts_with(base) {
            return Err(ProtogateError::InvalidDefinition(format!(
                "output '{}' resolves outside '{}'",
                location,
                base.display()
            )));
        }
        Ok(Some(canonical))
    }
}

impl StepExecutor for FileStepExecutor {
    fn execute(&mut self, ctx: &StepContext<'_>) -> Result<Vec<ProducedArtifact>, ProtogateError> {
        let base = self.base_dir.canonicalize().map_err(|e| {
            ProtogateError::IoError(format!(
                "Invalid base directory '{}': {}",
                self.base_dir.display(),
                e
            ))
        })?;
        let mut produced = Vec::new();

        for (artifact, location) in ctx.phase.outputs() {
            let Some(path) = self.resolve(&base, location)? else {
                tracing::warn!(
                    phase = ctx.phase.name(),
                    %artifact,
                    location = %location,
                    "phase output not found"
                );
                continue;
            };

            validate_file_size(&path, MAX_ARTIFACT_SIZE as u64)?;
            let content = std::fs::read(&path).map_err(|e| {
                ProtogateError::IoError(format!("Read '{}': {}", path.display(), e))
            })?;

            if self.resuming {
                if let Some(stored) = ctx.store.record(artifact)? {
                    if stored.checksum == checksum(&content) {
                        tracing::info!(%artifact, "phase output already stored");
                        continue;
                    }
                }
            }

            tracing::debug!(%artifact, bytes = content.len(), "phase output read");
            produced.push(
                ProducedArtifact::new(artifact.clone(), content)
                    .with_origin(path.display().to_string()),
            );
        }

        Ok(produced)
    }
}
