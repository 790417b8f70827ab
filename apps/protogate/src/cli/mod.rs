//! # Protogate CLI Module
//!
//! This module implements the CLI interface for Protogate.
//!
//! ## Available Commands
//!
//! - `check` - Validate a pipeline definition
//! - `route` - Resolve a mode and print the fallback chain
//! - `evaluate` - Evaluate one gate against inline evidence
//! - `run` - Run every phase of a pipeline against files on disk
//! - `artifacts` - List artifacts in the store
//! - `verify` - Verify an exported execution record
//! - `init` - Initialize a new artifact database

mod commands;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use protogate_core::ProtogateError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Protogate - protocol router and evidence-gate validator
///
/// Resolves workflow modes to protocols and refuses to advance past a
/// quality gate without the evidence to back it.
#[derive(Parser, Debug)]
#[command(name = "protogate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the artifact database (redb backend)
    #[arg(short = 'D', long, global = true, default_value = "protogate.db")]
    pub database: PathBuf,

    /// Artifact store backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Artifact store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory store (artifacts discarded on exit).
    Memory,
    /// redb database at `--database` (ACID, persistent).
    Redb,
}

/// Exported record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordFormat {
    /// Checksummed postcard binary.
    Canonical,
    /// Pretty JSON (not verifiable).
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate a pipeline definition
    Check {
        /// Pipeline definition file (TOML)
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Resolve a mode through the registry
    Route {
        /// Pipeline definition file (TOML)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Mode to resolve
        mode: String,
    },

    /// Evaluate one gate against inline evidence
    Evaluate {
        /// Pipeline definition file (TOML)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Gate name
        #[arg(short, long)]
        gate: String,

        /// Evidence as key=value (repeatable)
        #[arg(short, long = "evidence")]
        evidence: Vec<String>,
    },

    /// Run all phases, ingesting phase outputs from disk
    Run {
        /// Pipeline definition file (TOML)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Waiver file (TOML, `[[waivers]]` entries)
        #[arg(short, long)]
        waivers: Option<PathBuf>,

        /// Directory phase output paths are relative to
        /// (default: the pipeline file's directory)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Write the execution record to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Execution record format
        #[arg(short = 't', long, value_enum, default_value_t = RecordFormat::Canonical)]
        format: RecordFormat,

        /// Append run events to this JSON Lines file
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Resume after a previous run (exported canonical record;
        /// needs `--backend redb`)
        #[arg(short, long)]
        resume: Option<PathBuf>,
    },

    /// List artifacts in the store
    Artifacts,

    /// Verify an exported execution record
    Verify {
        /// Exported record file (canonical format)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Initialize a new empty artifact database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ProtogateError> {
    let output = Output {
        json_mode: cli.json_mode,
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Check { pipeline }) => cmd_check(&pipeline, output),
        Some(Commands::Route { pipeline, mode }) => cmd_route(&pipeline, &mode, output),
        Some(Commands::Evaluate {
            pipeline,
            gate,
            evidence,
        }) => cmd_evaluate(&pipeline, &gate, &evidence, output),
        Some(Commands::Run {
            pipeline,
            waivers,
            base_dir,
            output: record_path,
            format,
            journal,
            resume,
        }) => cmd_run(
            &cli.database,
            cli.backend,
            output,
            &RunOptions {
                pipeline,
                waivers,
                base_dir,
                output: record_path,
                format,
                journal,
                resume,
            },
        ),
        Some(Commands::Artifacts) => cmd_artifacts(&cli.database, cli.backend, output),
        Some(Commands::Verify { input }) => cmd_verify(&input, output),
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        None => Cli::command()
            .print_help()
            .map_err(|e| ProtogateError::IoError(e.to_string())),
    }
}
