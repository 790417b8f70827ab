//! # Protogate Application Library
//!
//! File-facing pieces of the Protogate binary, exposed for integration tests:
//! - `cli` - clap command tree and command implementations
//! - `config` - pipeline definition and waiver loading
//! - `executor` - step executor that ingests phase outputs from disk
//! - `journal` - JSON Lines run journal

pub mod cli;
pub mod config;
pub mod executor;
pub mod journal;
