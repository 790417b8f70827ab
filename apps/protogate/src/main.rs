//! # Protogate - Protocol Router & Evidence-Gate Validator
//!
//! The command-line binary for Protogate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 apps/protogate (THE BINARY)                 │
//! │                                                             │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────┐   │
//! │  │    CLI      │   │   Config     │   │  File Executor  │   │
//! │  │   (clap)    │   │   (toml)     │   │  (phase outputs)│   │
//! │  └──────┬──────┘   └──────┬───────┘   └────────┬────────┘   │
//! │         └─────────────────┼────────────────────┘            │
//! │                           ▼                                 │
//! │                  ┌─────────────────┐                        │
//! │                  │ protogate-core  │                        │
//! │                  │  (THE LOGIC)    │                        │
//! │                  └─────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! protogate check -p pipeline.toml
//! protogate route -p pipeline.toml comprehensive
//! protogate evaluate -p pipeline.toml -g "Coverage Gate" -e coverage_pct=0.82
//! protogate -B redb run -p pipeline.toml -w waivers.toml -o run.pgrx
//! protogate verify -i run.pgrx
//! ```

use clap::Parser;
use protogate::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // PROTOGATE_LOG_FORMAT=json enables machine-parseable logs on stderr.
    let log_format = std::env::var("PROTOGATE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "protogate=debug"
    } else {
        "protogate=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Protogate startup banner.
fn print_banner() {
    println!(
        r#"
  ┌─┐┬─┐┌─┐┌┬┐┌─┐┌─┐┌─┐┌┬┐┌─┐
  ├─┘├┬┘│ │ │ │ ││ ┬├─┤ │ ├┤
  ┴  ┴└─└─┘ ┴ └─┘└─┘┴ ┴ ┴ └─┘

  Protocol Router & Evidence Gates v{}

  Routed • Gated • Auditable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
