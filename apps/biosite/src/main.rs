//! # biosite - Biography Website Backend
//!
//! The main binary for the biosite REST API.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for database administration
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/biosite (THE BINARY)                │
//! │                                                          │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │    Config    │   │
//! │   │   (clap)    │   │   (axum)    │   │ (toml + env) │   │
//! │   └──────┬──────┘   └──────┬──────┘   └──────┬───────┘   │
//! │          └─────────────────┼─────────────────┘           │
//! │                            ▼                             │
//! │                    ┌───────────────┐                     │
//! │                    │ biosite-core  │                     │
//! │                    │  (THE LOGIC)  │                     │
//! │                    └───────────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Create the first administrator, then start the server
//! biosite create-user --email me@example.com --password 'long secret'
//! biosite server --host 0.0.0.0 --port 8080
//!
//! # Administration
//! biosite status --json-mode
//! biosite export -o backup.json
//! ```

use biosite::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // BIOSITE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("BIOSITE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "biosite=debug,biosite_core=debug,tower_http=debug"
    } else {
        "biosite=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the biosite startup banner.
fn print_banner() {
    println!(
        r#"
   _     _           _ _
  | |__ (_) ___  ___(_) |_ ___
  | '_ \| |/ _ \/ __| | __/ _ \
  | |_) | | (_) \__ \ | ||  __/
  |_.__/|_|\___/|___/_|\__\___|

  Biography site backend v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
