//! # Serve Main Entry Point
//!
//! File: cli/src/main.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This file is the entry point of the `serve` binary. It handles:
//! - Command-line argument parsing using Clap
//! - Setting up the logging system (`--debug` raises the level)
//! - Handing over to the server and reporting any error it returns
//!
//! ## Architecture
//!
//! - `server`: Everything about serving (configuration, binding, requests, shutdown)
//! - `common`: Shared helpers (filesystem checks, network discovery, terminal output)
//! - `core`: Infrastructure (error types, configuration file discovery)
//!
//! All errors are propagated to this level for consistent handling.
//!
//! ## Examples
//!
//! ```bash
//! # Get help
//! serve --help
//!
//! # Serve ./site with debug logging
//! serve site --debug
//!
//! # Override log filtering entirely
//! RUST_LOG=serve=trace,tower_http=trace serve
//! ```
//!
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod common;
mod core;
mod server;

/// Log filter used when `RUST_LOG` is not set.
fn default_log_filter(debug: bool) -> &'static str {
    if debug {
        "serve=debug,tower_http=debug"
    } else {
        "serve=info,tower_http=warn"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = server::ServeArgs::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(args.debug)));

    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", args);

    if let Err(e) = server::handle_serve(args).await {
        tracing::error!("Serve failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
