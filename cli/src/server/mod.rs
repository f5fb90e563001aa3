//! # Serve Static File Server
//!
//! File: cli/src/server/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module is the whole server: it turns parsed arguments into running
//! listeners and keeps them alive until the process is asked to stop.
//!
//! ## Architecture
//!
//! - `config.rs`: Arguments, configuration file merge and validation
//! - `endpoint.rs`: Parsing `--listen` values into `EndpointSpec`s
//! - `bootstrap.rs`: Binding (with port switching) and starting each endpoint
//! - `address.rs`: Local and network URLs for a bound address
//! - `pipeline.rs`: The middleware stack every request goes through
//! - `files.rs` / `listing.rs`: Static files, ETags and directory listings
//! - `shutdown.rs`: The cleanup registry and signal handling
//! - `utils.rs`: Logging and formatting helpers
//!
//! Startup flow:
//! 1. Load and merge configuration
//! 2. Install signal handlers and start watching them
//! 3. Build the request pipeline once, then start every endpoint with it
//! 4. Print a banner per endpoint
//! 5. Wait until every endpoint has shut down, or a request fails fatally
//!
//! ## Examples
//!
//! ```bash
//! # Serve the current directory on port 3000 (or $PORT)
//! serve
//!
//! # Serve ./public on two endpoints with CORS enabled
//! serve public -l 8080 -l tcp://127.0.0.1:9090 --cors
//! ```
//!
use crate::common::ui;
use crate::core::error::Result;
use anyhow::Context;
use tracing::{debug, info};

pub use config::ServeArgs;

pub mod address;
pub mod bootstrap;
pub mod config;
pub mod endpoint;
pub mod files;
pub mod listing;
#[cfg(windows)]
pub mod pipe;
pub mod pipeline;
pub mod shutdown;
pub mod utils;

use config::ServeSettings;
use files::FileServer;
use pipeline::FatalReporter;
use shutdown::{Escalation, OsSignals, ShutdownRegistry};

/// # Handle Serve (`handle_serve`)
///
/// Entry point for the `serve` binary.
///
/// ## Arguments
///
/// * `args`: The parsed `ServeArgs`.
///
/// ## Returns
///
/// * `Result<()>`: `Ok(())` after a graceful shutdown. An `Err` if configuration is
///   invalid, an endpoint cannot be bound, or a request failed fatally.
pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    debug!("Handling serve with args: {:?}", args);

    let settings = config::load_and_merge_config(args).await?;
    debug!("Effective settings: {:?}", settings);
    utils::log_directory_contents(&settings.static_config.root_directory);

    // First signal shuts down gracefully; a second Ctrl+C exits right away.
    let registry = ShutdownRegistry::global();
    let signals = OsSignals::install().context("Failed to install signal handlers")?;
    tokio::spawn(async move {
        if shutdown::watch(registry, signals).await == Escalation::ForceExit {
            std::process::exit(0);
        }
    });

    // Trigger on every exit path so all listeners are closed exactly once.
    let result = run(settings, registry).await;
    registry.trigger();
    result
}

/// # Run Endpoints (`run`)
///
/// Starts every endpoint in `settings` and waits until they have all shut down
/// (after `registry` fires) or a request fails fatally.
pub async fn run(settings: ServeSettings, registry: &ShutdownRegistry) -> Result<()> {
    // One handler and router shared by every endpoint.
    let (fatal, mut fatal_rx) = FatalReporter::channel();
    let root = settings.static_config.root_directory.clone();
    let files = FileServer::new(settings.static_config.clone(), settings.single, fatal);
    let app = pipeline::build_router(files, settings.pipeline_options());

    // Bind endpoints one at a time; the first failure aborts startup.
    let mut servers = Vec::with_capacity(settings.endpoints.len());
    for endpoint in settings.endpoints {
        let server = bootstrap::start(endpoint, app.clone(), registry, settings.port_switching)
            .await?;
        ui::print_server_info(&root, &server.info);
        servers.push(server);
    }
    // Each server holds its own clone now.
    drop(app);
    info!("Press Ctrl+C to stop.");

    // Endpoints stop together once the registry fires, so waiting in order is fine.
    let all_stopped = async {
        for server in servers {
            server.wait().await?;
        }
        Ok::<(), anyhow::Error>(())
    };

    // A fatal request error ends the run early; handle_serve then triggers shutdown.
    tokio::select! {
        stopped = all_stopped => {
            info!("Server shutdown complete.");
            stopped
        }
        Some(err) = fatal_rx.recv() => Err(err.context("Request handling failed")),
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::StaticConfig;
    use crate::server::endpoint::EndpointSpec;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(root: &std::path::Path) -> ServeSettings {
        ServeSettings {
            static_config: StaticConfig {
                root_directory: root.to_path_buf(),
                etag_enabled: true,
                symlinks_allowed: None,
                directory_listing: true,
            },
            endpoints: vec![
                EndpointSpec::Port {
                    port: 0,
                    host: Some("127.0.0.1".into()),
                },
                EndpointSpec::Port {
                    port: 0,
                    host: Some("127.0.0.1".into()),
                },
            ],
            single: false,
            cors: false,
            compression: true,
            request_logging: true,
            port_switching: true,
        }
    }

    /// All endpoints stop once the registry fires.
    #[tokio::test]
    async fn test_run_stops_on_shutdown() -> Result<()> {
        let dir = TempDir::new()?;
        let registry: &'static ShutdownRegistry = Box::leak(Box::new(ShutdownRegistry::new()));

        let running = tokio::spawn(run(settings(dir.path()), registry));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.trigger());

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .context("server did not stop")??
    }

    /// A bind failure on any endpoint aborts startup.
    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_run_fails_on_bind_error() -> Result<()> {
        let dir = TempDir::new()?;
        let registry = ShutdownRegistry::new();
        let mut broken = settings(dir.path());
        broken
            .endpoints
            .push(EndpointSpec::NamedPipe(r"\\.\pipe\serve-missing".into()));

        let result = run(broken, &registry).await;

        assert!(result.is_err());
        registry.trigger();
        Ok(())
    }
}
