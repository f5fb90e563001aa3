//! # Serve Error Types
//!
//! File: cli/src/core/error.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module defines the error types used throughout the `serve` binary.
//! It follows the same split as the rest of the code base:
//! - `ServeError`: A `thiserror` enum for the failures callers need to tell apart
//!   (an invalid listen endpoint, a broken configuration file, a failed bind).
//! - `Result<T>`: A type alias for `anyhow::Result<T>` used for propagation, so any
//!   layer can attach context with `.context(...)`.
//!
//! ## Error Kinds
//!
//! - Endpoint errors are raised while parsing `--listen` values, before any socket opens.
//! - Configuration errors are raised while reading `serve.json` and friends.
//! - Bind errors are raised by the server bootstrap. Only "address in use" on a
//!   numeric port is recovered (by switching to an ephemeral port); everything else is fatal.
//! - Request errors come from the file-serving layer and are escalated to the run loop.
//!
//! ## Examples
//!
//! ```rust
//! // Return a specific error type
//! return Err(ServeError::PortInUse { port: 3000 }.into());
//!
//! // Check for a specific kind further up
//! if let Some(ServeError::InvalidEndpoint { endpoint, .. }) = err.downcast_ref::<ServeError>() {
//!     eprintln!("bad endpoint: {endpoint}");
//! }
//! ```
//!
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error type for the static file server.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Invalid --listen endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Could not read configuration from file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not parse {} as JSON: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Port {port} is already in use and port switching is disabled.")]
    PortInUse { port: u16 },

    #[error("Failed to serve request: {source}")]
    Request {
        #[source]
        source: io::Error,
    },

    #[error("Unsupported option: {0}")]
    Unsupported(String),
}

impl ServeError {
    /// Convenience constructor for endpoint parse failures.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        ServeError::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

/// Type alias for Result using anyhow::Error for broad compatibility.
pub type Result<T> = anyhow::Result<T>;
