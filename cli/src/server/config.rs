//! # Serve Command-Line Configuration
//!
//! File: cli/src/server/config.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module turns the command line into the settings the server runs with. It
//! combines:
//! 1. Command-line arguments (highest priority)
//! 2. The JSON configuration file found by `core::config` (if present)
//! 3. Defaults, including the `PORT` environment variable for the default endpoint
//!
//! ## Architecture
//!
//! The configuration system follows these steps:
//! 1. Parse arguments with `clap` (listen endpoints are parsed and validated here)
//! 2. Reject options the server does not support (TLS)
//! 3. Load the configuration file relative to the served directory
//! 4. Merge flags over file settings
//! 5. Resolve and validate the directory to serve
//!
//! ## Examples
//!
//! ```bash
//! # Serve ./dist on the default port (3000, or $PORT)
//! serve dist
//!
//! # Two endpoints, single-page mode, no compression
//! serve -l 8080 -l unix:/tmp/site.sock --single --no-compression
//! ```
//!
//! ```rust
//! let args = ServeArgs::parse();
//! let settings = load_and_merge_config(args).await?;
//! println!("Serving directory: {}", settings.static_config.root_directory.display());
//! ```
//!
use super::endpoint::{self, EndpointSpec, DEFAULT_TCP_PORT};
use super::pipeline::PipelineOptions;
use crate::core::config::load_configuration;
use crate::core::error::{Result, ServeError};
use anyhow::Context;
use clap::{ArgAction, Parser};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable consulted for the default port.
pub const PORT_ENV: &str = "PORT";

/// # Serve Command Arguments (`ServeArgs`)
///
/// Command-line arguments accepted by `serve`, parsed using `clap`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "serve",
    version,
    about = "Static file serving and directory listing",
    long_about = "Serves a directory over HTTP (or a UNIX socket / Windows named pipe) \
                  with compression, weak ETags and directory listings.\n\n\
                  When the requested port is in use, an available port is picked \
                  instead unless --no-port-switching is given.",
    disable_version_flag = true
)]
pub struct ServeArgs {
    /// The directory to serve. Defaults to the current working directory.
    #[arg(default_value = ".")]
    pub directory: PathBuf,

    /// Endpoint to listen on: a port ("5000"), "tcp://host:port",
    /// "unix:/path/to/socket.sock" or "pipe:\\.\pipe\name". Repeatable.
    #[arg(
        short = 'l',
        long = "listen",
        short_alias = 'p',
        value_name = "URI",
        value_parser = endpoint::parse
    )]
    pub listen: Vec<EndpointSpec>,

    /// Custom path to a `serve.json` style configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Rewrite all not-found requests to `index.html`.
    #[arg(short, long)]
    pub single: bool,

    /// Send `Access-Control-Allow-Origin: *` and allow any method and header.
    #[arg(short = 'C', long)]
    pub cors: bool,

    /// Do not compress responses.
    #[arg(short = 'u', long)]
    pub no_compression: bool,

    /// Do not send weak ETags.
    #[arg(long)]
    pub no_etag: bool,

    /// Follow symbolic links below the served directory.
    #[arg(short = 'S', long)]
    pub symlinks: bool,

    /// Fail instead of picking another port when the requested one is in use.
    #[arg(long)]
    pub no_port_switching: bool,

    /// Do not log each request.
    #[arg(short = 'L', long)]
    pub no_request_logging: bool,

    /// Show debugging information.
    #[arg(short, long)]
    pub debug: bool,

    /// Do not copy the local address to the clipboard.
    #[arg(short = 'n', long)]
    pub no_clipboard: bool,

    /// Path to an SSL/TLS certificate (not supported).
    #[arg(long, value_name = "PATH")]
    pub ssl_cert: Option<PathBuf>,

    /// Path to the SSL/TLS certificate's private key (not supported).
    #[arg(long, value_name = "PATH")]
    pub ssl_key: Option<PathBuf>,

    /// Path to the SSL/TLS certificate's passphrase (not supported).
    #[arg(long, value_name = "PATH")]
    pub ssl_pass: Option<PathBuf>,

    /// Print version information.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

/// Settings shared read-only by every request handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticConfig {
    /// Canonical directory files are served from.
    pub root_directory: PathBuf,
    pub etag_enabled: bool,
    /// `None` when neither the command line nor the config file decided.
    pub symlinks_allowed: Option<bool>,
    pub directory_listing: bool,
}

/// # Effective Settings (`ServeSettings`)
///
/// Everything `handle_serve` needs after arguments, configuration file and
/// environment have been merged and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeSettings {
    pub static_config: StaticConfig,
    /// Endpoints in the order they were given (or the single default).
    pub endpoints: Vec<EndpointSpec>,
    pub single: bool,
    pub cors: bool,
    pub compression: bool,
    pub request_logging: bool,
    pub port_switching: bool,
}

impl ServeSettings {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            compression: self.compression,
            cors: self.cors,
            request_logging: self.request_logging,
        }
    }
}

/// # Load and Merge Configuration (`load_and_merge_config`)
///
/// Builds `ServeSettings` from `args`, the configuration file next to the served
/// directory and the `PORT` environment variable.
///
/// ## Errors
///
/// Returns an error if:
/// - `--ssl-cert` or `--ssl-key` is given (`ServeError::Unsupported`).
/// - The configuration file cannot be read or parsed.
/// - `PORT` is set but is not a valid port.
/// - The directory to serve does not exist or is not a directory.
pub async fn load_and_merge_config(args: ServeArgs) -> Result<ServeSettings> {
    // Reject options we accept for compatibility but cannot honour.
    if args.ssl_cert.is_some() || args.ssl_key.is_some() {
        return Err(ServeError::Unsupported(
            "HTTPS is not supported; remove --ssl-cert and --ssl-key".to_string(),
        )
        .into());
    }
    if args.ssl_pass.is_some() {
        warn!("--ssl-pass has no effect without TLS support");
    }
    if args.no_clipboard {
        debug!("Clipboard integration is not available; --no-clipboard has no effect");
    }

    // Config files are looked up relative to the directory being served.
    let present_dir = env::current_dir().context("Failed to get current working directory")?;
    let loaded = load_configuration(&present_dir, &args.directory, args.config.as_deref())?;
    if let Some(source) = &loaded.source {
        debug!("Using configuration from {}", source.display());
    }

    // `public` from the config (or the positional directory) must be a real directory.
    let root_directory = resolve_directory(&present_dir.join(&loaded.public)).await?;

    // Merge: flags can only switch features off (etag) or on (symlinks) over the file.
    let static_config = StaticConfig {
        root_directory,
        etag_enabled: !args.no_etag && loaded.file.etag.unwrap_or(true),
        symlinks_allowed: if args.symlinks {
            Some(true)
        } else {
            loaded.file.symlinks
        },
        directory_listing: loaded.file.directory_listing_enabled(),
    };

    // No --listen given: fall back to $PORT, then 3000, on all interfaces.
    let endpoints = if args.listen.is_empty() {
        vec![default_endpoint(env::var(PORT_ENV).ok().as_deref())?]
    } else {
        args.listen
    };

    Ok(ServeSettings {
        static_config,
        endpoints,
        single: args.single,
        cors: args.cors,
        compression: !args.no_compression,
        request_logging: !args.no_request_logging,
        port_switching: !args.no_port_switching,
    })
}

/// The endpoint used when no `--listen` is given: `$PORT` if set, else 3000,
/// on all interfaces.
pub fn default_endpoint(env_port: Option<&str>) -> std::result::Result<EndpointSpec, ServeError> {
    let port = match env_port.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw.parse::<u16>().map_err(|_| {
            ServeError::invalid_endpoint(raw, format!("{PORT_ENV} must be a port number"))
        })?,
        None => DEFAULT_TCP_PORT,
    };
    Ok(EndpointSpec::Port { port, host: None })
}

/// # Resolve and Validate Directory Path (`resolve_directory`)
///
/// Canonicalizes `path` (resolving symlinks, `.` and `..`) and checks that it is a
/// directory.
///
/// ## Errors
///
/// Returns an error if the path cannot be canonicalized, its metadata cannot be read,
/// or it is not a directory.
async fn resolve_directory(path: &Path) -> Result<PathBuf> {
    let canonical_path = tokio::fs::canonicalize(path).await.with_context(|| {
        format!(
            "Directory '{}' could not be found or accessed",
            path.display()
        )
    })?;

    let metadata = tokio::fs::metadata(&canonical_path)
        .await
        .with_context(|| format!("Failed to get metadata for path '{}'", canonical_path.display()))?;
    if !metadata.is_dir() {
        anyhow::bail!("Path is not a directory: {}", canonical_path.display());
    }

    info!("Serving directory: {}", canonical_path.display());
    Ok(canonical_path)
}

// --- Unit Tests ---

/// # Unit Tests for Serve Configuration
///
/// Directories are passed as absolute paths so the tests do not depend on the
/// working directory of the test runner.
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> ServeArgs {
        ServeArgs::parse_from(std::iter::once("serve").chain(extra.iter().copied()))
    }

    #[test]
    fn test_argument_defaults() {
        let parsed = args(&[]);

        assert_eq!(parsed.directory, PathBuf::from("."));
        assert!(parsed.listen.is_empty());
        assert!(!parsed.single && !parsed.cors && !parsed.no_etag);
    }

    #[test]
    fn test_listen_is_repeatable_with_alias() {
        let parsed = args(&["-l", "5000", "-p", "tcp://127.0.0.1:8080", "--listen", "unix:/tmp/s.sock"]);

        assert_eq!(
            parsed.listen,
            vec![
                EndpointSpec::Port { port: 5000, host: None },
                EndpointSpec::Port {
                    port: 8080,
                    host: Some("127.0.0.1".into())
                },
                EndpointSpec::UnixSocket(PathBuf::from("/tmp/s.sock")),
            ]
        );
    }

    #[test]
    fn test_invalid_listen_is_rejected() {
        let result = ServeArgs::try_parse_from(["serve", "-l", "ftp://host:21"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            default_endpoint(None).unwrap(),
            EndpointSpec::Port { port: 3000, host: None }
        );
        assert_eq!(
            default_endpoint(Some("8081")).unwrap(),
            EndpointSpec::Port { port: 8081, host: None }
        );
        assert_eq!(
            default_endpoint(Some("")).unwrap(),
            EndpointSpec::Port { port: 3000, host: None }
        );
        assert!(matches!(
            default_endpoint(Some("http")),
            Err(ServeError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_merge_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().to_str().unwrap();

        let settings = load_and_merge_config(args(&[path, "-l", "4000"])).await?;

        assert_eq!(settings.static_config.root_directory, fs::canonicalize(dir.path())?);
        assert!(settings.static_config.etag_enabled);
        assert_eq!(settings.static_config.symlinks_allowed, None);
        assert!(settings.static_config.directory_listing);
        assert_eq!(settings.endpoints, vec![EndpointSpec::Port { port: 4000, host: None }]);
        assert!(settings.compression && settings.request_logging && settings.port_switching);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_flags_over_file() -> Result<()> {
        let dir = TempDir::new()?;
        fs::create_dir(dir.path().join("dist"))?;
        fs::write(
            dir.path().join("serve.json"),
            r#"{ "public": "dist", "etag": true, "symlinks": false, "directoryListing": false }"#,
        )?;
        let path = dir.path().to_str().unwrap();

        let settings = load_and_merge_config(args(&[
            path,
            "-l",
            "4000",
            "--no-etag",
            "--symlinks",
            "--no-compression",
            "--no-port-switching",
            "-C",
            "-s",
        ]))
        .await?;

        let cfg = &settings.static_config;
        assert_eq!(cfg.root_directory, fs::canonicalize(dir.path().join("dist"))?);
        assert!(!cfg.etag_enabled);
        assert_eq!(cfg.symlinks_allowed, Some(true));
        assert!(!cfg.directory_listing);
        assert!(settings.single && settings.cors);
        assert!(!settings.compression && !settings.port_switching);
        Ok(())
    }

    #[tokio::test]
    async fn test_file_settings_apply_without_flags() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("serve.json"),
            r#"{ "etag": false, "symlinks": true }"#,
        )?;
        let path = dir.path().to_str().unwrap();

        let settings = load_and_merge_config(args(&[path, "-l", "4000"])).await?;

        assert!(!settings.static_config.etag_enabled);
        assert_eq!(settings.static_config.symlinks_allowed, Some(true));
        Ok(())
    }

    #[tokio::test]
    async fn test_tls_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();

        let err = load_and_merge_config(args(&[path, "--ssl-cert", "cert.pem"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ServeError>(),
            Some(ServeError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let result = load_and_merge_config(args(&["/path/that/definitely/does/not/exist", "-l", "4000"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_file_is_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let result = resolve_directory(&file).await;
        assert!(result.is_err());
    }
}
