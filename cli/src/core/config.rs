//! # Serve Configuration Files
//!
//! File: cli/src/core/config.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module discovers and parses the optional JSON configuration that can sit
//! next to the content being served. The first file that yields a usable section wins;
//! later files are not read at all.
//!
//! Configuration sources (in order of precedence):
//! 1. The file given with `--config` (resolved against the served directory)
//! 2. `serve.json` (the whole document)
//! 3. `now.json` (the `now.static` section, deprecated)
//! 4. `package.json` (the `static` section, deprecated)
//!
//! ## Architecture
//!
//! - A missing optional file is skipped silently. A missing `--config` file is an error.
//! - A file that exists but cannot be read, or is not a JSON object, is an error.
//! - The `public` setting is resolved against the served directory and then made relative
//!   to the working directory, so log output stays short.
//!
//! ## Examples
//!
//! ```json
//! {
//!   "public": "dist",
//!   "etag": true,
//!   "symlinks": false,
//!   "directoryListing": true
//! }
//! ```
//!
//! ```rust
//! let cwd = std::env::current_dir()?;
//! let loaded = config::load_configuration(&cwd, Path::new("./site"), None)?;
//! println!("Serving {}", loaded.public.display());
//! ```
//!
use crate::core::error::{Result, ServeError};
use serde::Deserialize;
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Configuration files probed after an explicit `--config`, in order.
pub const CONFIG_FILES: [&str; 3] = ["serve.json", "now.json", "package.json"];

/// Settings recognised in a configuration section. Unknown keys are ignored so
/// configuration written for other static servers still loads.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Directory to serve, relative to the served directory.
    pub public: Option<String>,
    /// Whether weak ETags are generated.
    pub etag: Option<bool>,
    /// Whether symbolic links below the root may be followed.
    pub symlinks: Option<bool>,
    /// `false` disables listings. Glob lists are accepted and treated as enabled.
    pub directory_listing: Option<Value>,
}

impl FileConfig {
    /// Directory listings are on unless the section explicitly says `false`.
    pub fn directory_listing_enabled(&self) -> bool {
        !matches!(self.directory_listing, Some(Value::Bool(false)))
    }
}

/// The outcome of configuration discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    /// The section that was found, or defaults.
    pub file: FileConfig,
    /// Which file supplied `file`, if any.
    pub source: Option<PathBuf>,
    /// The directory to serve, relative to the working directory when possible.
    pub public: PathBuf,
}

/// # Load Configuration (`load_configuration`)
///
/// Walks the configuration candidates and returns the first usable section,
/// with `public` resolved.
///
/// ## Arguments
///
/// * `present_dir`: The working directory (absolute).
/// * `dir_to_serve`: The directory given on the command line.
/// * `explicit`: The `--config` path, if any.
///
/// ## Errors
///
/// Returns `ServeError::ConfigRead` when a file exists but cannot be read (or an explicit
/// file is missing) and `ServeError::ConfigParse` when it is not a JSON object.
pub fn load_configuration(
    present_dir: &Path,
    dir_to_serve: &Path,
    explicit: Option<&Path>,
) -> Result<LoadedConfig> {
    let serve_root = present_dir.join(dir_to_serve);

    // An explicit --config goes first and must exist; the well-known names are optional.
    let mut candidates: Vec<(PathBuf, bool)> = Vec::with_capacity(CONFIG_FILES.len() + 1);
    if let Some(path) = explicit {
        candidates.push((path.to_path_buf(), true));
    }
    candidates.extend(CONFIG_FILES.iter().map(|name| (PathBuf::from(name), false)));

    let mut found: Option<(FileConfig, PathBuf)> = None;
    for (candidate, is_explicit) in candidates {
        let location = serve_root.join(&candidate);

        // Read the file, skipping optional ones that are simply absent.
        let raw = match fs::read_to_string(&location) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !is_explicit => {
                debug!("No config file at {}", location.display());
                continue;
            }
            Err(source) => {
                return Err(ServeError::ConfigRead {
                    path: location,
                    source,
                }
                .into())
            }
        };

        // Parse as generic JSON first so we can pick the right section out of it.
        let parsed: Value = serde_json::from_str(&raw).map_err(|e| ServeError::ConfigParse {
            path: location.clone(),
            reason: e.to_string(),
        })?;
        if !parsed.is_object() {
            return Err(ServeError::ConfigParse {
                path: location,
                reason: "configuration is not an object".into(),
            }
            .into());
        }

        // `now.json` nests settings under `now.static`, `package.json` under `static`.
        let section = match file_name(&candidate) {
            Some("now.json") => parsed.get("now").and_then(|now| now.get("static")),
            Some("package.json") => parsed.get("static"),
            _ => Some(&parsed),
        };
        let Some(section) = section.filter(|s| !s.is_null()) else {
            debug!("{} has no serve section, skipping", location.display());
            continue;
        };

        // Unknown keys are ignored; known keys with the wrong type are an error.
        let file_config =
            FileConfig::deserialize(section).map_err(|e| ServeError::ConfigParse {
                path: location.clone(),
                reason: e.to_string(),
            })?;

        if matches!(file_name(&candidate), Some("now.json" | "package.json")) {
            warn!(
                "The config files `now.json` and `package.json` are deprecated. Please use `serve.json`."
            );
        }
        // First usable section wins.
        info!("Loaded configuration from {}", location.display());
        found = Some((file_config, location));
        break;
    }

    let (file, source) = match found {
        Some((file, source)) => (file, Some(source)),
        None => (FileConfig::default(), None),
    };

    let public_absolute = match file.public.as_deref() {
        Some(public) => serve_root.join(public),
        None => serve_root.clone(),
    };
    let public = pathdiff::diff_paths(&public_absolute, present_dir).unwrap_or(public_absolute);
    debug!("Public directory resolved to '{}'", public.display());

    Ok(LoadedConfig {
        file,
        source,
        public,
    })
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
