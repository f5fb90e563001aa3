//! # Serve Utilities
//!
//! File: cli/src/server/utils.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Small helpers that support the server without being part of request handling:
//! - Debug logging of the served directory at startup
//! - File size and modification time formatting for directory listings
//!
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// # Log Directory Contents (`log_directory_contents`)
///
/// Logs the entries of `path` at DEBUG level, marking each as a file or directory.
/// Failures to read the directory or an entry's metadata are logged as warnings.
pub fn log_directory_contents(path: &Path) {
    debug!("Directory contents for {}:", path.display());

    match std::fs::read_dir(path) {
        Ok(entries) => {
            let mut entry_count = 0;

            for entry in entries.filter_map(Result::ok) {
                entry_count += 1;

                if let Ok(metadata) = entry.metadata() {
                    let file_type = if metadata.is_dir() { "DIR " } else { "FILE" };
                    debug!("  - {} : {}", file_type, entry.file_name().to_string_lossy());
                } else {
                    warn!(
                        "  - Could not read metadata for: {}",
                        entry.path().display()
                    );
                }
            }

            if entry_count == 0 {
                debug!("  (Empty directory)");
            }
        }
        Err(e) => {
            warn!(
                "Could not read directory contents for '{}': {}",
                path.display(),
                e
            );
        }
    }
}

/// # Format File Size (`human_readable_size`)
///
/// Converts a size in bytes to a string using B, KB, MB, GB, TB or PB.
/// Bytes are shown without decimals, larger units with one decimal place.
///
/// ## Returns
///
/// * `String`: The formatted size (e.g., "123 B", "1.2 KB", "1.1 GB").
pub fn human_readable_size(size: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if size == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let exponent = ((size as f64).ln() / base.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let unit = UNITS[exponent];
    let scaled = size as f64 / base.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", scaled, unit)
    } else {
        format!("{:.1} {}", scaled, unit)
    }
}

/// # Format Modification Time (`format_modification_time`)
///
/// Formats `time` as "YYYY-MM-DD HH:MM:SS" (UTC), or "Unknown" if it predates the
/// Unix epoch or is out of range.
pub fn format_modification_time(time: SystemTime) -> String {
    let Ok(duration) = time.duration_since(std::time::UNIX_EPOCH) else {
        return "Unknown".to_string();
    };

    chrono::DateTime::<chrono::Utc>::from_timestamp(
        duration.as_secs() as i64,
        duration.subsec_nanos(),
    )
    .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_else(|| "Unknown".to_string())
}

// --- Unit Tests ---
