//! # Symbolic Link Detection
//!
//! File: cli/src/common/fs/links.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Unless symlinks are explicitly allowed, the static file handler refuses to serve
//! anything reached through a symbolic link below the served root. `traverses_symlink`
//! walks the request path one component at a time using `symlink_metadata`, which
//! does not follow links, and reports the first link it meets.
//!
//! The root directory itself is canonicalized at startup, so a root that is itself
//! reached through a link is fine.
//!
//! ## Usage
//!
//! ```rust
//! use crate::common::fs::links;
//!
//! if links::traverses_symlink(&root, Path::new("assets/logo.png")).await {
//!     return not_found();
//! }
//! ```
//!
use std::path::Path;
use tracing::debug;

/// # Traverses Symlink (`traverses_symlink`)
///
/// Returns `true` if any prefix of `relative` joined onto `root` is a symbolic link.
/// Stops at the first component that does not exist (nothing beyond it can be a link).
///
/// ## Arguments
///
/// * `root` - The directory being served.
/// * `relative` - A sanitized path below `root` (no `..` or root components).
pub async fn traverses_symlink(root: &Path, relative: &Path) -> bool {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match tokio::fs::symlink_metadata(&current).await {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                debug!("Refusing symlink at {}", current.display());
                return true;
            }
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}
