//! # Serve Filesystem Utilities (`common::fs`)
//!
//! File: cli/src/common/fs/mod.rs
//! Author: Christi Mahu
//!

//! ## Overview
//!
//! Filesystem helpers shared by the static file handler.
//!
//! - **`links`**: Detects symbolic links along a request path so they can be refused
//!   unless `--symlinks` (or `"symlinks": true` in the config file) allows them.
//!

/// Symbolic link detection (`traverses_symlink`).
pub mod links;
