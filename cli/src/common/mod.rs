//! # Serve Common Utilities (`common`)
//!
//! File: cli/src/common/mod.rs
//! Author: Christi Mahu
//!

//! ## Overview
//!
//! Shared helpers that are not specific to one part of the server:
//!
//! - **`fs`**: Filesystem checks used while serving files (symlink detection).
//! - **`network`**: Host network discovery (the first external IPv4 address).
//! - **`ui`**: Terminal output, mainly the startup banner printed for each endpoint.
//!
//! ## Usage
//!
//! ```rust
//! use crate::common::{network, ui};
//!
//! let ip = network::external_ipv4();
//! ui::print_server_info(&settings.static_config.root_directory, &server.info);
//! ```
//!

/// Filesystem helpers (symlink detection).
pub mod fs;
/// Network discovery (external IPv4 address).
pub mod network;
/// Terminal output (startup banner).
pub mod ui;
