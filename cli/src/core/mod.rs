//! # Serve Core Infrastructure
//!
//! File: cli/src/core/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! This module aggregates the foundational pieces shared by the server:
//! - `config`: Discovery and parsing of `serve.json` / `now.json` / `package.json`
//! - `error`: Error types and the crate-wide `Result` alias
//!
//! ## Usage
//!
//! ```rust
//! use crate::core::config; // For loading configuration files
//! use crate::core::error::{Result, ServeError}; // For error handling
//! ```
//!
pub mod config;
pub mod error;
