//! # Serve Integration Test Common Helpers
//!
//! File: cli/tests/common.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Shared helpers for the integration tests in `cli/tests/`. Each test file is compiled
//! as its own crate and pulls this module in with `mod common;`.
//!

// Different test files use different helpers.
#![allow(dead_code)]

pub use assert_cmd::Command;

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::process::{Child, ChildStdout, Stdio};
use std::time::Duration;

/// # Get Serve Command (`serve_cmd`)
///
/// An `assert_cmd::Command` for the `serve` binary built for this test run.
///
/// ## Panics
/// Panics if the binary cannot be found.
pub fn serve_cmd() -> Command {
    Command::cargo_bin("serve").expect("Failed to find serve binary for testing")
}

/// A `serve` process running in the background. Killed on drop.
pub struct RunningServe {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl RunningServe {
    /// Starts `serve` with `args`, request logging off and stdout captured.
    pub fn spawn(args: &[&str]) -> Self {
        let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_serve"))
            .args(args)
            .arg("--no-request-logging")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start serve");
        let stdout = BufReader::new(child.stdout.take().expect("stdout is piped"));
        Self { child, stdout }
    }

    /// Reads stdout up to the end of the next startup banner and returns it.
    /// Panics if the process exits first.
    pub fn read_banner(&mut self) -> String {
        let mut banner = String::new();
        let mut rules = 0;
        while rules < 2 {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line).expect("Failed to read stdout");
            assert!(read > 0, "serve exited before printing its banner:\n{banner}");
            if line.trim_start().starts_with("=====") {
                rules += 1;
            }
            banner.push_str(&line);
        }
        banner
    }
}

impl Drop for RunningServe {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Extracts the URL printed after `Local:` in a banner.
pub fn local_url(banner: &str) -> String {
    banner
        .lines()
        .find_map(|line| line.split_once("Local:"))
        .map(|(_, url)| url.trim().to_string())
        .expect("banner has no Local: line")
}

/// Sends a bare HTTP/1.1 GET to `authority` (host:port) and returns the raw response.
pub fn http_get(authority: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(authority).expect("Failed to connect to serve");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("Failed to set read timeout");
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n\r\n"
    )
    .expect("Failed to send request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .expect("Failed to read response");
    response
}
