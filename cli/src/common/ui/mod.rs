//! # Serve UI Utilities Module (`common::ui`)
//!
//! File: cli/src/common/ui/mod.rs
//! Author: Christi Mahu
//!

//! ## Overview
//!
//! Terminal output for humans. Log lines go to stderr through `tracing`; the startup
//! banner goes to stdout so it stays readable (and scriptable) when logs are filtered.
//!
//! ## Banner
//!
//! One banner is printed per started endpoint:
//!
//! ```text
//! =================================================================
//!  Serving!
//!
//!  📂 Directory: /home/me/site
//!  🌐 Local:     http://localhost:3000
//!  🔗 Network:   http://192.168.1.20:3000
//!
//!  ⚠️  This port was picked because 3000 is in use.
//! =================================================================
//! ```
//!
use crate::server::bootstrap::BoundServerInfo;
use std::fmt::Write;
use std::path::Path;

const RULE: &str = "=================================================================";

/// # Server Banner (`server_banner`)
///
/// Formats the startup banner for one endpoint serving `root`.
pub fn server_banner(root: &Path, info: &BoundServerInfo) -> String {
    let mut banner = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(banner, "{RULE}");
    let _ = writeln!(banner, " Serving!");
    let _ = writeln!(banner);
    let _ = writeln!(banner, " 📂 Directory: {}", root.display());
    if let Some(local) = &info.local_url {
        let _ = writeln!(banner, " 🌐 Local:     {local}");
    }
    if let Some(network) = &info.network_url {
        let _ = writeln!(banner, " 🔗 Network:   {network}");
    }
    if let Some(requested) = info.requested_port {
        let _ = writeln!(banner);
        let _ = writeln!(
            banner,
            " ⚠️  This port was picked because {requested} is in use."
        );
    }
    let _ = write!(banner, "{RULE}");
    banner
}

/// Prints the startup banner for one endpoint to stdout.
pub fn print_server_info(root: &Path, info: &BoundServerInfo) {
    println!("\n{}\n", server_banner(root, info));
}
