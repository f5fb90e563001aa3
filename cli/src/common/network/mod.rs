//! # Serve Network Utilities Module (`common::network`)
//!
//! File: cli/src/common/network/mod.rs
//! Author: Christi Mahu
//!

//! ## Overview
//!
//! Network discovery helpers used when reporting where the server can be reached.
//! The only question asked of the host is "which IPv4 address would another machine
//! on the LAN use to reach us?", answered by walking the interface list.
//!
//! ## Usage
//!
//! ```rust
//! use crate::common::network;
//!
//! if let Some(ip) = network::external_ipv4() {
//!     println!("Network URL: http://{}:{}", ip, port);
//! }
//! ```
//!
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

/// # External IPv4 Address (`external_ipv4`)
///
/// Returns the first non-loopback IPv4 address in interface enumeration order,
/// or `None` when there is none or the interfaces cannot be read.
pub fn external_ipv4() -> Option<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            let ip = first_external_ipv4(
                interfaces
                    .iter()
                    .map(|iface| (iface.ip(), iface.is_loopback())),
            );
            debug!("Detected network address: {:?}", ip);
            ip
        }
        Err(e) => {
            warn!("Could not enumerate network interfaces: {}", e);
            None
        }
    }
}

/// Picks the first IPv4 address that is not marked as loopback. First match wins.
pub fn first_external_ipv4<I>(candidates: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = (IpAddr, bool)>,
{
    candidates
        .into_iter()
        .find_map(|(ip, loopback)| match ip {
            IpAddr::V4(v4) if !loopback => Some(v4),
            _ => None,
        })
}
