//! # Bound Address Reporting
//!
//! File: cli/src/server/address.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Formats the address a listener actually bound to into the URLs shown to the user:
//! a "local" URL for this machine and, for TCP listeners, a "network" URL using the
//! first external IPv4 address of the host.
//!
//! IPv6 hosts are bracketed (RFC 2732); the IPv6 wildcard `::` is shown as `localhost`.
//!
use crate::common::network;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Where a listener ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    /// A TCP socket address, with the real port after an ephemeral bind.
    Socket(SocketAddr),
    /// A UNIX socket or named pipe path.
    Path(String),
}

impl BoundAddress {
    /// The TCP port, if this is a socket address.
    pub fn port(&self) -> Option<u16> {
        match self {
            BoundAddress::Socket(addr) => Some(addr.port()),
            BoundAddress::Path(_) => None,
        }
    }
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Socket(addr) => write!(f, "{addr}"),
            BoundAddress::Path(path) => f.write_str(path),
        }
    }
}

/// Describes `address` using the host's interfaces for the network URL.
pub fn describe(address: &BoundAddress) -> (Option<String>, Option<String>) {
    let network_ip = match address {
        BoundAddress::Socket(_) => network::external_ipv4(),
        BoundAddress::Path(_) => None,
    };
    describe_with(address, network_ip)
}

/// # Describe Address (`describe_with`)
///
/// Returns `(local_url, network_url)` for `address`, using `network_ip` for the
/// network URL instead of querying the host.
pub fn describe_with(
    address: &BoundAddress,
    network_ip: Option<Ipv4Addr>,
) -> (Option<String>, Option<String>) {
    match address {
        BoundAddress::Path(path) => (Some(path.clone()), None),
        BoundAddress::Socket(addr) => {
            let host = match addr.ip() {
                IpAddr::V6(v6) if v6.is_unspecified() => "localhost".to_string(),
                IpAddr::V6(v6) => format!("[{v6}]"),
                IpAddr::V4(v4) => v4.to_string(),
            };
            let local = format!("http://{}:{}", host, addr.port());
            let network = network_ip.map(|ip| format!("http://{}:{}", ip, addr.port()));
            (Some(local), network)
        }
    }
}
