//! # Listen Endpoint Parsing
//!
//! File: cli/src/server/endpoint.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Turns a `--listen` value into an `EndpointSpec`. Accepted forms:
//!
//! ```text
//! 3000                      a bare port, all interfaces
//! tcp://[host][:port]       host defaults to localhost, port to 3000
//! unix:/absolute/path       a UNIX domain socket
//! pipe:\\.\name             a Windows named pipe
//! ```
//!
//! Parsing is pure; nothing is bound here.
//!
use crate::core::error::ServeError;
use percent_encoding::percent_decode_str;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Port used by `tcp://` endpoints that omit one.
pub const DEFAULT_TCP_PORT: u16 = 3000;

/// Host used by `tcp://` endpoints that omit one.
pub const DEFAULT_TCP_HOST: &str = "localhost";

const PIPE_PREFIX: &str = r"\\.\";

/// A parsed listen target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSpec {
    /// A TCP port, optionally restricted to one host. Port `0` lets the OS pick.
    Port { port: u16, host: Option<String> },
    /// A Windows named pipe such as `\\.\mypipe`.
    NamedPipe(String),
    /// A UNIX domain socket path.
    UnixSocket(PathBuf),
}

impl EndpointSpec {
    /// The endpoint used when the requested port is taken.
    pub fn ephemeral() -> Self {
        EndpointSpec::Port {
            port: 0,
            host: None,
        }
    }
}

/// # Parse Endpoint (`parse`)
///
/// Parses a raw `--listen` value.
///
/// ## Errors
///
/// Returns `ServeError::InvalidEndpoint` for out-of-range ports, malformed URIs,
/// pipe names without the `\\.\` prefix, empty UNIX socket paths and unknown schemes.
pub fn parse(raw: &str) -> Result<EndpointSpec, ServeError> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let port = raw
            .parse::<u16>()
            .map_err(|_| ServeError::invalid_endpoint(raw, "port must be between 0 and 65535"))?;
        return Ok(EndpointSpec::Port { port, host: None });
    }

    // Backslashes in pipe names do not survive URL parsing, so handle pipes first.
    if raw.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("pipe:")) {
        let pipe = &raw[5..];
        if !pipe.starts_with(PIPE_PREFIX) {
            return Err(ServeError::invalid_endpoint(
                raw,
                format!("Windows named pipes must start with {PIPE_PREFIX}"),
            ));
        }
        return Ok(EndpointSpec::NamedPipe(pipe.to_string()));
    }

    let url = Url::parse(raw).map_err(|e| ServeError::invalid_endpoint(raw, e.to_string()))?;

    match url.scheme() {
        "unix" => {
            let path = percent_decode_str(url.path()).decode_utf8_lossy();
            if path.is_empty() {
                return Err(ServeError::invalid_endpoint(
                    raw,
                    "UNIX domain socket path is empty",
                ));
            }
            Ok(EndpointSpec::UnixSocket(PathBuf::from(path.as_ref())))
        }
        "tcp" => {
            let host = url
                .host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                .filter(|h| !h.is_empty())
                .unwrap_or(DEFAULT_TCP_HOST);
            Ok(EndpointSpec::Port {
                port: url.port().unwrap_or(DEFAULT_TCP_PORT),
                host: Some(host.to_string()),
            })
        }
        other => Err(ServeError::invalid_endpoint(
            raw,
            format!("unknown endpoint scheme (protocol): {other}:"),
        )),
    }
}

impl FromStr for EndpointSpec {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSpec::Port { port, host: None } => write!(f, "{port}"),
            EndpointSpec::Port {
                port,
                host: Some(host),
            } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            EndpointSpec::Port {
                port,
                host: Some(host),
            } => write!(f, "tcp://{host}:{port}"),
            EndpointSpec::NamedPipe(name) => write!(f, "pipe:{name}"),
            EndpointSpec::UnixSocket(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
