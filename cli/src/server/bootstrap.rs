//! # Server Bootstrap
//!
//! File: cli/src/server/bootstrap.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Binds one listen endpoint and starts serving on it. This is where port collisions
//! are handled: if a numeric port is already taken, the bootstrap binds an ephemeral
//! port instead and remembers which port the user originally asked for, so the banner
//! can explain the switch.
//!
//! ## Architecture
//!
//! Binding is a small state machine driven by a bounded loop:
//!
//! ```text
//! Idle ──▶ Binding ──▶ Bound
//!             │  ▲
//!   AddrInUse │  │ candidate = Port(0, None)
//!             ▼  │
//!        CollisionRetry
//!             │
//!             └──▶ Failed (port switching disabled, or any other bind error)
//! ```
//!
//! The real bind is attempted first and "address in use" is read from the OS error,
//! so there is no window between checking a port and taking it.
//!
//! Once bound:
//! 1. A close callback is registered with the `ShutdownRegistry`.
//! 2. The listener is handed to `axum::serve` on its own task, with graceful shutdown
//!    wired to that callback.
//! 3. The bound address is turned into URLs for the banner.
//!
use super::address::{self, BoundAddress};
use super::endpoint::EndpointSpec;
use super::pipeline::ClientAddr;
use super::shutdown::ShutdownRegistry;
use crate::core::error::{Result, ServeError};
use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use tokio::net::{lookup_host, TcpListener};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::UnixListener;

/// Upper bound on bind attempts for one endpoint. A collision always retries on
/// port 0, so more than two attempts never happen in practice.
pub const MAX_BIND_ATTEMPTS: usize = 3;

/// What the user needs to know about a started endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundServerInfo {
    /// The address actually bound.
    pub address: BoundAddress,
    /// URL for this machine, or the socket/pipe path.
    pub local_url: Option<String>,
    /// URL for other machines on the network, when one could be determined.
    pub network_url: Option<String>,
    /// The port that was asked for, set only when it was taken and an ephemeral
    /// port was used instead.
    pub requested_port: Option<u16>,
}

/// A started endpoint and the task serving it.
#[derive(Debug)]
pub struct RunningServer {
    pub info: BoundServerInfo,
    task: JoinHandle<Result<()>>,
}

impl RunningServer {
    /// Waits until the server has shut down and drained its connections.
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .context("Server task terminated abnormally")?
    }
}

/// # Start Endpoint (`start`)
///
/// Binds `spec` (switching to an ephemeral port on collision when `port_switching`
/// is set), registers the listener's close callback with `registry` and starts serving `app`.
///
/// ## Errors
///
/// - `ServeError::PortInUse` when the port is taken and switching is disabled.
/// - `ServeError::Bind` for every other bind failure (permissions, bad paths, ...).
pub async fn start(
    spec: EndpointSpec,
    app: Router,
    registry: &ShutdownRegistry,
    port_switching: bool,
) -> Result<RunningServer> {
    debug!("Starting endpoint {}", spec);
    let (listener, requested_port) = bind_endpoint(spec, port_switching).await?;
    let address = listener
        .local_address()
        .context("Failed to read the bound address")?;

    let (close_tx, close_rx) = oneshot::channel::<()>();
    let closing = address.clone();
    registry.register(move || {
        debug!("Closing listener on {}", closing);
        let _ = close_tx.send(());
    });

    let task = tokio::spawn(listener.serve(app, close_rx));

    let (local_url, network_url) = address::describe(&address);
    info!("Listening on {}", address);

    Ok(RunningServer {
        info: BoundServerInfo {
            address,
            local_url,
            network_url,
            requested_port,
        },
        task,
    })
}

/// # Bind Endpoint (`bind_endpoint`)
///
/// Runs the bind loop for `spec`. Returns the listener together with the originally
/// requested port when a collision forced a switch to an ephemeral port.
async fn bind_endpoint(
    spec: EndpointSpec,
    port_switching: bool,
) -> Result<(BoundListener, Option<u16>)> {
    bind_endpoint_with(spec, port_switching, |candidate| async move {
        bind_once(&candidate).await
    })
    .await
}

/// The bind loop itself, with the single bind attempt supplied by `bind`.
async fn bind_endpoint_with<F, Fut>(
    spec: EndpointSpec,
    port_switching: bool,
    mut bind: F,
) -> Result<(BoundListener, Option<u16>)>
where
    F: FnMut(EndpointSpec) -> Fut,
    Fut: Future<Output = io::Result<BoundListener>>,
{
    let mut candidate = spec;
    // Set on the first collision and carried through every later attempt.
    let mut requested_port: Option<u16> = None;

    for attempt in 1..=MAX_BIND_ATTEMPTS {
        debug!("Bind attempt {} for {}", attempt, candidate);

        // Try the real bind first; the OS tells us whether the port is taken.
        let source = match bind(candidate.clone()).await {
            Ok(listener) => return Ok((listener, requested_port)),
            Err(e) => e,
        };

        // Only a concrete TCP port can collide. Port 0 is picked by the OS.
        let taken_port = match &candidate {
            EndpointSpec::Port { port, .. } if *port != 0 => Some(*port),
            _ => None,
        };
        match taken_port {
            Some(port) if source.kind() == io::ErrorKind::AddrInUse => {
                if !port_switching {
                    return Err(ServeError::PortInUse { port }.into());
                }
                warn!(
                    "Port {} is already in use, switching to an available port.",
                    port
                );
                // Remember what the user asked for, then retry on any free port.
                requested_port.get_or_insert(port);
                candidate = EndpointSpec::ephemeral();
            }
            // Anything else (permissions, bad socket path, ...) is not retried.
            _ => {
                return Err(ServeError::Bind {
                    endpoint: candidate.to_string(),
                    source,
                }
                .into())
            }
        }
    }

    anyhow::bail!(
        "Could not bind {} after {} attempts",
        candidate,
        MAX_BIND_ATTEMPTS
    )
}

async fn bind_once(spec: &EndpointSpec) -> io::Result<BoundListener> {
    match spec {
        EndpointSpec::Port { port, host: None } => {
            // Dual-stack wildcard first, plain IPv4 when the host has no IPv6 stack.
            let wildcard_v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, *port));
            match TcpListener::bind(wildcard_v6).await {
                Ok(listener) => Ok(BoundListener::Tcp(listener)),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(e),
                Err(e) => {
                    debug!("IPv6 wildcard bind failed ({}), falling back to 0.0.0.0", e);
                    let wildcard_v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, *port));
                    TcpListener::bind(wildcard_v4).await.map(BoundListener::Tcp)
                }
            }
        }
        EndpointSpec::Port {
            port,
            host: Some(host),
        } => {
            // Resolve ourselves so a collision on any address of the host is seen.
            let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), *port)).await?.collect();
            bind_addrs(&addrs).await.map(BoundListener::Tcp)
        }
        // Sockets and pipes have no port to switch, so their errors pass straight through.
        EndpointSpec::UnixSocket(path) => bind_unix(path),
        EndpointSpec::NamedPipe(name) => bind_pipe(name),
    }
}

/// # Bind Resolved Addresses (`bind_addrs`)
///
/// Binds the first address in `addrs` that accepts the listener. An `AddrInUse` on
/// any of them is returned as-is instead of moving on to the next address, so a host
/// like `localhost` (`127.0.0.1` and `::1`) counts as taken when either is taken.
async fn bind_addrs(addrs: &[SocketAddr]) -> io::Result<TcpListener> {
    let mut bound: Option<TcpListener> = None;
    let mut last_error: Option<io::Error> = None;
    let mut seen: Vec<SocketAddr> = Vec::with_capacity(addrs.len());

    for addr in addrs {
        // Resolvers may repeat an address; binding it twice would collide with ourselves.
        if seen.contains(addr) {
            continue;
        }
        seen.push(*addr);

        // With port 0 every address gets its own port, so the first listener is final.
        if bound.is_some() && addr.port() == 0 {
            break;
        }

        match TcpListener::bind(addr).await {
            // Keep the first listener; later binds only check the port is free there too.
            Ok(listener) => {
                if bound.is_none() {
                    bound = Some(listener);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => return Err(e),
            Err(e) => {
                debug!("Could not bind {} ({}), trying the next address", addr, e);
                last_error = Some(e);
            }
        }
    }

    bound.ok_or_else(|| {
        last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host did not resolve to any address")
        })
    })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> io::Result<BoundListener> {
    UnixListener::bind(path).map(|listener| BoundListener::Unix {
        listener,
        path: path.to_path_buf(),
    })
}

#[cfg(not(unix))]
fn bind_unix(_path: &Path) -> io::Result<BoundListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "UNIX domain sockets are not supported on this platform",
    ))
}

#[cfg(windows)]
fn bind_pipe(name: &str) -> io::Result<BoundListener> {
    super::pipe::PipeListener::bind(name).map(BoundListener::Pipe)
}

#[cfg(not(windows))]
fn bind_pipe(_name: &str) -> io::Result<BoundListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Windows named pipes are not supported on this platform",
    ))
}

/// A bound listener of any supported kind.
enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
    #[cfg(windows)]
    Pipe(super::pipe::PipeListener),
}

impl BoundListener {
    fn local_address(&self) -> io::Result<BoundAddress> {
        match self {
            BoundListener::Tcp(listener) => listener.local_addr().map(BoundAddress::Socket),
            #[cfg(unix)]
            BoundListener::Unix { path, .. } => Ok(BoundAddress::Path(path.display().to_string())),
            #[cfg(windows)]
            BoundListener::Pipe(listener) => Ok(BoundAddress::Path(listener.name().to_string())),
        }
    }

    /// Serves `app` until `close` fires (or its sender is dropped), then drains
    /// in-flight requests.
    async fn serve(self, app: Router, close: oneshot::Receiver<()>) -> Result<()> {
        let shutdown = async move {
            let _ = close.await;
        };
        let make_service = app.into_make_service_with_connect_info::<ClientAddr>();

        match self {
            BoundListener::Tcp(listener) => {
                axum::serve(listener, make_service)
                    .with_graceful_shutdown(shutdown)
                    .await
                    .context("HTTP server failed")?;
            }
            #[cfg(unix)]
            BoundListener::Unix { listener, path } => {
                let served = axum::serve(listener, make_service)
                    .with_graceful_shutdown(shutdown)
                    .await;
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!("Could not remove socket file {}: {}", path.display(), e);
                }
                served.context("HTTP server failed")?;
            }
            #[cfg(windows)]
            BoundListener::Pipe(listener) => {
                axum::serve(listener, make_service)
                    .with_graceful_shutdown(shutdown)
                    .await
                    .context("HTTP server failed")?;
            }
        }

        debug!("Listener closed");
        Ok(())
    }
}

// --- Unit Tests ---
