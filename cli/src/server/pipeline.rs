//! # Request Pipeline
//!
//! File: cli/src/server/pipeline.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Builds the Axum `Router` every listener serves. Each request goes through these
//! layers, outermost first:
//!
//! 1. Request logging: "<timestamp> <client> <METHOD> <url>" on arrival, then
//!    "Returned <status> in <ms> ms" once the response is ready (unless disabled).
//! 2. `TraceLayer` spans at DEBUG level.
//! 3. Permissive CORS headers (when enabled).
//! 4. Response compression negotiated from `Accept-Encoding` (unless disabled).
//! 5. The static file handler in `server::files`.
//!
//! ## Fatal Errors
//!
//! A request that fails with an unexpected I/O error is answered with a 500, and the
//! error is sent through a `FatalReporter` channel. The serve loop treats anything on
//! that channel as fatal and shuts the process down with a failure status.
//!
use super::files::{self, FileServer};
use axum::extract::connect_info::Connected;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::serve::IncomingStream;
use axum::Router;
use chrono::Local;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

/// Which optional layers to put around the file handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub compression: bool,
    pub cors: bool,
    pub request_logging: bool,
}

/// # Build Router (`build_router`)
///
/// Wraps `files` in the layers selected by `options`. The returned router is cloned
/// once per listener.
pub fn build_router(files: FileServer, options: PipelineOptions) -> Router {
    // Every path is served by the file handler.
    let mut app = Router::new()
        .fallback(files::serve_files)
        .with_state(files);

    // Layers wrap what came before, so the last one added runs first.
    // Compression picks the encoding from Accept-Encoding.
    if options.compression {
        app = app.layer(CompressionLayer::new());
    }
    if options.cors {
        info!("CORS enabled (permissive).");
        app = app.layer(CorsLayer::permissive());
    }

    // Per-request spans, only visible with --debug or RUST_LOG.
    app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
    );

    // Outermost, so the logged time covers the whole stack.
    if options.request_logging {
        app = app.layer(middleware::from_fn(log_request));
    }
    app
}

/// Logs one line when a request arrives and one when its response is ready.
async fn log_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let client = request
        .extensions()
        .get::<ConnectInfo<ClientAddr>>()
        .map(|ConnectInfo(client)| client.to_string())
        .unwrap_or_else(|| ClientAddr::UNKNOWN.to_string());

    info!(
        "{} {} {} {}",
        timestamp,
        client,
        request.method(),
        request.uri()
    );

    let response = next.run(request).await;

    info!(
        "{} {} Returned {} in {} ms",
        timestamp,
        client,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// The remote address of a connection, as shown in request logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(Option<String>);

impl ClientAddr {
    const UNKNOWN: &'static str = "unknown";

    pub fn new(raw: Option<&str>) -> Self {
        Self(raw.map(|ip| ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()))
    }
}

impl std::fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or(Self::UNKNOWN))
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for ClientAddr {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        ClientAddr::new(Some(&stream.remote_addr().ip().to_string()))
    }
}

#[cfg(unix)]
impl Connected<IncomingStream<'_, tokio::net::UnixListener>> for ClientAddr {
    fn connect_info(_stream: IncomingStream<'_, tokio::net::UnixListener>) -> Self {
        ClientAddr(None)
    }
}

#[cfg(windows)]
impl Connected<IncomingStream<'_, super::pipe::PipeListener>> for ClientAddr {
    fn connect_info(_stream: IncomingStream<'_, super::pipe::PipeListener>) -> Self {
        ClientAddr(None)
    }
}

/// Sends request-handling failures to the serve loop, which stops the process.
#[derive(Debug, Clone)]
pub struct FatalReporter(mpsc::UnboundedSender<anyhow::Error>);

impl FatalReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<anyhow::Error>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn report(&self, err: anyhow::Error) {
        error!("{:#}", err);
        if self.0.send(err).is_err() {
            warn!("Fatal error reported after the server stopped");
        }
    }
}
