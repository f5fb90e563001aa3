//! # Static File Handler
//!
//! File: cli/src/server/files.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The handler at the bottom of the request pipeline. File delivery itself (MIME
//! types, ranges, conditional `If-Modified-Since`, `index.html` for directories) is
//! delegated to `tower_http::services::ServeDir`; this module adds the behaviour
//! around it:
//!
//! - **Symlink guard:** paths that pass through a symbolic link below the root are
//!   answered with 404 unless symlinks are allowed.
//! - **Directory listings:** a directory URL (trailing `/`) without an `index.html`
//!   gets an HTML listing when listings are enabled.
//! - **Single-page mode:** unknown paths fall back to the root `index.html`.
//! - **Weak ETags:** `W/"<size>-<mtime>"` on successful responses, with
//!   `If-None-Match` answered by 304 Not Modified.
//!
//! ## Errors
//!
//! Missing or unreadable files are ordinary 404s. Any other I/O error is reported
//! through the `FatalReporter`, which shuts the server down; the request that hit it
//! gets a bare 500 and its connection is closed.
//!
use super::config::StaticConfig;
use super::listing;
use super::pipeline::FatalReporter;
use crate::common::fs::links;
use crate::core::error::{Result, ServeError};
use anyhow::Context;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::debug;

const INDEX_FILE: &str = "index.html";

/// Shared state for the static file handler.
#[derive(Clone)]
pub struct FileServer {
    inner: Arc<Inner>,
}

struct Inner {
    config: StaticConfig,
    delegate: Delegate,
    fatal: FatalReporter,
}

#[derive(Clone)]
enum Delegate {
    Plain(ServeDir),
    SinglePage(ServeDir<ServeFile>),
}

impl FileServer {
    pub fn new(config: StaticConfig, single: bool, fatal: FatalReporter) -> Self {
        let root = &config.root_directory;
        let delegate = if single {
            Delegate::SinglePage(
                ServeDir::new(root).fallback(ServeFile::new(root.join(INDEX_FILE))),
            )
        } else {
            Delegate::Plain(ServeDir::new(root))
        };

        Self {
            inner: Arc::new(Inner {
                config,
                delegate,
                fatal,
            }),
        }
    }

    async fn respond(&self, request: Request) -> Result<Response> {
        let config = &self.inner.config;
        let url_path = request.uri().path().to_string();

        // Paths that do not map cleanly under the root go straight to `ServeDir`.
        if let Some((relative, decoded)) = sanitize(&url_path) {
            // Refuse anything reached through a symlink unless symlinks are allowed.
            if !config.symlinks_allowed.unwrap_or(false)
                && self.crosses_symlink(&relative, &url_path).await
            {
                return Ok(StatusCode::NOT_FOUND.into_response());
            }

            // Directory URLs without an index file get a generated listing.
            if config.directory_listing
                && url_path.ends_with('/')
                && matches!(*request.method(), Method::GET | Method::HEAD)
            {
                if let Some(page) = self.listing(&relative, &decoded).await? {
                    return Ok(page);
                }
            }
        }

        // The request is consumed by the delegate, so keep the validator first.
        let if_none_match = request.headers().get(IF_NONE_MATCH).cloned();
        let response = self.delegate(request).await?;

        if config.etag_enabled {
            Ok(apply_etag(response, if_none_match.as_ref()))
        } else {
            Ok(response)
        }
    }

    async fn crosses_symlink(&self, relative: &Path, url_path: &str) -> bool {
        let root = &self.inner.config.root_directory;
        if links::traverses_symlink(root, relative).await {
            return true;
        }
        url_path.ends_with('/') && links::traverses_symlink(root, &relative.join(INDEX_FILE)).await
    }

    /// Renders a listing for a directory without an index file, `None` otherwise.
    async fn listing(&self, relative: &Path, decoded: &str) -> Result<Option<Response>> {
        let dir = self.inner.config.root_directory.join(relative);
        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir || tokio::fs::try_exists(dir.join(INDEX_FILE)).await.unwrap_or(false) {
            return Ok(None);
        }

        debug!("Rendering directory listing for {}", dir.display());
        let page = listing::render(&dir, decoded)
            .await
            .map_err(|source| ServeError::Request { source })
            .with_context(|| format!("Failed to list directory {}", dir.display()))?;
        Ok(Some(Html(page).into_response()))
    }

    async fn delegate(&self, request: Request) -> Result<Response> {
        let served = match self.inner.delegate.clone() {
            Delegate::Plain(mut dir) => dir.try_call(request).await,
            Delegate::SinglePage(mut dir) => dir.try_call(request).await,
        };
        let response = served.map_err(|source| ServeError::Request { source })?;
        Ok(response.map(Body::new))
    }
}

/// # Serve Files (`serve_files`)
///
/// Router fallback that serves every request from the static root.
///
/// A handler error is never recovered here: it goes to the `FatalReporter`, which
/// stops the whole server. axum needs a response for the connection, so the client
/// still gets a bare 500 with `Connection: close` while the shutdown runs.
pub async fn serve_files(State(files): State<FileServer>, request: Request) -> Response {
    match files.respond(request).await {
        Ok(response) => response,
        Err(err) => {
            files.inner.fatal.report(err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONNECTION, HeaderValue::from_static("close"))],
            )
                .into_response()
        }
    }
}

/// Decodes a URL path into a path relative to the root plus its decoded form.
/// Returns `None` for paths that are not valid UTF-8 once decoded or that try to
/// leave the root; those are left to `ServeDir`, which rejects them itself.
fn sanitize(url_path: &str) -> Option<(PathBuf, String)> {
    let decoded = percent_decode_str(url_path).decode_utf8().ok()?.into_owned();
    let mut relative = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some((relative, decoded))
}

fn apply_etag(mut response: Response, if_none_match: Option<&HeaderValue>) -> Response {
    // Partial content, redirects and errors keep whatever `ServeDir` produced.
    if response.status() != StatusCode::OK {
        return response;
    }
    // Listings and the like carry no size or date to build a tag from.
    let Some(etag) = weak_etag(response.headers()) else {
        return response;
    };

    let matched = if_none_match
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| etag_matches(value, &etag));

    // The client already has this version: answer 304 with an empty body.
    if matched {
        let mut not_modified = StatusCode::NOT_MODIFIED.into_response();
        if let Some(modified) = response.headers().get(LAST_MODIFIED) {
            not_modified
                .headers_mut()
                .insert(LAST_MODIFIED, modified.clone());
        }
        not_modified.headers_mut().insert(ETAG, etag);
        return not_modified;
    }

    // Otherwise serve the file as usual and advertise the tag.
    response.headers_mut().insert(ETAG, etag);
    response
}

/// Builds `W/"<size hex>-<mtime hex>"` from the delegate's response headers.
fn weak_etag(headers: &HeaderMap) -> Option<HeaderValue> {
    let size: u64 = headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()?;
    let modified = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    let modified = chrono::DateTime::parse_from_rfc2822(modified).ok()?;
    HeaderValue::from_str(&format!("W/\"{:x}-{:x}\"", size, modified.timestamp())).ok()
}

/// Weak comparison against an `If-None-Match` list.
fn etag_matches(if_none_match: &str, etag: &HeaderValue) -> bool {
    let Ok(etag) = etag.to_str() else {
        return false;
    };
    let opaque = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let ours = opaque(etag);
    if_none_match
        .split(',')
        .any(|candidate| candidate.trim() == "*" || opaque(candidate) == ours)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::header;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(root.join("app.js"), "console.log(1)").unwrap();
        std::fs::create_dir(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/guide.txt"), "guide").unwrap();
        Fixture { _dir: dir, root }
    }

    fn config(root: &Path) -> StaticConfig {
        StaticConfig {
            root_directory: root.to_path_buf(),
            etag_enabled: true,
            symlinks_allowed: None,
            directory_listing: true,
        }
    }

    fn server(config: StaticConfig, single: bool) -> FileServer {
        let (fatal, _rx) = FatalReporter::channel();
        FileServer::new(config, single, fatal)
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize("/docs/my%20file.txt"),
            Some((PathBuf::from("docs/my file.txt"), "/docs/my file.txt".into()))
        );
        assert_eq!(sanitize("/"), Some((PathBuf::new(), "/".into())));
        assert_eq!(sanitize("/../etc/passwd"), None);
        assert_eq!(sanitize("/a/%2e%2e/b"), None);
    }

    #[test]
    fn test_etag_matching() {
        let etag = HeaderValue::from_static("W/\"5-64\"");
        assert!(etag_matches("W/\"5-64\"", &etag));
        assert!(etag_matches("\"other\", \"5-64\"", &etag));
        assert!(etag_matches("*", &etag));
        assert!(!etag_matches("W/\"6-64\"", &etag));
    }

    #[tokio::test]
    async fn test_serves_file_with_weak_etag() {
        let fx = fixture();
        let files = server(config(&fx.root), false);

        let response = files.respond(get("/app.js")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let etag = response.headers()[ETAG].to_str().unwrap().to_string();
        assert!(etag.starts_with("W/\"e-"));
        assert_eq!(body_string(response).await, "console.log(1)");
    }

    #[tokio::test]
    async fn test_if_none_match_returns_not_modified() {
        let fx = fixture();
        let files = server(config(&fx.root), false);

        let first = files.respond(get("/app.js")).await.unwrap();
        let etag = first.headers()[ETAG].clone();

        let request = Request::builder()
            .uri("/app.js")
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap();
        let second = files.respond(request).await.unwrap();

        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert!(body_string(second).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_etag_when_disabled() {
        let fx = fixture();
        let mut cfg = config(&fx.root);
        cfg.etag_enabled = false;

        let response = server(cfg, false).respond(get("/app.js")).await.unwrap();

        assert!(!response.headers().contains_key(ETAG));
    }

    #[tokio::test]
    async fn test_directory_without_index_is_listed() {
        let fx = fixture();
        let files = server(config(&fx.root), false);

        let response = files.respond(get("/docs/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let page = body_string(response).await;
        assert!(page.contains("Index of /docs/"));
        assert!(page.contains("guide.txt"));
    }

    #[tokio::test]
    async fn test_directory_listing_disabled() {
        let fx = fixture();
        let mut cfg = config(&fx.root);
        cfg.directory_listing = false;

        let response = server(cfg, false).respond(get("/docs/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_with_index_serves_index() {
        let fx = fixture();
        let files = server(config(&fx.root), false);

        let response = files.respond(get("/")).await.unwrap();

        assert_eq!(body_string(response).await, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_single_page_fallback() {
        let fx = fixture();

        let plain = server(config(&fx.root), false)
            .respond(get("/some/client/route"))
            .await
            .unwrap();
        assert_eq!(plain.status(), StatusCode::NOT_FOUND);

        let single = server(config(&fx.root), true)
            .respond(get("/some/client/route"))
            .await
            .unwrap();
        assert_eq!(single.status(), StatusCode::OK);
        assert_eq!(body_string(single).await, "<h1>home</h1>");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_refused_unless_allowed() {
        let fx = fixture();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), fx.root.join("link.txt"))
            .unwrap();

        let refused = server(config(&fx.root), false)
            .respond(get("/link.txt"))
            .await
            .unwrap();
        assert_eq!(refused.status(), StatusCode::NOT_FOUND);

        let mut cfg = config(&fx.root);
        cfg.symlinks_allowed = Some(true);
        let allowed = server(cfg, false).respond(get("/link.txt")).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(body_string(allowed).await, "secret");
    }

    #[tokio::test]
    async fn test_fatal_errors_are_reported() {
        let (fatal, mut rx) = FatalReporter::channel();
        fatal.report(anyhow::anyhow!("disk on fire"));

        let reported = rx.recv().await.unwrap();
        assert_eq!(reported.to_string(), "disk on fire");
    }
    /// An I/O error other than "not found" stops the server instead of being
    /// recovered: it is reported as fatal and the connection is closed.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_unexpected_io_error_is_escalated() {
        let fx = fixture();
        let (fatal, mut rx) = FatalReporter::channel();
        let files = FileServer::new(config(&fx.root), false, fatal);

        // Longer than any file name the OS accepts.
        let uri = format!("/{}", "a".repeat(300));
        let response = serve_files(State(files), get(&uri)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONNECTION], "close");
        assert!(body_string(response).await.is_empty());

        let reported = rx.try_recv().unwrap();
        assert!(matches!(
            reported.downcast_ref::<ServeError>(),
            Some(ServeError::Request { .. })
        ));
    }
}
