//! HTTP endpoints.
//!
//! - `GET /files/{*path}` runs the generator for `path` and returns its bytes
//! - `GET /hashes/{*path}` runs it, stores the result in the object cache and
//!   returns the digest
//! - `GET /objects/{hash}` returns a cached object
//! - `GET /status` and `GET /health` for operators
//!
//! The caller may name itself with the `X-Filegen-Machine` header or a
//! `machine` query parameter. Other query parameters are passed to the
//! generator as metadata.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use filegen::{escape_html, FilegenError, GeneratedFile, Manager, ReloadSupervisor, Request};
use objectcache::{Digest, ObjectCache, ObjectStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{instrument, warn};

pub const MACHINE_HEADER: &str = "x-filegen-machine";

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub cache: Arc<ObjectCache>,
    /// Absent when no generator configuration file is watched.
    pub supervisor: Option<Arc<ReloadSupervisor>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manager: Arc<Manager>, cache: Arc<ObjectCache>) -> Self {
        Self {
            manager,
            cache,
            supervisor: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_supervisor(mut self, supervisor: Arc<ReloadSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files/{*path}", get(serve_file))
        .route("/hashes/{*path}", get(serve_hash))
        .route("/objects/{hash}", get(serve_object))
        .route("/status", get(serve_status))
        .route("/health", get(handle_health))
        .with_state(state)
}

#[derive(Debug)]
pub enum WebError {
    Filegen(FilegenError),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<FilegenError> for WebError {
    fn from(err: FilegenError) -> Self {
        Self::Filegen(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Filegen(err) if err.is_not_found() => (StatusCode::NOT_FOUND, err.to_string()),
            Self::Filegen(err) => {
                warn!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => {
                warn!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, message).into_response()
    }
}

/// Build a generator request from the URL path, headers and query.
fn build_request(path: &str, headers: &HeaderMap, mut query: BTreeMap<String, String>) -> Request {
    let mut request = Request::new(path);

    let from_header = headers
        .get(MACHINE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let from_query = query.remove("machine");
    if let Some(machine) = from_header.or(from_query) {
        request = request.with_machine(machine);
    }

    request.metadata = query;
    request
}

fn cache_control(file: &GeneratedFile) -> HeaderValue {
    match file.valid_until {
        Some(valid_until) => {
            let remaining = valid_until
                .duration_since(SystemTime::now())
                .unwrap_or_default()
                .as_secs();
            HeaderValue::from_str(&format!("max-age={remaining}"))
                .unwrap_or(HeaderValue::from_static("no-cache"))
        }
        None => HeaderValue::from_static("no-cache"),
    }
}

#[instrument(skip(state, headers, query), fields(machine = tracing::field::Empty))]
async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Response, WebError> {
    let request = build_request(&path, &headers, query);
    if let Some(machine) = &request.machine {
        tracing::Span::current().record("machine", machine.as_str());
    }

    let file = state.manager.get_file(&request).await?;
    let cache_control = cache_control(&file);

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CACHE_CONTROL, cache_control),
        ],
        file.data,
    )
        .into_response())
}

#[instrument(skip(state, headers, query))]
async fn serve_hash(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<serde_json::Value>, WebError> {
    let request = build_request(&path, &headers, query);
    let file = state.manager.get_file(&request).await?;

    let size = file.data.len();
    let cache = Arc::clone(&state.cache);
    let digest = tokio::task::spawn_blocking(move || cache.store(&file.data))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))?
        .map_err(|e| WebError::Internal(format!("{e:#}")))?;

    Ok(Json(serde_json::json!({
        "path": request.path,
        "hash": digest.to_hex(),
        "size": size,
    })))
}

#[instrument(skip(state))]
async fn serve_object(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, WebError> {
    let digest: Digest = hash
        .parse()
        .map_err(|e| WebError::BadRequest(format!("invalid hash: {e}")))?;

    let cache = Arc::clone(&state.cache);
    let data = tokio::task::spawn_blocking(move || cache.retrieve(&digest))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))?
        .map_err(|e| WebError::Internal(format!("{e:#}")))?
        .ok_or_else(|| WebError::NotFound(format!("no object {hash}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            ),
        ],
        data,
    )
        .into_response())
}

async fn serve_status(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let mut page = Vec::new();
    page.extend_from_slice(b"<!DOCTYPE html>\n<html><head><title>filegen-server</title></head><body>\n");
    page.extend_from_slice(format!("<h1>filegen-server {}</h1>\n", env!("CARGO_PKG_VERSION")).as_bytes());
    page.extend_from_slice(
        format!("<p>Up {}s</p>\n", state.start_time.elapsed().as_secs()).as_bytes(),
    );

    if let Some(supervisor) = &state.supervisor {
        page.extend_from_slice(
            format!(
                "<h2>Reload</h2>\n<p>Watching {}: {} ({} failed restarts)</p>\n",
                escape_html(&supervisor.config_path().display().to_string()),
                supervisor.state().as_str(),
                supervisor.restart_failures(),
            )
            .as_bytes(),
        );
    }

    state
        .manager
        .write_html(&mut page)
        .map_err(|e| WebError::Internal(e.to_string()))?;
    page.extend_from_slice(b"</body></html>\n");

    Ok(Html(String::from_utf8_lossy(&page).into_owned()))
}

/// Health check endpoint
pub async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "registrations": state.manager.len(),
        "generation": state.manager.generation(),
        "reload": state.supervisor.as_ref().map(|s| serde_json::json!({
            "state": s.state().as_str(),
            "restart_failures": s.restart_failures(),
        })),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_header_machine_beats_query() {
        let mut headers = HeaderMap::new();
        headers.insert(MACHINE_HEADER, HeaderValue::from_static("web01"));
        let query = BTreeMap::from([
            ("machine".to_string(), "db01".to_string()),
            ("role".to_string(), "frontend".to_string()),
        ]);

        let request = build_request("etc/motd", &headers, query);
        assert_eq!(request.path, "/etc/motd");
        assert_eq!(request.machine.as_deref(), Some("web01"));
        assert_eq!(request.metadata.len(), 1);
        assert_eq!(request.metadata["role"], "frontend");
    }

    #[test]
    fn test_query_machine() {
        let query = BTreeMap::from([("machine".to_string(), "db01".to_string())]);
        let request = build_request("x", &HeaderMap::new(), query);
        assert_eq!(request.machine.as_deref(), Some("db01"));
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_cache_control() {
        let file = GeneratedFile::new(Vec::new());
        assert_eq!(cache_control(&file), "no-cache");

        let file = GeneratedFile {
            data: Vec::new(),
            valid_until: Some(SystemTime::now() + Duration::from_secs(120)),
        };
        let value = cache_control(&file);
        let value = value.to_str().unwrap();
        assert!(value == "max-age=119" || value == "max-age=120", "{value}");

        let file = GeneratedFile {
            data: Vec::new(),
            valid_until: Some(SystemTime::now() - Duration::from_secs(5)),
        };
        assert_eq!(cache_control(&file), "max-age=0");
    }
}
