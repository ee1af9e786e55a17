//! HTTP adapter.
//!
//! Maps requests onto the parser chain and server stack, and results onto
//! responses:
//!
//! - `GET /{*path}` and `GET /` serve images; the source comes from the
//!   `source` query parameter or, failing that, the path.
//! - `GET /favicon.ico` is always 404.
//!
//! Successful responses carry `ETag` (the cache key, quoted),
//! `Cache-Control: public` and an `Expires` date. An `If-None-Match` that
//! names the ETag is answered with 304 before the server stack is consulted;
//! `If-None-Match: *` only once the image is known to exist.

use crate::cache::params_hash;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::parse::{ParserChain, RawRequest};
use crate::server::Server;
use crate::types::Image;
use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<dyn Server>,
    pub parsers: Arc<ParserChain>,
    /// Offset from now for the `Expires` header.
    pub expires: Duration,
}

impl AppState {
    pub fn new(server: Arc<dyn Server>, config: &ServerConfig) -> Self {
        Self {
            server,
            parsers: Arc::new(ParserChain::default()),
            expires: Duration::from_secs(config.expires_secs),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/", get(serve_root))
        .route("/{*path}", get(serve_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn serve_root(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve(&state, String::new(), query, &headers).await
}

async fn serve_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve(&state, path, query, &headers).await
}

async fn serve(
    state: &AppState,
    path: String,
    query: Option<String>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let request = RawRequest::new(path, query.as_deref());
    let params = state.parsers.parse(&request)?;
    let etag = format!("\"{}\"", params_hash(&params));

    let condition = if_none_match(headers);
    if matches_etag(condition, &etag) {
        return Ok(not_modified(&etag));
    }

    let image = state.server.get(&params).await?;
    if condition.trim() == "*" {
        return Ok(not_modified(&etag));
    }
    Ok(image_response(image, &etag, state.expires))
}

fn not_modified(etag: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, header_value(etag));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public"));
    (StatusCode::NOT_MODIFIED, headers).into_response()
}

fn image_response(image: Image, etag: &str, expires: Duration) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.format.content_type()),
    );
    headers.insert(header::ETAG, header_value(etag));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public"));
    headers.insert(header::EXPIRES, header_value(&http_date_after(expires)));
    (StatusCode::OK, headers, Body::from(image.data)).into_response()
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or(HeaderValue::from_static(""))
}

/// RFC 7231 IMF-fixdate of `now + offset`.
fn http_date_after(offset: Duration) -> String {
    let now = Utc::now();
    let when = TimeDelta::from_std(offset)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now);
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `If-None-Match` value, empty when absent or not ASCII.
fn if_none_match(headers: &HeaderMap) -> &str {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Whether an `If-None-Match` list names `etag`, weak or strong.
fn matches_etag(condition: &str, etag: &str) -> bool {
    condition
        .split(',')
        .map(|item| item.trim().trim_start_matches("W/"))
        .any(|value| value == etag)
}

/// Error response with a JSON body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl From<ServerError> for ApiError {
    fn from(error: ServerError) -> Self {
        if !error.is_client_error() {
            warn!(error = %error, "request failed");
            return Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
        let status = match &error {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, &error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}
