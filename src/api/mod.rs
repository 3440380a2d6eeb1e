//! HTTP surface of the server.
//!
//! Everything is a GET so that the /block bookmarklet can be a plain
//! `window.open` and the list endpoints can be subscribed from blockers
//! that only fetch URLs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::store::{BlocklistStore, ListFormat};

/// Cache-Control for responses that must never be cached.
const NO_STORE: &str = "no-store";
/// Cache-Control for the favicon, which never changes.
const CACHE_FOREVER: &str = "public, max-age=31536000, immutable";

/// Shared state handed to every handler.
pub struct AppState {
    pub store: BlocklistStore,
    pub config: Config,
}

/// Errors surfaced by the HTTP handlers.
///
/// Response bodies stay empty: store failures are logged server-side and
/// clients only get the status code. Every error response is marked
/// no-store.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or mismatched api key")]
    Unauthorized,
    #[error("missing url parameter")]
    MissingUrl,
    #[error("rejected url: {0}")]
    InvalidUrl(StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingUrl | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => {
                error!("Blocklist store failure: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, [(header::CACHE_CONTROL, NO_STORE)]).into_response()
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
        tracing::info_span!("request", method = %request.method(), uri = %request.uri())
    });

    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/healthcheck", get(healthcheck))
        .route("/block", get(block))
        .route("/blocklist.txt", get(blocklist_plain))
        .route("/blocklist.hosts.txt", get(blocklist_hosts))
        .route("/blocklist.abp.txt", get(blocklist_adblock))
        .layer(trace_layer)
        .with_state(state)
}

/// Serves the API on an already-bound listener until it fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn favicon() -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, CACHE_FOREVER)])
}

async fn healthcheck() -> impl IntoResponse {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (
        [(header::CACHE_CONTROL, NO_STORE)],
        Json(serde_json::json!({ "timestamp": timestamp })),
    )
}

#[derive(Debug, Deserialize)]
struct BlockParams {
    key: Option<String>,
    url: Option<String>,
}

async fn block(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BlockParams>,
) -> Result<impl IntoResponse, ApiError> {
    match params.key {
        Some(key) if key == state.config.api_key => {}
        _ => return Err(ApiError::Unauthorized),
    }

    let url = match params.url {
        Some(url) if !url.trim().is_empty() => url,
        _ => {
            warn!("No URL given. Skipping...");
            return Err(ApiError::MissingUrl);
        }
    };

    // Normalize up front: a URL we cannot parse is the client's fault (400),
    // anything failing past this point is ours (500).
    let entry = state.store.normalize(&url).map_err(ApiError::InvalidUrl)?;
    state.store.append(&entry).await?;

    Ok((
        [(header::CACHE_CONTROL, NO_STORE)],
        format!("Successfully blocked {entry}"),
    ))
}

/// Serves the persisted file verbatim, 404 before anything was blocked.
async fn blocklist_plain(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    match state.store.read_raw().await? {
        Some(content) => Ok(content.into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn blocklist_hosts(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    let entries = state.store.load(&[]).await?;
    Ok(state.store.render(&entries, ListFormat::Hosts))
}

async fn blocklist_adblock(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    let entries = state.store.load(&[]).await?;
    Ok(state.store.render(&entries, ListFormat::Adblock))
}
