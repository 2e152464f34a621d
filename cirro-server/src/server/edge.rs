use super::{file_response, response_error, shutdown_signal};
use crate::config::EdgeConfig;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cirro_core::{normalize_request_path, CacheStore, CirroError, OriginClient, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct EdgeState {
    pub cache: CacheStore,
    pub origin: OriginClient,
    /// Flipped once the registration handshake with the origin succeeds.
    /// Until then the edge runs degraded: hits are served, misses are not
    /// filled.
    pub registered: AtomicBool,
}

#[derive(Serialize)]
struct EdgeHealthResponse {
    status: String,
    role: String,
    registered: bool,
}

pub async fn run_edge_server(config: EdgeConfig) -> Result<()> {
    let cache_dir = tempfile::Builder::new().prefix("cirro-cache-").tempdir()?;
    tracing::info!("Cache directory is {}", cache_dir.path().display());

    let state = edge_state(&config, cache_dir.path().to_path_buf())?;
    spawn_registration(state.clone(), config.advertise_addr.clone());

    let app = edge_app(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        "Edge listening on {}, advertised as {}, mirroring {}",
        config.listen_addr,
        config.advertise_addr,
        config.origin_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| CirroError::Http(error.to_string()))?;

    match cache_dir.close() {
        Ok(()) => tracing::debug!("Deleted temporary cache directory"),
        Err(error) => tracing::error!("Failed to delete temporary cache directory: {}", error),
    }

    Ok(())
}

pub fn edge_state(config: &EdgeConfig, cache_root: PathBuf) -> Result<Arc<EdgeState>> {
    Ok(Arc::new(EdgeState {
        cache: CacheStore::new(cache_root)?,
        origin: OriginClient::new(config.origin_addr.clone())?,
        registered: AtomicBool::new(false),
    }))
}

/// Register with the origin in the background, retrying with backoff until
/// it succeeds. A failed first attempt leaves the edge serving in degraded
/// mode instead of terminating it.
pub fn spawn_registration(state: Arc<EdgeState>, advertise_addr: String) {
    tokio::spawn(async move {
        state.origin.register_with_backoff(&advertise_addr).await;
        state.registered.store(true, Ordering::Release);
    });
}

pub fn edge_app(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/cdn_health", get(health))
        .fallback(serve_cached)
        .with_state(state)
}

async fn health(State(state): State<Arc<EdgeState>>) -> impl IntoResponse {
    Json(EdgeHealthResponse {
        status: "ok".to_string(),
        role: "edge".to_string(),
        registered: state.registered.load(Ordering::Acquire),
    })
}

async fn serve_cached(State(state): State<Arc<EdgeState>>, uri: Uri) -> Response {
    let request_path = uri.path();
    tracing::info!("Request to {}", request_path);

    let normalized = match normalize_request_path(request_path) {
        Ok(normalized) => normalized,
        Err(error) => return response_error(StatusCode::BAD_REQUEST, error.to_string()),
    };
    if normalized.is_empty() {
        return response_error(
            StatusCode::NOT_FOUND,
            "edge nodes do not serve directory listings",
        );
    }

    if !state.cache.contains(request_path) {
        if let Some(failure) = fill_cache(&state, request_path).await {
            return failure;
        }
    }

    match state.cache.read(request_path).await {
        Ok(body) => file_response(Path::new(request_path), body),
        Err(CirroError::NotFound(_)) => {
            response_error(StatusCode::NOT_FOUND, format!("{} not found", request_path))
        }
        Err(error) => response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

/// Miss path: fetch `request_path` from the origin and store it. Returns
/// the error response when the fill did not produce a cache entry.
async fn fill_cache(state: &EdgeState, request_path: &str) -> Option<Response> {
    if !state.registered.load(Ordering::Acquire) {
        return Some(response_error(
            StatusCode::NOT_FOUND,
            format!(
                "{} not cached, registration with the origin is still pending",
                request_path
            ),
        ));
    }

    let _fill = state.cache.lock_fill(request_path).await;
    if state.cache.contains(request_path) {
        // another request filled this path while we waited for the lock
        return None;
    }

    tracing::debug!("Cache miss for {}, fetching from origin", request_path);
    let body = match state.origin.fetch(request_path).await {
        Ok(Some(body)) => body,
        Ok(None) => {
            return Some(response_error(
                StatusCode::NOT_FOUND,
                format!("{} not found on origin", request_path),
            ));
        }
        Err(CirroError::OriginUnreachable(error)) => {
            tracing::warn!("Origin fetch for {} failed: {}", request_path, error);
            return Some(response_error(
                StatusCode::NOT_FOUND,
                format!("{} not available, origin unreachable", request_path),
            ));
        }
        Err(error) => {
            return Some(response_error(StatusCode::BAD_GATEWAY, error.to_string()));
        }
    };

    if let Err(error) = state.cache.insert(request_path, &body).await {
        tracing::error!("Failed to store {} in cache: {}", request_path, error);
        return Some(response_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            error.to_string(),
        ));
    }

    None
}
