use super::{response_error, serve_file, shutdown_signal};
use crate::config::OriginConfig;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cirro_core::{
    normalize_request_path, CirroError, EdgeRoster, Result, RouteDecision, RoutePolicy,
    CDN_REQUEST_HEADER, REGISTER_PATH,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct OriginState {
    pub policy: RoutePolicy,
    pub roster: EdgeRoster,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    role: String,
}

#[derive(Serialize)]
struct NodesResponse {
    edges: Vec<String>,
}

pub async fn run_origin_server(config: OriginConfig) -> Result<()> {
    let state = origin_state(&config);
    let app = origin_app(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        "Origin listening on {}, serving {}",
        config.listen_addr,
        config.serve_dir.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| CirroError::Http(error.to_string()))?;

    Ok(())
}

pub fn origin_state(config: &OriginConfig) -> Arc<OriginState> {
    Arc::new(OriginState {
        policy: RoutePolicy::new(config.serve_dir.clone(), config.self_served.clone()),
        roster: EdgeRoster::new(),
    })
}

pub fn origin_app(state: Arc<OriginState>) -> Router {
    Router::new()
        .route(REGISTER_PATH, post(register_edge))
        .route("/cdn_nodes", get(list_edges))
        .route("/cdn_health", get(health))
        .fallback(route_request)
        .with_state(state)
}

/// Registration handshake: the body is the edge's address, appended to the
/// roster verbatim. No validation, no authentication.
async fn register_edge(State(state): State<Arc<OriginState>>, body: String) -> StatusCode {
    tracing::info!("Registered edge node {}", body);
    state.roster.register(body).await;
    StatusCode::OK
}

async fn list_edges(State(state): State<Arc<OriginState>>) -> impl IntoResponse {
    Json(NodesResponse {
        edges: state.roster.snapshot().await,
    })
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        role: "origin".to_string(),
    })
}

async fn route_request(
    State(state): State<Arc<OriginState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request_path = uri.path();
    tracing::info!("Request to {}", request_path);

    if let Err(error) = normalize_request_path(request_path) {
        return response_error(StatusCode::BAD_REQUEST, error.to_string());
    }

    let edge_fetch = headers.contains_key(CDN_REQUEST_HEADER);
    let decision = match state
        .policy
        .decide(request_path, edge_fetch, &state.roster)
        .await
    {
        Ok(decision) => decision,
        Err(error) => return response_error(StatusCode::BAD_REQUEST, error.to_string()),
    };

    match decision {
        RouteDecision::SelfServe => {
            let local_path = match state.policy.local_path(request_path) {
                Ok(path) => path,
                Err(error) => return response_error(StatusCode::BAD_REQUEST, error.to_string()),
            };
            tracing::debug!("Serving {} myself", request_path);
            serve_file(&local_path).await
        }
        RouteDecision::Redirect(target) => {
            tracing::debug!("Redirecting {} to edge node {}", request_path, target);
            redirect_response(&target)
        }
    }
}

/// Temporary redirect: roster membership and selection vary between
/// requests, so the client must not cache the target.
fn redirect_response(target: &str) -> Response {
    match HeaderValue::from_str(target) {
        Ok(location) => {
            let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Err(error) => response_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("invalid redirect target: {}", error),
        ),
    }
}
