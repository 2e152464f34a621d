use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;

mod edge;
mod origin;

pub use edge::{edge_app, edge_state, run_edge_server, spawn_registration, EdgeState};
pub use origin::{origin_app, origin_state, run_origin_server, OriginState};

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

pub(crate) fn response_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Serve the file at `fs_path`. Directories resolve to their `index.html`
/// when present; listings are not generated.
pub(crate) async fn serve_file(fs_path: &Path) -> Response {
    let path = if fs_path.is_dir() {
        fs_path.join("index.html")
    } else {
        fs_path.to_path_buf()
    };

    match tokio::fs::read(&path).await {
        Ok(body) => file_response(&path, Bytes::from(body)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            response_error(StatusCode::NOT_FOUND, format!("{} not found", path.display()))
        }
        Err(error) => response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

/// Build a 200 response for already-loaded file bytes, with content headers
/// derived from the file extension.
pub(crate) fn file_response(path: &Path, body: Bytes) -> Response {
    let content_type = content_type_for(path);
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub(crate) fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Resolves once the process receives an interrupt or terminate signal.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install interrupt handler: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to install terminate handler: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
