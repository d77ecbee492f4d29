//! Route handlers (C8).

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};

use chrono::Utc;

use crate::error::ApiError;
use crate::http::ip::derive_client_ip;
use crate::http::AppState;

pub async fn ready_handler() -> &'static str {
    "OK"
}

/// Reads the body fully, derives the client IP, and spawns the ingest
/// service detached — the 202 is sent before a single line is parsed.
pub async fn event_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Result<StatusCode, ApiError> {
    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|err| {
            ApiError::new(
                format!("failed to read request body: {err}"),
                StatusCode::BAD_REQUEST,
            )
        })?;

    let client_ip = derive_client_ip(Some(&addr.to_string()), &headers);
    let server_time = Utc::now();
    let body = String::from_utf8_lossy(&bytes).into_owned();
    let pool = state.pool.clone();

    tokio::spawn(async move {
        crate::service::process_event(&body, &client_ip, server_time, &pool).await;
    });

    Ok(StatusCode::ACCEPTED)
}
