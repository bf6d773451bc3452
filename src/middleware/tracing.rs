//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use super::rate_limiter::peer_ip;

/// Log each request with method, path, peer address, status and timing.
///
/// Query strings are left out; nothing secret travels in paths.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = peer_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let start = Instant::now();

    tracing::debug!(method = %method, path = %path, client_ip = %client_ip, "Request started");

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            client_ip = %client_ip,
            status = status,
            duration_ms = duration_ms,
            "Request failed"
        );
    } else if response.status().is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            client_ip = %client_ip,
            status = status,
            duration_ms = duration_ms,
            "Request rejected"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            client_ip = %client_ip,
            status = status,
            duration_ms = duration_ms,
            "Request completed"
        );
    }

    response
}
