//! Service banner and health check

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
    pub version: &'static str,
}

fn describe(up: bool) -> &'static str {
    if up {
        "connected"
    } else {
        "unavailable"
    }
}

/// GET /health - 200 when both stores answer, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.auth_service.health().await;
    let healthy = health.database && health.cache;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            database: describe(health.database),
            cache: describe(health.cache),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// GET /
pub async fn root() -> &'static str {
    "PsyFi Auth Server"
}
