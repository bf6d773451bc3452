//! Route definitions for the PsyFi API

mod auth;

use axum::{middleware, routing::get, Router};

use crate::handlers;
use crate::state::AppState;

pub use auth::auth_routes;

/// Application router with per-request tracing and security headers.
///
/// Rate limiting and CORS depend on deployment settings and are layered on
/// by the binary.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(auth_routes())
        .with_state(state)
        .layer(middleware::from_fn(crate::middleware::security_headers))
        .layer(middleware::from_fn(crate::middleware::request_tracing))
}
