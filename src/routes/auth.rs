//! Authentication routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/nonce/:address", get(auth::request_nonce))
        .route("/auth/connect", post(auth::connect))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/disconnect", post(auth::disconnect))
        .route("/auth/profile", get(auth::profile))
        .route("/auth/preferences", put(auth::update_preferences))
}
