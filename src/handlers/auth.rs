//! Authentication HTTP handlers
//!
//! Endpoints for wallet-based authentication.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use validator::Validate;

use crate::auth::ConnectInput;
use crate::error::ApiResult;
use crate::middleware::{AuthenticatedUser, SessionHeader};
use crate::models::{
    ConnectRequest, ConnectResponse, DisconnectResponse, NonceResponse, PreferencesRequest,
    PreferencesResponse, ProfileResponse, RefreshRequest, RefreshResponse, TokensResponse,
};
use crate::state::AppState;

/// GET /auth/nonce/:address - Issue a challenge for the wallet to sign
pub async fn request_nonce(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<NonceResponse>> {
    let challenge = state.auth_service.issue_challenge(&address).await?;

    Ok(Json(NonceResponse {
        timestamp: challenge.timestamp_millis(),
        message: challenge.message,
        nonce: challenge.nonce,
    }))
}

/// POST /auth/connect - Verify the signed challenge and open a session
pub async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<Json<ConnectResponse>> {
    let Json(req) = payload?;
    req.validate()?;

    let outcome = state
        .auth_service
        .connect(ConnectInput {
            wallet_address: req.wallet_address,
            signature: req.signature,
            message: req.message,
            username: req.username,
            email: req.email,
        })
        .await?;

    Ok(Json(ConnectResponse {
        user: outcome.identity.into(),
        tokens: TokensResponse {
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
        },
        session_id: outcome.session.session_id,
    }))
}

/// POST /auth/refresh - Mint a new access token
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<RefreshResponse>> {
    let Json(req) = payload?;
    let access_token = state.auth_service.refresh(&req.refresh_token).await?;

    Ok(Json(RefreshResponse { access_token }))
}

/// POST /auth/disconnect - Delete the session named by `X-Session-Id`
pub async fn disconnect(
    State(state): State<AppState>,
    SessionHeader(session_id): SessionHeader,
) -> ApiResult<Json<DisconnectResponse>> {
    state
        .auth_service
        .disconnect(session_id.as_deref())
        .await?;

    Ok(Json(DisconnectResponse { success: true }))
}

/// GET /auth/profile - Current user
pub async fn profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ProfileResponse>> {
    let identity = state
        .auth_service
        .profile_for(user.identity_id, &user.wallet_address)
        .await?;

    Ok(Json(ProfileResponse {
        user: identity.into(),
    }))
}

/// PUT /auth/preferences - Replace the preference document
pub async fn update_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<PreferencesRequest>, JsonRejection>,
) -> ApiResult<Json<PreferencesResponse>> {
    let Json(req) = payload?;

    let identity = state
        .auth_service
        .update_preferences(user.identity_id, &user.wallet_address, &req.preferences)
        .await?;

    Ok(Json(PreferencesResponse {
        preferences: identity.preferences,
    }))
}
