//! Authentication extractors
//!
//! Bearer access-token verification and session-id header extraction.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, AuthService, WalletAddress};
use crate::error::ApiError;

/// Header carrying the session id on disconnect
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Authenticated user extracted from an access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity_id: Uuid,
    pub wallet_address: WalletAddress,
}

/// Extractor for authenticated users
///
/// Verifies the access token from the Authorization header. Expired and
/// tampered tokens are rejected with distinct codes.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.wallet_address)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthorized(
                        "Authorization header with Bearer token required".to_string(),
                    )
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);
        let claims = auth_service.authenticate(bearer.token())?;

        Ok(AuthenticatedUser {
            identity_id: claims.identity_id().map_err(AuthError::from)?,
            wallet_address: claims.wallet_address().map_err(AuthError::from)?,
        })
    }
}

/// Optional `X-Session-Id` header value
#[derive(Debug, Clone)]
pub struct SessionHeader(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for SessionHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .headers
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(SessionHeader(session_id))
    }
}
