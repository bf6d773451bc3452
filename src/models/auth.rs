//! Request and response bodies for the auth API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{Identity, Preferences};

/// GET /auth/nonce/{address}
#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub message: String,
    pub nonce: String,
    /// Issue time in Unix milliseconds, as embedded in the message
    pub timestamp: i64,
}

/// POST /auth/connect
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub wallet_address: String,
    pub signature: String,
    pub message: String,
    #[validate(length(min = 1, max = 50))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub user: UserResponse,
    pub tokens: TokensResponse,
    pub session_id: String,
}

/// POST /auth/refresh
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// POST /auth/disconnect
#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// GET /auth/profile
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
}

/// PUT /auth/preferences
#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub preferences: Preferences,
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub preferences: Preferences,
}

/// User response (sanitized for API)
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub wallet_address: String,
    pub username: String,
    pub email: Option<String>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            wallet_address: identity.wallet_address.to_string(),
            username: identity.display_name,
            email: identity.email,
            preferences: identity.preferences,
            created_at: identity.created_at,
        }
    }
}
