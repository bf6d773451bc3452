//! Authentication error taxonomy
//!
//! Every kind carries a stable machine-readable code. Clients branch on the
//! code, never on the message text.

use thiserror::Error;

use super::address::InvalidAddress;
use super::crypto::CryptoError;
use super::jwt::JwtError;
use crate::store::StoreError;

/// Auth service errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid wallet address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Signature does not match wallet address")]
    InvalidSignature,

    #[error("Challenge expired or already used")]
    ChallengeExpired,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Session not found or revoked")]
    SessionRevoked,

    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidAddressFormat(_) => "INVALID_ADDRESS_FORMAT",
            AuthError::MalformedSignature(_) => "MALFORMED_SIGNATURE",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::ChallengeExpired => "CHALLENGE_EXPIRED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid(_) => "TOKEN_INVALID",
            AuthError::SessionRevoked => "SESSION_REVOKED",
            AuthError::IdentityNotFound => "IDENTITY_NOT_FOUND",
            AuthError::InvalidPreferences(_) => "VALIDATION_ERROR",
            AuthError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AuthError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            AuthError::InvalidAddressFormat(_)
            | AuthError::MalformedSignature(_)
            | AuthError::InvalidPreferences(_) => 400,
            AuthError::InvalidSignature
            | AuthError::ChallengeExpired
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::SessionRevoked => 401,
            AuthError::IdentityNotFound => 404,
            AuthError::StorageUnavailable(_) => 503,
            AuthError::UpstreamTimeout(_) => 504,
            AuthError::Internal(_) => 500,
        }
    }

    /// Returns true if this error is caused by a dependency rather than the request.
    pub fn is_server_error(&self) -> bool {
        self.http_status_code() >= 500
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(msg) => AuthError::UpstreamTimeout(msg),
            StoreError::Unavailable(msg) | StoreError::Corrupt(msg) => {
                AuthError::StorageUnavailable(msg)
            }
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::SigningFailed(msg) => AuthError::Internal(msg),
            other => AuthError::MalformedSignature(other.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::TokenExpired => AuthError::TokenExpired,
            JwtError::EncodingFailed(msg) => AuthError::Internal(msg),
            other => AuthError::TokenInvalid(other.to_string()),
        }
    }
}

impl From<InvalidAddress> for AuthError {
    fn from(e: InvalidAddress) -> Self {
        AuthError::InvalidAddressFormat(e.0)
    }
}
