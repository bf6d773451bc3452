//! JWT token generation and validation
//!
//! Handles creation and verification of access and refresh tokens. Both kinds
//! are HS256-signed with the same server secret and are told apart by the
//! `typ` claim, so one can never be accepted where the other is expected.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::address::WalletAddress;
use crate::models::Identity;

/// JWT-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Expected {expected} token, got {found}")]
    WrongTokenType {
        expected: TokenType,
        found: TokenType,
    },
}

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (identity ID)
    pub sub: String,
    /// Wallet address (canonical form)
    pub wallet: String,
    /// Display name, access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Session the token was issued under
    pub sid: String,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    pub typ: TokenType,
}

impl Claims {
    pub fn identity_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }

    pub fn wallet_address(&self) -> Result<WalletAddress, JwtError> {
        WalletAddress::parse(&self.wallet).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }
}

/// Access and refresh tokens issued together at connect
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signs and verifies credentials with a server-held symmetric secret
#[derive(Clone)]
pub struct TokenMinter {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenMinter {
    pub fn new(secret: &str, access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_seconds),
            refresh_ttl: Duration::seconds(refresh_ttl_seconds),
        }
    }

    /// Generate an access token carrying {identity id, address, display name}
    pub fn mint_access(&self, identity: &Identity, session_id: &str) -> Result<String, JwtError> {
        self.mint_access_at(identity, session_id, Utc::now())
    }

    /// Generate a refresh token carrying {identity id, address}
    pub fn mint_refresh(&self, identity: &Identity, session_id: &str) -> Result<String, JwtError> {
        self.mint_refresh_at(identity, session_id, Utc::now())
    }

    /// Access and refresh tokens bound to the same session and issue time
    pub fn mint_pair_at(
        &self,
        identity: &Identity,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.mint_access_at(identity, session_id, now)?,
            refresh_token: self.mint_refresh_at(identity, session_id, now)?,
        })
    }

    pub fn mint_access_at(
        &self,
        identity: &Identity,
        session_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let claims = self.claims(
            identity,
            session_id,
            issued_at,
            TokenType::Access,
            Some(identity.display_name.clone()),
        );
        self.encode(&claims)
    }

    pub fn mint_refresh_at(
        &self,
        identity: &Identity,
        session_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let claims = self.claims(identity, session_id, issued_at, TokenType::Refresh, None);
        self.encode(&claims)
    }

    fn claims(
        &self,
        identity: &Identity,
        session_id: &str,
        issued_at: DateTime<Utc>,
        token_type: TokenType,
        name: Option<String>,
    ) -> Claims {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        Claims {
            sub: identity.id.to_string(),
            wallet: identity.wallet_address.to_string(),
            name,
            sid: session_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            typ: token_type,
        }
    }

    fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Verify signature, expiry and token kind
    ///
    /// # Returns
    /// * `Ok(Claims)` if the token is valid and of the expected kind
    /// * `Err(JwtError::TokenExpired)` if the signature is good but `exp` has passed
    /// * `Err(JwtError)` for every other failure
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                    _ => JwtError::InvalidToken(e.to_string()),
                }
            })?;

        let claims = token_data.claims;
        if claims.typ != expected {
            return Err(JwtError::WrongTokenType {
                expected,
                found: claims.typ,
            });
        }

        Ok(claims)
    }
}
