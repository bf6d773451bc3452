//! Challenge issuance and consumption
//!
//! A challenge is a human-readable message embedding the wallet address, a
//! random nonce and the issue time. The nonce is cached per address with a
//! short TTL; issuing again for the same address overwrites it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use super::address::WalletAddress;
use super::error::AuthError;
use crate::store::Cache;

const NONCE_LENGTH: usize = 32;
const NONCE_KEY_PREFIX: &str = "auth:nonce:";

/// A freshly issued challenge, returned to the client for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub address: WalletAddress,
    pub nonce: String,
    pub message: String,
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    pub fn timestamp_millis(&self) -> i64 {
        self.issued_at.timestamp_millis()
    }
}

/// Fields recovered from a client-echoed challenge message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChallengeFields {
    pub nonce: Option<String>,
    pub timestamp_ms: Option<i64>,
}

impl ChallengeFields {
    /// Pull the `Nonce:` and `Timestamp:` lines out of a message.
    /// Other lines are ignored.
    pub fn parse(message: &str) -> Self {
        let mut fields = Self::default();
        for line in message.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("Nonce:") {
                fields.nonce = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("Timestamp:") {
                fields.timestamp_ms = value.trim().parse().ok();
            }
        }
        fields
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Issues nonces into the cache and consumes them at connect
#[derive(Clone)]
pub struct ChallengeIssuer {
    cache: Arc<dyn Cache>,
    domain: String,
    nonce_ttl: Duration,
    max_age: chrono::Duration,
}

impl ChallengeIssuer {
    pub fn new(
        cache: Arc<dyn Cache>,
        domain: impl Into<String>,
        nonce_ttl: Duration,
        max_age: chrono::Duration,
    ) -> Self {
        Self {
            cache,
            domain: domain.into(),
            nonce_ttl,
            max_age,
        }
    }

    /// Validate the address and issue a challenge for it
    pub async fn issue(&self, address: &str) -> Result<Challenge, AuthError> {
        let address = WalletAddress::parse(address)?;
        self.issue_at(&address, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        address: &WalletAddress,
        now: DateTime<Utc>,
    ) -> Result<Challenge, AuthError> {
        let nonce = generate_nonce();
        let message = build_message(&self.domain, address, &nonce, now.timestamp_millis());

        self.cache
            .set_ex(&nonce_key(address), &nonce, self.nonce_ttl)
            .await?;

        tracing::info!(wallet = %address, "Issued auth challenge");

        Ok(Challenge {
            address: address.clone(),
            nonce,
            message,
            issued_at: now,
        })
    }

    /// Reject a message whose embedded timestamp is missing or further than
    /// the allowed age from `now` in either direction
    pub fn check_freshness(&self, message: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let issued_at = ChallengeFields::parse(message)
            .issued_at()
            .ok_or(AuthError::ChallengeExpired)?;

        let age = now - issued_at;
        if age > self.max_age || -age > self.max_age {
            return Err(AuthError::ChallengeExpired);
        }
        Ok(())
    }

    /// Consume the cached nonce for `address` if it matches the one embedded
    /// in `message`. A nonce can be consumed at most once, and a mismatched
    /// submission leaves the current nonce in place.
    pub async fn consume(&self, address: &WalletAddress, message: &str) -> Result<(), AuthError> {
        let presented = ChallengeFields::parse(message)
            .nonce
            .ok_or(AuthError::ChallengeExpired)?;

        if self.cache.take_if_eq(&nonce_key(address), &presented).await? {
            Ok(())
        } else {
            tracing::warn!(wallet = %address, "Challenge nonce missing or already used");
            Err(AuthError::ChallengeExpired)
        }
    }
}

/// Cache key holding the active nonce for an address
pub fn nonce_key(address: &WalletAddress) -> String {
    format!("{}{}", NONCE_KEY_PREFIX, address)
}

/// Random alphanumeric nonce from the OS CSPRNG
pub fn generate_nonce() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Render the message a wallet is asked to sign
pub fn build_message(domain: &str, address: &WalletAddress, nonce: &str, timestamp_ms: i64) -> String {
    format!(
        "Welcome to {}!\n\nSign this message to authenticate your wallet.\n\nWallet: {}\nNonce: {}\nTimestamp: {}",
        domain, address, nonce, timestamp_ms
    )
}
