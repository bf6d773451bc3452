//! Storage capabilities consumed by the auth core
//!
//! The auth core never talks to Postgres or Redis directly. It holds
//! handles to three capabilities, constructed by the process entry point
//! and injected into each component:
//!
//! - [`Cache`]: ephemeral get/set-with-ttl/compare-and-delete (Redis in production)
//! - [`IdentityRepository`]: durable identity records keyed by wallet address
//! - [`SessionRepository`]: durable session rows, the source of truth for sessions
//!
//! In-memory implementations live in [`memory`] for tests and local runs.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::WalletAddress;
use crate::models::{Identity, NewIdentity, Preferences, Session};

pub mod memory;
pub mod postgres;
pub mod redis_cache;

pub use memory::{MemoryCache, MemoryIdentityRepository, MemorySessionRepository};
pub use postgres::{PgIdentityRepository, PgSessionRepository};
pub use redis_cache::RedisCache;

/// Errors raised by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation timed out: {0}")]
    Timeout(String),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns true if the failed call might succeed when repeated.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Ephemeral key-value cache with per-key expiry
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set `key` to `value`, overwriting any prior value, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete `key` only if it currently holds `expected`, as one atomic step.
    /// Returns whether the entry matched and was removed.
    async fn take_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Durable identity storage
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Insert the identity if the address is unseen, otherwise update only the
    /// fields that are `Some` and bump `updated_at`.
    async fn upsert(&self, identity: &NewIdentity) -> StoreResult<Identity>;

    async fn find_by_address(&self, address: &WalletAddress) -> StoreResult<Option<Identity>>;

    /// Replace the preference document. Returns `None` if the address is unknown.
    async fn update_preferences(
        &self,
        address: &WalletAddress,
        preferences: &Preferences,
    ) -> StoreResult<Option<Identity>>;
}

/// Durable session storage
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> StoreResult<()>;

    /// Fetch a session whose expiry is strictly after `now`.
    async fn find_active(&self, session_id: &str, now: DateTime<Utc>)
        -> StoreResult<Option<Session>>;

    /// Delete a session. Deleting a missing session is not an error.
    async fn delete(&self, session_id: &str) -> StoreResult<()>;

    /// Remove every session that expired at or before `now`, returning the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Run a storage call under a deadline, mapping an elapsed deadline to [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(format!(
            "{} exceeded {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}

/// Retry an idempotent read up to `retries` extra times on retriable errors.
///
/// Never use this for writes: a timed-out write may still have been applied.
pub async fn retry_read<T, F, Fut>(retries: u32, operation: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(e) if e.is_retriable() && attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    operation = operation,
                    attempt = attempt,
                    error = %e,
                    "Retrying storage read"
                );
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
            other => return other,
        }
    }
}
