//! Dual-backed session store
//!
//! The durable repository is the source of truth; the cache is a read
//! accelerator holding the same JSON payload under `auth:session:{id}`.
//! Writes go durable first, so a crash between the two writes leaves a
//! durable-only session that lookups still find.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use super::error::AuthError;
use crate::models::{Identity, Session};
use crate::store::{retry_read, Cache, SessionRepository};

const SESSION_KEY_PREFIX: &str = "auth:session:";
const SESSION_ID_PREFIX: &str = "sess_";
const SESSION_ID_RANDOM_LEN: usize = 40;

/// Which store answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Durable,
}

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn Cache>,
    repository: Arc<dyn SessionRepository>,
    read_retries: u32,
}

impl SessionStore {
    pub fn new(
        cache: Arc<dyn Cache>,
        repository: Arc<dyn SessionRepository>,
        read_retries: u32,
    ) -> Self {
        Self {
            cache,
            repository,
            read_retries,
        }
    }

    /// Create a session for `identity` expiring `ttl` from now
    pub async fn create(
        &self,
        identity: &Identity,
        ttl: chrono::Duration,
    ) -> Result<Session, AuthError> {
        self.create_at(identity, ttl, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        identity: &Identity,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let session = Session {
            session_id: generate_session_id(),
            identity_id: identity.id,
            wallet_address: identity.wallet_address.clone(),
            expires_at: now + ttl,
        };

        // Not retried: a timed-out insert may already have landed
        self.repository.insert(&session).await?;

        self.write_cache(&session, now).await;

        tracing::info!(
            session = %session_prefix(&session.session_id),
            wallet = %session.wallet_address,
            "Session created"
        );

        Ok(session)
    }

    pub async fn lookup(&self, session_id: &str) -> Result<Option<Session>, AuthError> {
        Ok(self
            .lookup_at(session_id, Utc::now())
            .await?
            .map(|(session, _)| session))
    }

    /// Resolve a session, reporting which store answered.
    ///
    /// Expired entries are absent no matter which store returns them. Cache
    /// failures degrade to the durable path; durable failures propagate.
    pub async fn lookup_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Session, LookupSource)>, AuthError> {
        let key = session_key(session_id);

        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Session>(&payload) {
                Ok(session) if session.session_id == session_id => {
                    if session.is_expired_at(now) {
                        return Ok(None);
                    }
                    return Ok(Some((session, LookupSource::Cache)));
                }
                Ok(_) | Err(_) => {
                    tracing::warn!(
                        session = %session_prefix(session_id),
                        "Discarding corrupt cached session"
                    );
                    if let Err(e) = self.cache.delete(&key).await {
                        tracing::warn!(error = %e, "Failed to delete corrupt cache entry");
                    }
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Session cache read failed, using durable store");
            }
        }

        let found = retry_read(self.read_retries, "session.find_active", || {
            self.repository.find_active(session_id, now)
        })
        .await?;

        match found {
            Some(session) if !session.is_expired_at(now) => {
                self.write_cache(&session, now).await;
                Ok(Some((session, LookupSource::Durable)))
            }
            _ => Ok(None),
        }
    }

    /// Resolve a session from the durable store only, bypassing the cache.
    ///
    /// Used where a revoked session must never be honoured, since a cached
    /// copy can outlive its durable row when a cache delete fails.
    pub async fn find_authoritative(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthError> {
        let found = retry_read(self.read_retries, "session.find_active", || {
            self.repository.find_active(session_id, now)
        })
        .await?;

        Ok(found.filter(|session| !session.is_expired_at(now)))
    }

    /// Remove a session. Removing a missing session succeeds.
    ///
    /// The durable delete must succeed; the cache delete is best effort.
    pub async fn delete(&self, session_id: &str) -> Result<(), AuthError> {
        self.repository.delete(session_id).await?;

        if let Err(e) = self.cache.delete(&session_key(session_id)).await {
            tracing::warn!(
                session = %session_prefix(session_id),
                error = %e,
                "Session cache delete failed"
            );
        }

        tracing::info!(session = %session_prefix(session_id), "Session deleted");
        Ok(())
    }

    /// Bulk-remove expired durable rows. The cache is never scanned; its
    /// entries expire on their own TTL.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(self.repository.purge_expired(now).await?)
    }

    /// Cache write with a TTL matching the remaining session lifetime.
    /// Failures are logged and swallowed.
    async fn write_cache(&self, session: &Session, now: DateTime<Utc>) {
        let Some(remaining) = session.remaining_seconds(now) else {
            return;
        };

        let payload = match serde_json::to_string(session) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize session for cache");
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set_ex(
                &session_key(&session.session_id),
                &payload,
                Duration::from_secs(remaining),
            )
            .await
        {
            tracing::warn!(
                session = %session_prefix(&session.session_id),
                error = %e,
                "Session cache write failed"
            );
        }
    }
}

pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// Opaque session identifier: `sess_` followed by random alphanumerics
pub fn generate_session_id() -> String {
    let random: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", SESSION_ID_PREFIX, random)
}

/// Log-safe prefix of a session id
fn session_prefix(session_id: &str) -> &str {
    let end = session_id
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(session_id.len());
    &session_id[..end]
}
