//! In-process store implementations for tests and local development

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Cache, IdentityRepository, SessionRepository, StoreResult};
use crate::auth::WalletAddress;
use crate::models::{Identity, NewIdentity, Preferences, Session};

/// Expiry-aware string cache
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry as if the cache had evicted it
    pub async fn evict(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .map(|(_, expires)| *expires > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let matches = entries
            .get(key)
            .map(|(value, expires)| value == expected && *expires > Instant::now())
            .unwrap_or(false);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Identities keyed by canonical wallet address
#[derive(Default)]
pub struct MemoryIdentityRepository {
    identities: RwLock<HashMap<WalletAddress, Identity>>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Administrative removal, used to exercise the not-found paths
    pub async fn remove(&self, address: &WalletAddress) -> Option<Identity> {
        self.identities.write().await.remove(address)
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn upsert(&self, identity: &NewIdentity) -> StoreResult<Identity> {
        let now = Utc::now();
        let mut identities = self.identities.write().await;

        let stored = identities
            .entry(identity.wallet_address.clone())
            .and_modify(|existing| existing.merge(identity, now))
            .or_insert_with(|| identity.clone().into_identity(now));

        Ok(stored.clone())
    }

    async fn find_by_address(&self, address: &WalletAddress) -> StoreResult<Option<Identity>> {
        Ok(self.identities.read().await.get(address).cloned())
    }

    async fn update_preferences(
        &self,
        address: &WalletAddress,
        preferences: &Preferences,
    ) -> StoreResult<Option<Identity>> {
        let mut identities = self.identities.write().await;
        Ok(identities.get_mut(address).map(|identity| {
            identity.preferences = preferences.clone();
            identity.updated_at = Utc::now();
            identity.clone()
        }))
    }
}

/// Session rows keyed by session id
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, expired ones included
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|session| !session.is_expired_at(now))
            .cloned())
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - sessions.len()) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
