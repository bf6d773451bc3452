//! Identity registry over the durable identity repository

use std::sync::Arc;

use validator::Validate;

use super::address::WalletAddress;
use super::error::AuthError;
use crate::models::{Identity, NewIdentity, Preferences};
use crate::store::{retry_read, IdentityRepository};

#[derive(Clone)]
pub struct IdentityRegistry {
    repository: Arc<dyn IdentityRepository>,
    read_retries: u32,
}

impl IdentityRegistry {
    pub fn new(repository: Arc<dyn IdentityRepository>, read_retries: u32) -> Self {
        Self {
            repository,
            read_retries,
        }
    }

    /// Insert or coalesce-update by wallet address. Naturally idempotent,
    /// but still not retried here.
    pub async fn upsert(&self, identity: &NewIdentity) -> Result<Identity, AuthError> {
        Ok(self.repository.upsert(identity).await?)
    }

    pub async fn find_by_address(
        &self,
        address: &WalletAddress,
    ) -> Result<Option<Identity>, AuthError> {
        Ok(retry_read(self.read_retries, "identity.find_by_address", || {
            self.repository.find_by_address(address)
        })
        .await?)
    }

    pub async fn require_by_address(&self, address: &WalletAddress) -> Result<Identity, AuthError> {
        self.find_by_address(address)
            .await?
            .ok_or(AuthError::IdentityNotFound)
    }

    /// Replace the preference document of a known identity
    pub async fn update_preferences(
        &self,
        address: &WalletAddress,
        preferences: &Preferences,
    ) -> Result<Identity, AuthError> {
        preferences
            .validate()
            .map_err(|e| AuthError::InvalidPreferences(e.to_string()))?;

        self.repository
            .update_preferences(address, preferences)
            .await?
            .ok_or(AuthError::IdentityNotFound)
    }
}
