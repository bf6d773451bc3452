//! Wallet-keyed user identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Preferences;
use crate::auth::WalletAddress;

/// A user, created on first successful connect and keyed by wallet address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub wallet_address: WalletAddress,
    pub display_name: String,
    pub email: Option<String>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert input for the identity registry
///
/// `None` fields keep whatever the stored identity already has.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub wallet_address: WalletAddress,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl NewIdentity {
    pub fn new(wallet_address: WalletAddress) -> Self {
        Self {
            wallet_address,
            display_name: None,
            email: None,
        }
    }

    /// Display name to store when inserting a brand-new identity
    pub fn initial_display_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.wallet_address.short())
    }

    /// Build the row that an insert of this identity would produce
    pub fn into_identity(self, now: DateTime<Utc>) -> Identity {
        let display_name = self.initial_display_name();
        Identity {
            id: Uuid::new_v4(),
            wallet_address: self.wallet_address,
            display_name,
            email: self.email,
            preferences: Preferences::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identity {
    /// Apply coalesce-on-null semantics from an upsert
    pub fn merge(&mut self, update: &NewIdentity, now: DateTime<Utc>) {
        if let Some(name) = &update.display_name {
            self.display_name = name.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> WalletAddress {
        "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap()
    }

    #[test]
    fn test_default_display_name_is_short_address() {
        let identity = NewIdentity::new(address()).into_identity(Utc::now());
        assert_eq!(identity.display_name, "0x5aAe…eAed");
        assert!(identity.email.is_none());
    }

    #[test]
    fn test_merge_keeps_omitted_fields() {
        let now = Utc::now();
        let mut identity = NewIdentity {
            wallet_address: address(),
            display_name: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
        }
        .into_identity(now);

        let later = now + chrono::Duration::seconds(5);
        identity.merge(
            &NewIdentity {
                wallet_address: address(),
                display_name: Some("alice2".to_string()),
                email: None,
            },
            later,
        );

        assert_eq!(identity.display_name, "alice2");
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
        assert_eq!(identity.updated_at, later);
        assert_eq!(identity.created_at, now);
    }
}
