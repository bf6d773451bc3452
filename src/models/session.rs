//! Server-tracked session record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::WalletAddress;

/// A session linking an opaque identifier to an identity and an absolute expiry.
///
/// The same payload is stored durably and in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub identity_id: Uuid,
    pub wallet_address: WalletAddress,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whole seconds left before expiry, or `None` if already expired
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        let remaining = (self.expires_at - now).num_seconds();
        if remaining > 0 {
            Some(remaining as u64)
        } else {
            None
        }
    }
}
