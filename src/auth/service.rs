//! Authentication service
//!
//! Composes the challenge issuer, signature verifier, token minter, session
//! store and identity registry into the connect / refresh / disconnect /
//! profile flows.
//!
//! # Connect state machine
//!
//! ```text
//! ChallengeRequested ──▶ SignatureSubmitted ──▶ Verified ──▶ SessionIssued
//!         │                      │                  │
//!         └──────────────────────┴──────────────────┴──▶ Rejected
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::address::WalletAddress;
use super::challenge::{Challenge, ChallengeIssuer};
use super::crypto::verify_wallet_signature;
use super::error::AuthError;
use super::identity::IdentityRegistry;
use super::jwt::{Claims, TokenMinter, TokenPair, TokenType};
use super::session::SessionStore;
use crate::config::{AuthSettings, StoreSettings};
use crate::models::{Identity, NewIdentity, Preferences, Session};
use crate::store::{Cache, IdentityRepository, SessionRepository};

/// Storage handles injected by the process entry point
#[derive(Clone)]
pub struct AuthBackends {
    pub cache: Arc<dyn Cache>,
    pub identities: Arc<dyn IdentityRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

/// Progress of a single connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    ChallengeRequested,
    SignatureSubmitted,
    Verified,
    SessionIssued,
    Rejected,
}

impl ConnectState {
    pub const fn is_valid_transition(from: ConnectState, to: ConnectState) -> bool {
        use ConnectState::{ChallengeRequested, Rejected, SessionIssued, SignatureSubmitted, Verified};

        matches!(
            (from, to),
            (ChallengeRequested, SignatureSubmitted)
                | (SignatureSubmitted, Verified)
                | (Verified, SessionIssued)
                | (ChallengeRequested | SignatureSubmitted | Verified, Rejected)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ConnectState::SessionIssued | ConnectState::Rejected)
    }
}

/// Tracks one connect attempt through the state machine
#[derive(Debug)]
pub struct ConnectAttempt {
    address: WalletAddress,
    state: ConnectState,
}

impl ConnectAttempt {
    fn new(address: WalletAddress) -> Self {
        Self {
            address,
            state: ConnectState::ChallengeRequested,
        }
    }

    pub fn state(&self) -> ConnectState {
        self.state
    }

    fn advance(&mut self, to: ConnectState) -> Result<(), AuthError> {
        if !ConnectState::is_valid_transition(self.state, to) {
            return Err(AuthError::Internal(format!(
                "invalid connect transition {:?} -> {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Move to `Rejected` and hand back the error that caused it
    fn reject(&mut self, error: AuthError) -> AuthError {
        if !self.state.is_terminal() {
            self.state = ConnectState::Rejected;
        }
        if error.is_server_error() {
            tracing::error!(wallet = %self.address, error = %error, "Connect failed");
        } else {
            tracing::warn!(wallet = %self.address, code = error.code(), "Connect rejected");
        }
        error
    }
}

/// Inputs to connect, as submitted by the client
#[derive(Debug, Clone)]
pub struct ConnectInput {
    pub wallet_address: String,
    pub signature: String,
    pub message: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Result of a successful connect
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub identity: Identity,
    pub tokens: TokenPair,
    pub session: Session,
}

/// Dependency status reported by [`AuthService::health`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendHealth {
    pub database: bool,
    pub cache: bool,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    challenges: ChallengeIssuer,
    minter: TokenMinter,
    sessions: SessionStore,
    identities: IdentityRegistry,
    cache: Arc<dyn Cache>,
    session_repository: Arc<dyn SessionRepository>,
    session_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(backends: AuthBackends, auth: &AuthSettings, store: &StoreSettings) -> Self {
        Self {
            challenges: ChallengeIssuer::new(
                backends.cache.clone(),
                auth.domain.clone(),
                Duration::from_secs(auth.nonce_ttl_seconds),
                chrono::Duration::seconds(auth.challenge_max_age_seconds),
            ),
            minter: TokenMinter::new(
                &auth.jwt_secret,
                auth.access_token_ttl_seconds,
                auth.refresh_token_ttl_seconds,
            ),
            sessions: SessionStore::new(
                backends.cache.clone(),
                backends.sessions.clone(),
                store.read_retries,
            ),
            identities: IdentityRegistry::new(backends.identities, store.read_retries),
            cache: backends.cache,
            session_repository: backends.sessions,
            session_ttl: chrono::Duration::seconds(auth.session_ttl_seconds),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Issue a challenge for a wallet to sign
    pub async fn issue_challenge(&self, wallet_address: &str) -> Result<Challenge, AuthError> {
        self.challenges.issue(wallet_address).await
    }

    /// Verify a signed challenge and issue an identity, tokens and a session
    pub async fn connect(&self, input: ConnectInput) -> Result<ConnectOutcome, AuthError> {
        self.connect_at(input, Utc::now()).await
    }

    pub async fn connect_at(
        &self,
        input: ConnectInput,
        now: DateTime<Utc>,
    ) -> Result<ConnectOutcome, AuthError> {
        let address = WalletAddress::parse(&input.wallet_address)?;
        let mut attempt = ConnectAttempt::new(address.clone());
        attempt.advance(ConnectState::SignatureSubmitted)?;

        if let Err(e) = self.challenges.check_freshness(&input.message, now) {
            return Err(attempt.reject(e));
        }

        match verify_wallet_signature(&input.message, &input.signature, &address) {
            Ok(true) => {}
            Ok(false) => return Err(attempt.reject(AuthError::InvalidSignature)),
            Err(e) => return Err(attempt.reject(e.into())),
        }

        // Only a verified signature may burn the nonce
        if let Err(e) = self.challenges.consume(&address, &input.message).await {
            return Err(attempt.reject(e));
        }
        attempt.advance(ConnectState::Verified)?;

        let outcome = match self.issue_session(&address, input, now).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(attempt.reject(e)),
        };
        attempt.advance(ConnectState::SessionIssued)?;

        tracing::info!(wallet = %address, user_id = %outcome.identity.id, "Connect accepted");
        Ok(outcome)
    }

    async fn issue_session(
        &self,
        address: &WalletAddress,
        input: ConnectInput,
        now: DateTime<Utc>,
    ) -> Result<ConnectOutcome, AuthError> {
        let identity = self
            .identities
            .upsert(&NewIdentity {
                wallet_address: address.clone(),
                display_name: input.username,
                email: input.email,
            })
            .await?;

        let session = self
            .sessions
            .create_at(&identity, self.session_ttl, now)
            .await?;

        let tokens = match self.minter.mint_pair_at(&identity, &session.session_id, now) {
            Ok(tokens) => tokens,
            Err(e) => {
                if let Err(cleanup) = self.sessions.delete(&session.session_id).await {
                    tracing::warn!(error = %cleanup, "Failed to remove session after mint failure");
                }
                return Err(e.into());
            }
        };

        Ok(ConnectOutcome {
            identity,
            tokens,
            session,
        })
    }

    /// Mint a new access token from a refresh token whose session is still live.
    /// Liveness is checked against the durable store, never the cache.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.minter.verify(refresh_token, TokenType::Refresh)?;
        let identity_id = claims.identity_id()?;

        let session = self
            .sessions
            .find_authoritative(&claims.sid, Utc::now())
            .await?
            .ok_or(AuthError::SessionRevoked)?;
        if session.identity_id != identity_id {
            return Err(AuthError::SessionRevoked);
        }

        let identity = self
            .identities
            .require_by_address(&claims.wallet_address()?)
            .await?;

        Ok(self.minter.mint_access(&identity, &claims.sid)?)
    }

    /// Delete a session. Absent ids and already-deleted sessions succeed.
    pub async fn disconnect(&self, session_id: Option<&str>) -> Result<(), AuthError> {
        match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.sessions.delete(id).await,
            None => Ok(()),
        }
    }

    /// Verify an access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        Ok(self.minter.verify(access_token, TokenType::Access)?)
    }

    pub async fn profile(&self, access_token: &str) -> Result<Identity, AuthError> {
        let claims = self.authenticate(access_token)?;
        self.profile_for(claims.identity_id()?, &claims.wallet_address()?)
            .await
    }

    /// Resolve the identity behind verified access claims. An address that
    /// now belongs to a different identity record counts as not found.
    pub async fn profile_for(
        &self,
        identity_id: Uuid,
        address: &WalletAddress,
    ) -> Result<Identity, AuthError> {
        let identity = self.identities.require_by_address(address).await?;
        if identity.id != identity_id {
            return Err(AuthError::IdentityNotFound);
        }
        Ok(identity)
    }

    pub async fn update_preferences(
        &self,
        identity_id: Uuid,
        address: &WalletAddress,
        preferences: &Preferences,
    ) -> Result<Identity, AuthError> {
        self.profile_for(identity_id, address).await?;
        self.identities
            .update_preferences(address, preferences)
            .await
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions.purge_expired(Utc::now()).await
    }

    pub async fn health(&self) -> BackendHealth {
        BackendHealth {
            database: self.session_repository.ping().await.is_ok(),
            cache: self.cache.ping().await.is_ok(),
        }
    }
}

/// Periodically delete expired durable sessions
pub async fn session_purger(service: Arc<AuthService>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting session purger");

    loop {
        tokio::time::sleep(interval).await;

        match service.purge_expired_sessions().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged = purged, "Purged expired sessions"),
            Err(e) => tracing::error!("Error purging expired sessions: {}", e),
        }
    }
}
