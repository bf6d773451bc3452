//! Authentication module for PsyFi
//!
//! Provides wallet-based authentication using Ethereum-style addresses.
//! - Challenge-response authentication with single-use nonces
//! - JWT access and refresh token generation and validation
//! - Dual-backed sessions with durable source of truth and cache fast path

mod address;
pub mod challenge;
pub mod crypto;
mod error;
mod identity;
pub mod jwt;
pub mod session;
mod service;

pub use address::{InvalidAddress, WalletAddress};
pub use challenge::{Challenge, ChallengeIssuer};
pub use crypto::{recover_signer, sign_personal_message, verify_wallet_signature, CryptoError};
pub use error::AuthError;
pub use identity::IdentityRegistry;
pub use jwt::{Claims, JwtError, TokenMinter, TokenPair, TokenType};
pub use service::{
    session_purger, AuthBackends, AuthService, BackendHealth, ConnectAttempt, ConnectInput,
    ConnectOutcome, ConnectState,
};
pub use session::{LookupSource, SessionStore};
