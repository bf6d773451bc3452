//! Data models for the PsyFi auth service

pub mod auth;
pub mod identity;
pub mod preferences;
pub mod session;

pub use auth::*;
pub use identity::{Identity, NewIdentity};
pub use preferences::{NotificationPreferences, Preferences, RiskTolerance, Theme};
pub use session::Session;
