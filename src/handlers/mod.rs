//! API handlers for the PsyFi auth server

pub mod auth;
pub mod health;

pub use health::{health_check, root};
