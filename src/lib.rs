//! PsyFi Auth Server Library
//!
//! Wallet challenge-response authentication with JWT credentials and
//! dual-backed (Postgres + Redis) sessions.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
