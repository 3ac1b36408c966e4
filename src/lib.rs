//! authn - identity and token issuance for a storage cluster
//!
//! This crate provides:
//! - Registered users with per-cloud-provider credentials
//! - Signed (HS256) bearer tokens, one live token per user, lazy expiry
//! - A monotonically increasing state version stamped on every snapshot
//! - JSON snapshot files for users and tokens
//! - Background push of token and credential lists to the cluster primary,
//!   with primary rediscovery on failure
//! - REST API

pub mod api;
pub mod cluster;
pub mod config;
pub mod manager;
pub mod storage;
pub mod sync;
#[cfg(test)]
pub mod testutil;
pub mod tokens;
pub mod version;

use std::sync::Arc;

use manager::UserManager;

/// Shared application state
pub struct AppState {
    pub manager: Arc<UserManager>,
}
