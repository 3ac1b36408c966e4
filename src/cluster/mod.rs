//! Locating the cluster's primary coordinator.
//!
//! The sync path only needs three things from the cluster: the primary's
//! URL as last known, a way to re-resolve it after a failed call, and a way
//! to persist the membership snapshot that resolution produced. Those are
//! the [`PrimaryLocator`] capability; [`SmapLocator`] implements it by
//! asking cluster nodes for their cluster map.

mod locator;
mod smap;

pub use locator::SmapLocator;
pub use smap::{NodeInfo, Smap};

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No primary proxy found among {0} candidate node(s)")]
    NoPrimary(usize),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[async_trait]
pub trait PrimaryLocator: Send + Sync {
    /// Last known primary URL, if any
    fn primary_url(&self) -> Option<String>;

    /// Find the current primary and remember it
    async fn resolve_primary(&self) -> Result<String, DiscoveryError>;

    /// Persist the membership snapshot obtained by the last resolution
    async fn refresh_membership(&self) -> Result<(), DiscoveryError>;
}
