//! HTTP delivery to the primary with failover.
//!
//! A failed call (transport error or non-2xx status) asks the primary
//! locator to find the current primary and refresh its membership snapshot,
//! then retries against whatever primary is known now. The loop ends on
//! success, when the locator cannot find any primary, or once the retry
//! ceiling has elapsed since the first attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::{DiscoveryError, PrimaryLocator};
use crate::manager::UserManager;

pub const API_VERSION: &str = "v1";
pub const TOKENS_PATH: &str = "tokens";
pub const CREDS_PATH: &str = "creds";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to locate primary proxy: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Primary proxy is not defined")]
    NoPrimary,
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Sending data to primary proxy timed out after {0:?}")]
    Timeout(Duration),
}

pub struct ProxySyncer {
    client: reqwest::Client,
    locator: Arc<dyn PrimaryLocator>,
    retry_ceiling: Duration,
    retry_delay: Duration,
}

impl ProxySyncer {
    pub fn new(
        client: reqwest::Client,
        locator: Arc<dyn PrimaryLocator>,
        retry_ceiling: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            locator,
            retry_ceiling,
            retry_delay,
        }
    }

    /// Send the live token list to the primary
    pub async fn push_tokens(&self, manager: &UserManager) -> Result<(), SyncError> {
        let list = manager.live_token_list();
        let body = serde_json::to_vec(&list)?;
        self.proxy_request(Method::POST, TOKENS_PATH, body).await?;
        debug!(
            version = list.version,
            tokens = list.tokens.len(),
            "Sent token list to primary"
        );
        Ok(())
    }

    /// Send every user's credentials to the primary
    pub async fn push_credentials(&self, manager: &UserManager) -> Result<(), SyncError> {
        let state = manager.credentials_snapshot();
        let body = serde_json::to_vec(&state)?;
        self.proxy_request(Method::POST, CREDS_PATH, body).await?;
        debug!(
            version = state.version,
            users = state.users.len(),
            "Sent credentials list to primary"
        );
        Ok(())
    }

    /// Call `<primary>/v1/<path>` until it succeeds or the retry ceiling is hit
    pub async fn proxy_request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
    ) -> Result<(), SyncError> {
        if self.locator.primary_url().is_none() {
            return Err(SyncError::NoPrimary);
        }

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let primary = self.locator.primary_url().ok_or(SyncError::NoPrimary)?;
            let url = format!("{primary}/{API_VERSION}/{path}");

            let result = self
                .client
                .request(method.clone(), &url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    if attempt > 1 {
                        debug!(%url, attempt, "Primary accepted request after retry");
                    }
                    return Ok(());
                }
                Ok(response) => {
                    warn!(%method, %url, status = %response.status(), attempt, "Primary rejected request");
                }
                Err(e) => {
                    warn!(%method, %url, error = %e, attempt, "Failed to reach primary");
                }
            }

            // No primary anywhere: retrying cannot help
            let resolved = self.locator.resolve_primary().await?;
            if resolved != primary {
                debug!(old = %primary, new = %resolved, "Primary changed");
            }
            if let Err(e) = self.locator.refresh_membership().await {
                warn!(error = %e, "Failed to save cluster map");
            }

            if started.elapsed() > self.retry_ceiling {
                return Err(SyncError::Timeout(self.retry_ceiling));
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
