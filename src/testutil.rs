//! Shared test helpers for the crate's unit tests

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::{AuthConfig, Config, NodeConfig, ProxyConfig};
use crate::manager::UserManager;
use crate::sync::{self, SyncJob, SyncQueue};
use crate::AppState;

pub const TEST_SECRET: &str = "test-signing-secret";

/// A minimal `Config` keeping its files under `data_dir`
pub fn test_config(data_dir: &Path) -> Config {
    Config {
        auth: AuthConfig {
            secret: TEST_SECRET.to_string(),
            ..Default::default()
        },
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().into_owned(),
        },
        proxy: ProxyConfig::default(),
    }
}

/// Open a fresh manager in a temporary directory.
///
/// Returns the sync queue without a worker so tests can inspect which
/// pushes were scheduled. The caller must keep the `TempDir` alive.
pub fn test_manager() -> (UserManager, SyncQueue, TempDir) {
    test_manager_with_ttl(AuthConfig::default().token_ttl_seconds)
}

/// Like [`test_manager`] with a custom token lifetime (0 = born expired)
pub fn test_manager_with_ttl(ttl_seconds: u64) -> (UserManager, SyncQueue, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.auth.token_ttl_seconds = ttl_seconds;
    let (handle, queue) = sync::channel(1024);
    let manager = UserManager::open(&config, handle).unwrap();
    (manager, queue, temp_dir)
}

/// Take every scheduled push
pub fn drain_jobs(queue: &mut SyncQueue) -> Vec<SyncJob> {
    queue.drain()
}

/// Build a full `Arc<AppState>` around a fresh manager
pub fn test_state() -> (Arc<AppState>, SyncQueue, TempDir) {
    let (manager, queue, temp_dir) = test_manager();
    let state = Arc::new(AppState {
        manager: Arc::new(manager),
    });
    (state, queue, temp_dir)
}
