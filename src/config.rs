use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Longest accepted token lifetime (ten years)
pub const MAX_TOKEN_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub node: NodeConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret used to sign and verify tokens
    pub secret: String,
    pub token_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Cluster nodes to ask for the current primary when the known one stops answering
    pub cluster_nodes: Vec<String>,
    pub http_timeout_seconds: u64,
    pub retry_ceiling_seconds: u64,
    pub retry_delay_ms: u64,
    pub sync_queue_capacity: usize,
    /// Primary coordinator URL known at startup (e.g. http://proxy:8080)
    pub url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_seconds: 86400, // 24 hours
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cluster_nodes: Vec::new(),
            http_timeout_seconds: 30,
            retry_ceiling_seconds: 120,
            retry_delay_ms: 500,
            sync_queue_capacity: 64,
            url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(v) => v.trim().parse().map_err(|_| {
                    ConfigError::ValidationError(format!("{key} must be a non-negative integer"))
                }),
                None => Ok(default),
            }
        };

        let proxy_defaults = ProxyConfig::default();
        let auth_defaults = AuthConfig::default();

        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:52001".to_string());
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string());

        let cluster_nodes: Vec<String> = lookup("CLUSTER_NODES")
            .map(|nodes| {
                nodes
                    .split(',')
                    .map(|s| normalize_url(s.trim()))
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let url = lookup("PROXY_URL")
            .map(|u| normalize_url(u.trim()))
            .filter(|u| !u.is_empty());

        let config = Config {
            auth: AuthConfig {
                secret: lookup("AUTH_SECRET").unwrap_or_default(),
                token_ttl_seconds: parse_u64("TOKEN_EXPIRE_SECONDS", auth_defaults.token_ttl_seconds)?,
            },
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            proxy: ProxyConfig {
                cluster_nodes,
                http_timeout_seconds: parse_u64(
                    "HTTP_TIMEOUT_SECONDS",
                    proxy_defaults.http_timeout_seconds,
                )?,
                retry_ceiling_seconds: parse_u64(
                    "PROXY_RETRY_CEILING_SECONDS",
                    proxy_defaults.retry_ceiling_seconds,
                )?,
                retry_delay_ms: parse_u64("PROXY_RETRY_DELAY_MS", proxy_defaults.retry_delay_ms)?,
                sync_queue_capacity: parse_u64(
                    "SYNC_QUEUE_CAPACITY",
                    proxy_defaults.sync_queue_capacity as u64,
                )? as usize,
                url,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "AUTH_SECRET cannot be empty".to_string(),
            ));
        }
        if self.auth.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "TOKEN_EXPIRE_SECONDS cannot exceed {MAX_TOKEN_TTL_SECONDS}"
            )));
        }
        if self.proxy.sync_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "SYNC_QUEUE_CAPACITY must be greater than 0".to_string(),
            ));
        }

        if self.proxy.url.is_none() && self.proxy.cluster_nodes.is_empty() {
            tracing::warn!(
                "Neither PROXY_URL nor CLUSTER_NODES is set. \
                 Token and credential updates will not reach the cluster."
            );
        }

        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_seconds)
    }

    pub fn users_path(&self) -> PathBuf {
        PathBuf::from(&self.node.data_dir).join("users.json")
    }

    pub fn tokens_path(&self) -> PathBuf {
        PathBuf::from(&self.node.data_dir).join("users.json.tokens")
    }

    pub fn smap_path(&self) -> PathBuf {
        PathBuf::from(&self.node.data_dir).join("smap.json")
    }
}

/// Prefix bare `host:port` addresses with `http://` and drop trailing slashes.
pub fn normalize_url(addr: &str) -> String {
    if addr.is_empty() {
        return String::new();
    }
    let addr = addr.trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}
