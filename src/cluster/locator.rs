use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::smap::Smap;
use super::{DiscoveryError, PrimaryLocator};
use crate::storage::{load_json, save_json};
use crate::sync::API_VERSION;

/// Primary discovery through the cluster map.
///
/// Candidates are asked in order: the last known primary, the configured
/// cluster nodes, then every node of the cached cluster map. The first node
/// that returns a map naming a primary wins.
pub struct SmapLocator {
    client: reqwest::Client,
    nodes: Vec<String>,
    primary: RwLock<Option<String>>,
    smap: RwLock<Option<Smap>>,
    smap_path: PathBuf,
}

impl SmapLocator {
    /// Build a locator, seeding the cluster map from `smap_path` if present
    pub fn new(
        client: reqwest::Client,
        primary: Option<String>,
        nodes: Vec<String>,
        smap_path: PathBuf,
    ) -> Self {
        let saved: Option<Smap> = match load_json(&smap_path) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, path = %smap_path.display(), "Ignoring unreadable cluster map");
                None
            }
        };

        let primary = primary.or_else(|| saved.as_ref().and_then(Smap::primary_url));
        match &primary {
            Some(url) => info!(primary = %url, "Primary proxy configured"),
            None => warn!("Primary proxy unknown until discovery succeeds"),
        }

        Self {
            client,
            nodes,
            primary: RwLock::new(primary),
            smap: RwLock::new(saved),
            smap_path,
        }
    }

    fn candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let primary = self.primary.read().clone();
        let from_smap = self
            .smap
            .read()
            .as_ref()
            .map(Smap::node_urls)
            .unwrap_or_default();

        for url in primary
            .into_iter()
            .chain(self.nodes.iter().cloned())
            .chain(from_smap)
        {
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        }
        candidates
    }

    async fn fetch_smap(&self, node: &str) -> Result<Smap, reqwest::Error> {
        let url = format!("{node}/{API_VERSION}/daemon");
        self.client
            .get(&url)
            .query(&[("what", "smap")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl PrimaryLocator for SmapLocator {
    fn primary_url(&self) -> Option<String> {
        self.primary.read().clone()
    }

    async fn resolve_primary(&self) -> Result<String, DiscoveryError> {
        let candidates = self.candidates();

        for node in &candidates {
            match self.fetch_smap(node).await {
                Ok(smap) => match smap.primary_url() {
                    Some(url) => {
                        let previous = self.primary.write().replace(url.clone());
                        if previous.as_deref() != Some(url.as_str()) {
                            info!(primary = %url, via = %node, version = smap.version, "Detected new primary proxy");
                        }
                        *self.smap.write() = Some(smap);
                        return Ok(url);
                    }
                    None => debug!(node = %node, "Cluster map names no primary"),
                },
                Err(e) => debug!(node = %node, error = %e, "Failed to fetch cluster map"),
            }
        }

        Err(DiscoveryError::NoPrimary(candidates.len()))
    }

    async fn refresh_membership(&self) -> Result<(), DiscoveryError> {
        let smap = self.smap.read().clone();
        if let Some(smap) = smap {
            save_json(&self.smap_path, &smap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeInfo;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn serve_smap(primary: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/v1/daemon",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let primary = primary.clone();
                async move {
                    assert_eq!(q.get("what").map(String::as_str), Some("smap"));
                    Json(Smap {
                        proxy_si: Some(NodeInfo {
                            daemon_id: "p1".to_string(),
                            direct_url: primary,
                            ..Default::default()
                        }),
                        version: 3,
                        ..Default::default()
                    })
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn test_resolve_from_cluster_node() {
        let temp = TempDir::new().unwrap();
        let node = serve_smap("http://primary:8080".to_string()).await;
        let locator = SmapLocator::new(
            client(),
            None,
            vec!["http://127.0.0.1:1".to_string(), node],
            temp.path().join("smap.json"),
        );

        assert_eq!(locator.primary_url(), None);
        let primary = locator.resolve_primary().await.unwrap();
        assert_eq!(primary, "http://primary:8080");
        assert_eq!(locator.primary_url().as_deref(), Some("http://primary:8080"));

        locator.refresh_membership().await.unwrap();
        let saved: Smap = load_json(&temp.path().join("smap.json")).unwrap().unwrap();
        assert_eq!(saved.version, 3);
    }

    #[tokio::test]
    async fn test_resolve_fails_without_reachable_nodes() {
        let temp = TempDir::new().unwrap();
        let locator = SmapLocator::new(
            client(),
            Some("http://127.0.0.1:1".to_string()),
            vec![],
            temp.path().join("smap.json"),
        );

        assert!(matches!(
            locator.resolve_primary().await,
            Err(DiscoveryError::NoPrimary(1))
        ));
        // Nothing resolved, nothing written
        locator.refresh_membership().await.unwrap();
        assert!(!temp.path().join("smap.json").exists());
    }

    #[tokio::test]
    async fn test_saved_map_seeds_primary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("smap.json");
        save_json(
            &path,
            &Smap {
                proxy_si: Some(NodeInfo {
                    direct_url: "http://saved:8080".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();

        let locator = SmapLocator::new(client(), None, vec![], path);
        assert_eq!(locator.primary_url().as_deref(), Some("http://saved:8080"));
    }
}
