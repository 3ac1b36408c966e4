use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::normalize_url;

/// A cluster node as described in the cluster map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub daemon_id: String,
    #[serde(default)]
    pub daemon_port: String,
    #[serde(default)]
    pub direct_url: String,
    #[serde(default)]
    pub node_ip_addr: String,
}

impl NodeInfo {
    /// Base URL of the node's HTTP API
    pub fn url(&self) -> Option<String> {
        if !self.direct_url.is_empty() {
            return Some(normalize_url(&self.direct_url));
        }
        if !self.node_ip_addr.is_empty() && !self.daemon_port.is_empty() {
            return Some(format!("http://{}:{}", self.node_ip_addr, self.daemon_port));
        }
        None
    }
}

/// Cluster map: proxies, targets and the current primary proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Smap {
    #[serde(default)]
    pub pmap: BTreeMap<String, NodeInfo>,
    #[serde(default)]
    pub proxy_si: Option<NodeInfo>,
    #[serde(default)]
    pub tmap: BTreeMap<String, NodeInfo>,
    #[serde(default)]
    pub version: i64,
}

impl Smap {
    pub fn primary_url(&self) -> Option<String> {
        self.proxy_si.as_ref().and_then(NodeInfo::url)
    }

    /// URLs of every known node, proxies first
    pub fn node_urls(&self) -> Vec<String> {
        self.pmap
            .values()
            .chain(self.tmap.values())
            .filter_map(NodeInfo::url)
            .collect()
    }
}
