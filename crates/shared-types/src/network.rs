use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SharedTypeError;

/// Project that owns host-level resources such as physical uplinks.
pub const DEFAULT_PROJECT: &str = "default";

/// Reserved namespace for keys written only by drivers.
pub const VOLATILE_PREFIX: &str = "volatile.";

/// Volatile keys under this prefix describe the local host and are stored per member.
pub const NODE_LOCAL_PREFIX: &str = "volatile.last_state.";

/// Whether the driver created the host interface it is using.
pub const VOLATILE_LAST_STATE_CREATED: &str = "volatile.last_state.created";

/// Ordered key/value configuration of a network.
pub type ConfigMap = IndexMap<String, String>;

pub fn is_volatile_key(key: &str) -> bool {
    key.starts_with(VOLATILE_PREFIX)
}

pub fn is_node_local_key(key: &str) -> bool {
    key.starts_with(NODE_LOCAL_PREFIX)
}

/// Boolean interpretation of a config value.
pub fn is_true(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    /// Declared but not yet realized on every member.
    #[default]
    Pending,
    /// Realized at least once by every member.
    Created,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkStatus::Pending => write!(f, "pending"),
            NetworkStatus::Created => write!(f, "created"),
        }
    }
}

impl FromStr for NetworkStatus {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(NetworkStatus::Pending),
            "created" => Ok(NetworkStatus::Created),
            _ => Err(SharedTypeError::UnknownStatus(s.to_string())),
        }
    }
}

/// Origin of a lifecycle request.
///
/// `Normal` requests come straight from a client on this member and carry the
/// cluster-wide checks. `Notification` requests are fan-out from the member
/// that already validated and committed the change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Normal,
    Notification,
}

impl ClientType {
    pub fn is_normal(self) -> bool {
        self == ClientType::Normal
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::Normal => write!(f, "normal"),
            ClientType::Notification => write!(f, "notification"),
        }
    }
}

impl FromStr for ClientType {
    type Err = SharedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(ClientType::Normal),
            "notification" | "notifier" => Ok(ClientType::Notification),
            _ => Err(SharedTypeError::UnknownClientType(s.to_string())),
        }
    }
}

/// Per-member view of a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub status: NetworkStatus,
    /// Node-local keys (see [`NODE_LOCAL_PREFIX`]).
    #[serde(default)]
    pub config: ConfigMap,
}

/// Authoritative network record as held by the cluster store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: i64,
    pub name: String,
    pub project: String,
    #[serde(rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub description: String,
    /// Cluster-wide keys.
    #[serde(default)]
    pub config: ConfigMap,
    pub status: NetworkStatus,
    #[serde(default)]
    pub nodes: BTreeMap<String, NetworkNode>,
}

impl NetworkRecord {
    pub fn local_status(&self, node: &str) -> NetworkStatus {
        self.nodes
            .get(node)
            .map(|n| n.status)
            .unwrap_or(NetworkStatus::Pending)
    }

    /// Cluster-wide config merged with the node-local keys of `node`.
    pub fn config_for(&self, node: &str) -> ConfigMap {
        let mut config = self.config.clone();
        if let Some(local) = self.nodes.get(node) {
            for (key, value) in &local.config {
                config.insert(key.clone(), value.clone());
            }
        }
        config
    }

    pub fn all_nodes_created(&self) -> bool {
        !self.nodes.is_empty()
            && self
                .nodes
                .values()
                .all(|n| n.status == NetworkStatus::Created)
    }
}

/// Writable part of a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPut {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: ConfigMap,
}

impl NetworkPut {
    pub fn new(description: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            description: description.into(),
            config,
        }
    }

    /// Remove every `volatile.*` key, returning the removed keys.
    pub fn strip_volatile(&mut self) -> Vec<String> {
        let removed: Vec<String> = self
            .config
            .keys()
            .filter(|k| is_volatile_key(k))
            .cloned()
            .collect();
        for key in &removed {
            self.config.shift_remove(key);
        }
        removed
    }
}

/// Request to declare a new network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworksPost {
    pub name: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(rename = "type")]
    pub network_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: ConfigMap,
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

impl NetworksPost {
    pub fn new(name: impl Into<String>, network_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: default_project(),
            network_type: network_type.into(),
            description: String::new(),
            config: ConfigMap::new(),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
