//! Cluster store contract and the transactional working copy

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use clusternet_core::{ConflictError, NetworkError, PersistenceError};
use clusternet_shared_types::{
    is_node_local_key, ConfigMap, EntityRef, NetworkNode, NetworkRecord, NetworkStatus, Warning,
    WarningStatus, WarningType,
};

/// Result type for cluster store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A check run inside the transaction refused the change.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Failed to acquire cluster lock: {0}")]
    Lock(String),

    #[error("Cluster store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    fn network_not_found(project: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: "Network",
            name: format!("{}/{}", project, name),
        }
    }

    /// Convert into the lifecycle error taxonomy, naming the failed operation.
    pub fn into_network_error(self, operation: &str) -> NetworkError {
        match self {
            StoreError::NotFound { kind, name } => NetworkError::NotFound { kind, name },
            StoreError::AlreadyExists { kind, name } => match name.split_once('/') {
                Some((project, name)) if kind == "Network" => {
                    NetworkError::Conflict(ConflictError::AlreadyExists {
                        project: project.to_string(),
                        name: name.to_string(),
                    })
                }
                _ => NetworkError::Conflict(ConflictError::Refused {
                    message: format!("{} already exists: {}", kind, name),
                }),
            },
            StoreError::Conflict(conflict) => NetworkError::Conflict(conflict),
            other => NetworkError::Persistence(PersistenceError::new(operation, other.to_string())),
        }
    }
}

impl From<StoreError> for NetworkError {
    fn from(err: StoreError) -> Self {
        err.into_network_error("Cluster transaction")
    }
}

/// NIC device of an instance attached to a managed network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicDevice {
    pub project: String,
    pub instance: String,
    pub device: String,
    pub network: String,
}

/// Whole persisted cluster state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub next_network_id: i64,
    #[serde(default)]
    pub networks: BTreeMap<i64, NetworkRecord>,
    #[serde(default)]
    pub nic_devices: Vec<NicDevice>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Working copy of the cluster state handed to a transaction closure.
///
/// Changes become visible to others only if the closure returns `Ok`.
#[derive(Debug)]
pub struct ClusterTx {
    state: ClusterState,
    dirty: bool,
    scans: u64,
}

impl ClusterTx {
    /// Working copy of `state` with no pending changes.
    pub fn new(state: ClusterState) -> Self {
        Self {
            state,
            dirty: false,
            scans: 0,
        }
    }

    /// Whether the closure changed anything that must be committed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of cluster-wide network scans run in this transaction.
    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Give up the working copy, changes included.
    pub fn into_state(self) -> ClusterState {
        self.state
    }

    /// Names of the cluster members, in join order.
    pub fn members(&self) -> &[String] {
        &self.state.members
    }

    /// Add a member. Every network becomes Pending until it is created there.
    pub fn join_member(&mut self, name: &str) {
        if self.state.members.iter().any(|m| m == name) {
            return;
        }
        self.state.members.push(name.to_string());
        // New members have not realised anything yet.
        for record in self.state.networks.values_mut() {
            record.nodes.entry(name.to_string()).or_default();
            record.status = NetworkStatus::Pending;
        }
        self.dirty = true;
    }

    /// Every persisted network, keyed by project then id.
    ///
    /// Pending records are included so that concurrent declarations of
    /// conflicting resources can be detected.
    pub fn get_created_networks_by_project(&mut self) -> BTreeMap<String, BTreeMap<i64, NetworkRecord>> {
        self.scans += 1;
        let mut by_project: BTreeMap<String, BTreeMap<i64, NetworkRecord>> = BTreeMap::new();
        for (id, record) in &self.state.networks {
            by_project
                .entry(record.project.clone())
                .or_default()
                .insert(*id, record.clone());
        }
        by_project
    }

    /// Network `name` of `project`.
    pub fn get_network(&self, project: &str, name: &str) -> StoreResult<NetworkRecord> {
        self.find(project, name)
            .cloned()
            .ok_or_else(|| StoreError::network_not_found(project, name))
    }

    /// Network with the record id `id`.
    pub fn get_network_by_id(&self, id: i64) -> StoreResult<NetworkRecord> {
        self.state
            .networks
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Network",
                name: format!("#{}", id),
            })
    }

    /// Networks of one project, or of every project when `project` is `None`.
    pub fn get_networks(&self, project: Option<&str>) -> Vec<NetworkRecord> {
        self.state
            .networks
            .values()
            .filter(|r| project.map_or(true, |p| r.project == p))
            .cloned()
            .collect()
    }

    fn find(&self, project: &str, name: &str) -> Option<&NetworkRecord> {
        self.state
            .networks
            .values()
            .find(|r| r.project == project && r.name == name)
    }

    fn record_mut(&mut self, id: i64) -> StoreResult<&mut NetworkRecord> {
        self.state
            .networks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Network",
                name: format!("#{}", id),
            })
    }

    /// Declare a new network, Pending on every member.
    pub fn create_pending_network(
        &mut self,
        project: &str,
        name: &str,
        network_type: &str,
        description: &str,
        config: &ConfigMap,
    ) -> StoreResult<i64> {
        if self.find(project, name).is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "Network",
                name: format!("{}/{}", project, name),
            });
        }

        self.state.next_network_id += 1;
        let id = self.state.next_network_id;

        let (global, _) = split_node_local(config);
        let nodes = self
            .state
            .members
            .iter()
            .map(|m| (m.clone(), NetworkNode::default()))
            .collect();

        self.state.networks.insert(
            id,
            NetworkRecord {
                id,
                name: name.to_string(),
                project: project.to_string(),
                network_type: network_type.to_string(),
                description: description.to_string(),
                config: global,
                status: NetworkStatus::Pending,
                nodes,
            },
        );
        self.dirty = true;
        Ok(id)
    }

    /// Replace the description and config of a network as seen by `node`.
    ///
    /// Cluster-wide keys replace the record's config; node-local keys replace
    /// the node's own config.
    pub fn update_network(
        &mut self,
        id: i64,
        node: &str,
        description: &str,
        config: &ConfigMap,
    ) -> StoreResult<()> {
        let (global, local) = split_node_local(config);
        let record = self.record_mut(id)?;
        record.description = description.to_string();
        record.config = global;
        record.nodes.entry(node.to_string()).or_default().config = local;
        self.dirty = true;
        Ok(())
    }

    /// Replace only the node-local keys of `node`.
    pub fn update_node_config(&mut self, id: i64, node: &str, config: &ConfigMap) -> StoreResult<()> {
        let (_, local) = split_node_local(config);
        let record = self.record_mut(id)?;
        record.nodes.entry(node.to_string()).or_default().config = local;
        self.dirty = true;
        Ok(())
    }

    /// Rename a network, refusing names already taken in its project.
    pub fn rename_network(&mut self, id: i64, new_name: &str) -> StoreResult<()> {
        let project = self.get_network_by_id(id)?.project;
        if self.find(&project, new_name).is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "Network",
                name: format!("{}/{}", project, new_name),
            });
        }
        self.record_mut(id)?.name = new_name.to_string();
        self.dirty = true;
        Ok(())
    }

    /// Remove a network record along with its warnings.
    pub fn delete_network(&mut self, id: i64) -> StoreResult<()> {
        if self.state.networks.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                kind: "Network",
                name: format!("#{}", id),
            });
        }
        let entity = EntityRef::network(id);
        self.state.warnings.retain(|w| w.entity != entity);
        self.dirty = true;
        Ok(())
    }

    /// Mark the network realised on `node`.
    pub fn network_node_created(&mut self, id: i64, node: &str) -> StoreResult<()> {
        let record = self.record_mut(id)?;
        record.nodes.entry(node.to_string()).or_default().status = NetworkStatus::Created;
        self.dirty = true;
        Ok(())
    }

    /// Mark the network created cluster-wide.
    pub fn network_created(&mut self, id: i64) -> StoreResult<()> {
        self.record_mut(id)?.status = NetworkStatus::Created;
        self.dirty = true;
        Ok(())
    }

    /// Attach an instance NIC; one device name per instance.
    pub fn add_nic_device(&mut self, device: NicDevice) -> StoreResult<()> {
        if self.state.nic_devices.iter().any(|d| {
            d.project == device.project && d.instance == device.instance && d.device == device.device
        }) {
            return Err(StoreError::AlreadyExists {
                kind: "NIC device",
                name: format!("{}/{}", device.instance, device.device),
            });
        }
        self.state.nic_devices.push(device);
        self.dirty = true;
        Ok(())
    }

    /// Detach an instance NIC.
    pub fn remove_nic_device(&mut self, project: &str, instance: &str, device: &str) -> StoreResult<()> {
        let before = self.state.nic_devices.len();
        self.state
            .nic_devices
            .retain(|d| !(d.project == project && d.instance == instance && d.device == device));
        if self.state.nic_devices.len() == before {
            return Err(StoreError::NotFound {
                kind: "NIC device",
                name: format!("{}/{}", instance, device),
            });
        }
        self.dirty = true;
        Ok(())
    }

    /// NIC devices attached to `network` of `project`.
    pub fn nic_devices_using(&self, project: &str, network: &str) -> Vec<NicDevice> {
        self.state
            .nic_devices
            .iter()
            .filter(|d| d.project == project && d.network == network)
            .cloned()
            .collect()
    }

    /// Create a warning, or bump the count and message of a matching one.
    pub fn upsert_warning(
        &mut self,
        node: &str,
        project: &str,
        entity: EntityRef,
        warning_type: WarningType,
        message: &str,
    ) -> Warning {
        self.dirty = true;
        if let Some(existing) = self
            .state
            .warnings
            .iter_mut()
            .find(|w| w.matches(node, project, entity, warning_type))
        {
            existing.count += 1;
            existing.last_message = message.to_string();
            existing.last_seen_at = Utc::now();
            existing.status = WarningStatus::New;
            return existing.clone();
        }

        let warning = Warning::new(node, project, entity, warning_type, message);
        self.state.warnings.push(warning.clone());
        warning
    }

    /// Mark matching unresolved warnings as resolved, returning how many were.
    pub fn resolve_warnings(
        &mut self,
        node: &str,
        project: &str,
        warning_type: WarningType,
        entity: EntityRef,
    ) -> usize {
        let mut resolved = 0;
        for warning in self.state.warnings.iter_mut() {
            if warning.matches(node, project, entity, warning_type)
                && warning.status != WarningStatus::Resolved
            {
                warning.status = WarningStatus::Resolved;
                resolved += 1;
            }
        }
        if resolved > 0 {
            self.dirty = true;
        }
        resolved
    }

    /// Every warning, resolved ones included.
    pub fn warnings(&self) -> &[Warning] {
        &self.state.warnings
    }
}

fn split_node_local(config: &ConfigMap) -> (ConfigMap, ConfigMap) {
    let mut global = ConfigMap::new();
    let mut local = ConfigMap::new();
    for (key, value) in config {
        if is_node_local_key(key) {
            local.insert(key.clone(), value.clone());
        } else {
            global.insert(key.clone(), value.clone());
        }
    }
    (global, local)
}

/// Closure run inside a cluster transaction
pub type TxFn<'a> = Box<dyn FnOnce(&mut ClusterTx) -> StoreResult<()> + Send + 'a>;

/// Transactional store holding the authoritative network records.
///
/// A transaction runs with exclusive access to the whole state, which gives
/// serializable isolation for scans followed by writes.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Run `f` against a working copy, committing it if `f` succeeds and
    /// changed anything.
    async fn transaction<'a>(&self, f: TxFn<'a>) -> StoreResult<()>;

    /// Cluster-wide network scans performed so far.
    fn scan_count(&self) -> u64;
}

impl<'s> dyn ClusterStore + 's {
    /// Run `f` in a transaction and return its value.
    pub async fn query<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send,
        F: FnOnce(&mut ClusterTx) -> StoreResult<T> + Send,
    {
        let mut out = None;
        self.transaction(Box::new(|tx| {
            out = Some(f(tx)?);
            Ok(())
        }))
        .await?;
        out.ok_or_else(|| StoreError::Internal("transaction returned no value".to_string()))
    }
}
