//! State and steps shared by every driver

use std::sync::Arc;

use log::{debug, warn};

use clusternet_config::{ClusterStore, ClusterTx, ClusterWarnings, StoreResult, WarningSink};
use clusternet_core::{InterfaceController, Result};
use clusternet_shared_types::{
    is_node_local_key, ClientType, ConfigMap, EntityRef, NetworkPut, NetworkRecord, NetworkStatus,
    WarningType, DEFAULT_PROJECT,
};
use clusternet_validate::changed_keys;

use crate::driver::NetworkType;
use crate::notify::{DependencyNotifier, MemberNotifier, MemberRequest, NoDependents, StandaloneMember};

/// Collaborators available to a driver on this member
#[derive(Clone)]
pub struct DriverContext {
    pub node: String,
    pub store: Arc<dyn ClusterStore>,
    pub host: Arc<dyn InterfaceController>,
    pub members: Arc<dyn MemberNotifier>,
    pub dependents: Arc<dyn DependencyNotifier>,
    pub warnings: Arc<dyn WarningSink>,
}

impl DriverContext {
    /// Context for a standalone member with store-backed warnings.
    pub fn new(
        node: impl Into<String>,
        store: Arc<dyn ClusterStore>,
        host: Arc<dyn InterfaceController>,
    ) -> Self {
        Self {
            node: node.into(),
            warnings: Arc::new(ClusterWarnings::new(Arc::clone(&store))),
            store,
            host,
            members: Arc::new(StandaloneMember),
            dependents: Arc::new(NoDependents),
        }
    }

    pub fn with_members(mut self, members: Arc<dyn MemberNotifier>) -> Self {
        self.members = members;
        self
    }

    pub fn with_dependents(mut self, dependents: Arc<dyn DependencyNotifier>) -> Self {
        self.dependents = dependents;
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Check run inside the transaction that writes a network's config.
///
/// It sees the cluster state the write will be committed against. Returning
/// an error aborts the write; changes to the config are persisted with it.
pub type WriteGuard = Arc<dyn Fn(&mut ClusterTx, &mut ConfigMap) -> StoreResult<()> + Send + Sync>;

/// Writes a network's description and config to the cluster.
///
/// Detached from the driver so it can be captured by undo actions.
#[derive(Clone)]
pub struct ConfigWriter {
    ctx: DriverContext,
    id: i64,
    project: String,
    name: String,
}

impl ConfigWriter {
    /// Normal requests without a target member are first replayed on the
    /// other members, then persisted. Notifications persist nothing.
    ///
    /// Returns the config as written, after `guard` had its say.
    pub async fn apply(
        &self,
        put: &NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
        guard: Option<&WriteGuard>,
    ) -> Result<ConfigMap> {
        let mut config = put.config.clone();
        if !client_type.is_normal() {
            return Ok(config);
        }

        if target_node.is_none() {
            self.ctx
                .members
                .notify_members(&self.project, &self.name, MemberRequest::Update(put.clone()))
                .await?;
        }

        let node = target_node.unwrap_or(&self.ctx.node);
        let id = self.id;
        self.ctx
            .store
            .query(|tx| {
                if let Some(guard) = guard {
                    guard(tx, &mut config)?;
                }
                tx.update_network(id, node, &put.description, &config)
            })
            .await
            .map_err(|e| e.into_network_error("Updating network"))?;
        Ok(config)
    }
}

/// Transient copy of one network record as seen by this member
pub struct CommonNetwork {
    ctx: DriverContext,
    id: i64,
    name: String,
    project: String,
    network_type: NetworkType,
    description: String,
    config: ConfigMap,
    status: NetworkStatus,
    local_status: NetworkStatus,
}

impl CommonNetwork {
    pub fn from_record(record: &NetworkRecord, ctx: DriverContext) -> Result<Self> {
        let network_type: NetworkType = record.network_type.parse()?;
        Ok(Self {
            id: record.id,
            name: record.name.clone(),
            project: record.project.clone(),
            network_type,
            description: record.description.clone(),
            config: record.config_for(&ctx.node),
            status: record.status,
            local_status: record.local_status(&ctx.node),
            ctx,
        })
    }

    pub fn ctx(&self) -> &DriverContext {
        &self.ctx
    }

    pub fn node(&self) -> &str {
        &self.ctx.node
    }

    pub fn host(&self) -> &Arc<dyn InterfaceController> {
        &self.ctx.host
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.ctx.store
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigMap {
        &mut self.config
    }

    /// Config value, empty if unset.
    pub fn get(&self, key: &str) -> &str {
        self.config.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    pub fn local_status(&self) -> NetworkStatus {
        self.local_status
    }

    /// Whether host changes must wait for the global create.
    pub fn is_pending(&self) -> bool {
        self.status == NetworkStatus::Pending || self.local_status == NetworkStatus::Pending
    }

    pub fn put(&self) -> NetworkPut {
        NetworkPut::new(self.description.clone(), self.config.clone())
    }

    /// Replace this copy's description and config without persisting.
    pub fn reset(&mut self, put: NetworkPut) {
        self.description = put.description;
        self.config = put.config;
    }

    pub fn writer(&self) -> ConfigWriter {
        ConfigWriter {
            ctx: self.ctx.clone(),
            id: self.id,
            project: self.project.clone(),
            name: self.name.clone(),
        }
    }

    /// Whether `new` differs from the current state, and which config keys do.
    pub fn config_changed(&self, new: &NetworkPut) -> (bool, Vec<String>) {
        let changed = changed_keys(&self.config, &new.config);
        let needed = !changed.is_empty() || self.description != new.description;
        (needed, changed)
    }

    /// Apply `put` cluster-wide (normal) and to this copy.
    pub async fn update(
        &mut self,
        put: NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
    ) -> Result<()> {
        self.update_guarded(put, target_node, client_type, None).await
    }

    /// Like [`update`](Self::update), with `guard` run in the write transaction.
    pub async fn update_guarded(
        &mut self,
        put: NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
        guard: Option<&WriteGuard>,
    ) -> Result<()> {
        let config = self
            .writer()
            .apply(&put, target_node, client_type, guard)
            .await?;
        self.description = put.description;
        self.config = config;
        Ok(())
    }

    /// Persist this member's node-local keys.
    pub async fn persist_node_config(&self, operation: &str) -> Result<()> {
        let id = self.id;
        let node = self.ctx.node.clone();
        let local: ConfigMap = self
            .config
            .iter()
            .filter(|(k, _)| is_node_local_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.ctx
            .store
            .query(move |tx| tx.update_node_config(id, &node, &local))
            .await
            .map_err(|e| e.into_network_error(operation))
    }

    /// Remove the record; notifications only clean up locally.
    pub async fn delete(&self, client_type: ClientType) -> Result<()> {
        if !client_type.is_normal() {
            return Ok(());
        }

        let id = self.id;
        self.ctx
            .store
            .query(|tx| tx.delete_network(id))
            .await
            .map_err(|e| e.into_network_error("Deleting network"))
    }

    pub async fn rename(&mut self, new_name: &str) -> Result<()> {
        let id = self.id;
        self.ctx
            .store
            .query(|tx| tx.rename_network(id, new_name))
            .await
            .map_err(|e| e.into_network_error("Renaming network"))?;
        self.name = new_name.to_string();
        Ok(())
    }

    /// Whether instances or other networks use this network.
    pub async fn is_used(&self) -> Result<bool> {
        let project = self.project.clone();
        let name = self.name.clone();
        let used = self
            .ctx
            .store
            .query(move |tx| {
                if !tx.nic_devices_using(&project, &name).is_empty() {
                    return Ok(true);
                }
                if project != DEFAULT_PROJECT {
                    return Ok(false);
                }
                Ok(tx
                    .get_networks(None)
                    .iter()
                    .any(|n| n.config.get("network") == Some(&name)))
            })
            .await?;
        Ok(used)
    }

    /// Tell dependent networks about changed keys. Failures are only logged.
    pub async fn notify_dependent_networks(&self, changed_keys: &[String]) {
        if self.project != DEFAULT_PROJECT || !self.network_type.can_be_uplink() {
            return;
        }

        debug!(
            "Notifying dependent networks of {} about {:?}",
            self.name, changed_keys
        );
        if let Err(err) = self
            .ctx
            .dependents
            .network_updated(&self.project, &self.name, changed_keys)
            .await
        {
            warn!(
                "Failed notifying dependent networks of {}: {:#}",
                self.name, err
            );
        }
    }

    /// Raise or resolve the startup failure warning for this network.
    pub async fn record_start_result(&self, result: &Result<()>) {
        let entity = EntityRef::network(self.id);
        let outcome = match result {
            Err(err) => {
                self.ctx
                    .warnings
                    .upsert_local_warning(
                        &self.ctx.node,
                        &self.project,
                        entity,
                        WarningType::NetworkStartupFailure,
                        &err.to_string(),
                    )
                    .await
            }
            Ok(()) => {
                self.ctx
                    .warnings
                    .resolve_local_warnings(
                        &self.ctx.node,
                        &self.project,
                        WarningType::NetworkStartupFailure,
                        entity,
                    )
                    .await
            }
        };

        if let Err(err) = outcome {
            warn!("Failed to update startup warning of {}: {}", self.name, err);
        }
    }
}
