//! Network lifecycle orchestration
//!
//! Wraps the drivers with the cluster policy: a normal request is validated
//! and scanned once on the member that received it, then replayed on every
//! other member as a notification that only applies the local effect.

use std::sync::Arc;

use log::{debug, error, info, warn};

use clusternet_config::{ClusterStore, StoreError, WarningSink};
use clusternet_core::{
    ConflictError, InterfaceController, NetworkError, Result, RevertScope, ValidationError,
};
use clusternet_drivers::{
    DriverContext, DriverRegistry, MemberNotifier, MemberRequest, NetworkDriver, NetworkType,
};
use clusternet_event_bus::EventBus;
use clusternet_shared_types::{
    is_volatile_key, ClientType, NetworkPut, NetworkRecord, NetworkStatus, NetworksPost,
    SystemEvent, Warning, DEFAULT_PROJECT,
};
use clusternet_validate::checks;

use crate::dependency::{DependentNetworkListener, EventBusNotifier};
use crate::locks::RecordLocks;

/// Outcome of an operation spanning several networks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// `project/name` of every network handled successfully
    pub succeeded: Vec<String>,
    /// `project/name: error` of every network that failed
    pub failed: Vec<String>,
}

impl BatchReport {
    fn record(&mut self, key: String, result: Result<()>, action: &str) {
        match result {
            Ok(()) => self.succeeded.push(key),
            Err(err) => {
                error!("Failed to {} network {}: {}", action, key, err);
                self.failed.push(format!("{}: {}", key, err));
            }
        }
    }
}

pub struct OrchestratorBuilder {
    node: String,
    store: Arc<dyn ClusterStore>,
    host: Arc<dyn InterfaceController>,
    registry: Option<Arc<DriverRegistry>>,
    members: Option<Arc<dyn MemberNotifier>>,
    warnings: Option<Arc<dyn WarningSink>>,
    bus: Option<EventBus>,
}

impl OrchestratorBuilder {
    pub fn registry(mut self, registry: Arc<DriverRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fan-out to the other cluster members. Standalone if unset.
    pub fn members(mut self, members: Arc<dyn MemberNotifier>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = Some(warnings);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn build(self) -> Arc<LifecycleOrchestrator> {
        let bus = self.bus.unwrap_or_default();

        let mut ctx = DriverContext::new(self.node, self.store, self.host)
            .with_dependents(Arc::new(EventBusNotifier::new(bus.clone())));
        if let Some(members) = self.members {
            ctx = ctx.with_members(members);
        }
        if let Some(warnings) = self.warnings {
            ctx = ctx.with_warnings(warnings);
        }

        let orchestrator = Arc::new(LifecycleOrchestrator {
            ctx,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(DriverRegistry::new())),
            locks: RecordLocks::new(),
            bus,
        });

        let listener = DependentNetworkListener::new(Arc::downgrade(&orchestrator));
        let name = format!("dependent-networks@{}", orchestrator.node());
        if let Err(err) = orchestrator.bus.register_listener(name, listener).await {
            warn!("Dependent network updates disabled: {}", err);
        }

        orchestrator
    }
}

/// Entry point of every lifecycle operation on this member.
pub struct LifecycleOrchestrator {
    ctx: DriverContext,
    registry: Arc<DriverRegistry>,
    locks: RecordLocks,
    bus: EventBus,
}

impl LifecycleOrchestrator {
    pub fn builder(
        node: impl Into<String>,
        store: Arc<dyn ClusterStore>,
        host: Arc<dyn InterfaceController>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            node: node.into(),
            store,
            host,
            registry: None,
            members: None,
            warnings: None,
            bus: None,
        }
    }

    pub fn node(&self) -> &str {
        &self.ctx.node
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn store(&self) -> &dyn ClusterStore {
        self.ctx.store.as_ref()
    }

    fn driver(&self, record: &NetworkRecord) -> Result<Box<dyn NetworkDriver>> {
        self.registry.load(record, self.ctx.clone())
    }

    async fn record(&self, project: &str, name: &str) -> Result<NetworkRecord> {
        Ok(self.store().query(|tx| tx.get_network(project, name)).await?)
    }

    async fn publish(&self, event: SystemEvent) {
        if let Err(err) = self.bus.publish(event).await {
            warn!("Failed to publish network event: {}", err);
        }
    }

    /// Declare a network without realising it anywhere.
    pub async fn define(&self, request: NetworksPost) -> Result<NetworkRecord> {
        let _guard = self.locks.lock(&request.project, &request.name).await;
        self.define_locked(request).await
    }

    async fn define_locked(&self, request: NetworksPost) -> Result<NetworkRecord> {
        debug!(
            "Define network {} ({}) of type {}",
            request.name, request.project, request.network_type
        );

        checks::network_name(&request.name).map_err(|reason| ValidationError::InvalidValue {
            key: "name".to_string(),
            reason,
        })?;

        let mut put = NetworkPut::new(request.description, request.config);
        let ignored = put.strip_volatile();
        if !ignored.is_empty() {
            debug!("Ignoring client supplied volatile keys {:?}", ignored);
        }

        // Validate through the driver before anything is persisted.
        let draft = NetworkRecord {
            id: 0,
            name: request.name.clone(),
            project: request.project.clone(),
            network_type: request.network_type.clone(),
            description: put.description.clone(),
            config: put.config.clone(),
            status: NetworkStatus::Pending,
            nodes: Default::default(),
        };
        self.driver(&draft)?.validate(&put.config).await?;

        let (project, name, network_type) = (request.project, request.name, request.network_type);
        let record = self
            .store()
            .query(move |tx| {
                let id = tx.create_pending_network(
                    &project,
                    &name,
                    &network_type,
                    &put.description,
                    &put.config,
                )?;
                tx.get_network_by_id(id)
            })
            .await?;

        info!("Defined network {} ({})", record.name, record.project);
        Ok(record)
    }

    /// Create and start a network.
    ///
    /// Normal requests define the record if needed, run the cluster-wide
    /// checks, have every other member create it, then start it locally.
    /// Any failure undoes what was done on every member.
    pub async fn create(&self, request: NetworksPost, client_type: ClientType) -> Result<()> {
        if !client_type.is_normal() {
            return self.create_local(&request.project, &request.name).await;
        }

        let _guard = self.locks.lock(&request.project, &request.name).await;
        debug!(
            "Create network {} ({}) client type {}",
            request.name, request.project, client_type
        );

        let existing = self
            .store()
            .query(|tx| tx.get_network(&request.project, &request.name))
            .await;
        let (record, defined) = match existing {
            Ok(record) if record.status == NetworkStatus::Created => {
                return Err(ConflictError::AlreadyExists {
                    project: record.project,
                    name: record.name,
                }
                .into());
            }
            Ok(record) => (record, false),
            Err(StoreError::NotFound { .. }) => (self.define_locked(request).await?, true),
            Err(err) => return Err(err.into()),
        };

        let mut driver = self.driver(&record)?;
        if !defined {
            driver.validate(&record.config).await?;
        }

        let mut revert = RevertScope::new(format!("create network {}", record.name));
        if defined {
            let store = Arc::clone(&self.ctx.store);
            let id = record.id;
            revert.add("remove network record", move || async move {
                store
                    .query(|tx| tx.delete_network(id))
                    .await
                    .map_err(anyhow::Error::from)
            });
        }

        let result = async {
            driver.create(ClientType::Normal).await?;

            let members = Arc::clone(&self.ctx.members);
            let (project, name) = (record.project.clone(), record.name.clone());
            revert.add("delete network on other members", move || async move {
                members
                    .notify_members(&project, &name, MemberRequest::Delete)
                    .await
                    .map_err(anyhow::Error::from)
            });
            self.ctx
                .members
                .notify_members(&record.project, &record.name, MemberRequest::Create)
                .await?;

            driver.start().await?;
            if let Err(err) = self.mark_node_created(record.id).await {
                if let Err(stop_err) = driver.stop().await {
                    warn!("Failed stopping network {}: {}", record.name, stop_err);
                }
                return Err(err);
            }
            Ok::<(), NetworkError>(())
        }
        .await;
        revert.finish(result).await?;

        info!("Created network {} ({})", record.name, record.project);
        self.publish(SystemEvent::NetworkCreated {
            project: record.project,
            name: record.name,
        })
        .await;
        Ok(())
    }

    /// Local part of a create replayed from another member: no cluster scans.
    pub async fn create_local(&self, project: &str, name: &str) -> Result<()> {
        let _guard = self.locks.lock(project, name).await;
        debug!("Create network {} ({}) client type notification", name, project);

        let record = self.record(project, name).await?;
        let mut driver = self.driver(&record)?;
        driver.create(ClientType::Notification).await?;
        driver.start().await?;

        if let Err(err) = self.mark_node_created(record.id).await {
            if let Err(stop_err) = driver.stop().await {
                warn!("Failed stopping network {}: {}", name, stop_err);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Mark this member Created, and the record once every member is.
    async fn mark_node_created(&self, id: i64) -> Result<NetworkStatus> {
        let node = self.node().to_string();
        let status = self
            .store()
            .query(move |tx| {
                tx.network_node_created(id, &node)?;
                if tx.get_network_by_id(id)?.all_nodes_created() {
                    tx.network_created(id)?;
                    return Ok(NetworkStatus::Created);
                }
                Ok(NetworkStatus::Pending)
            })
            .await
            .map_err(|e| e.into_network_error("Marking network created"))?;
        Ok(status)
    }

    pub async fn start(&self, project: &str, name: &str) -> Result<()> {
        let _guard = self.locks.lock(project, name).await;
        let record = self.record(project, name).await?;
        if record.local_status(self.node()) == NetworkStatus::Pending {
            return Err(ConflictError::Refused {
                message: format!(
                    "Network {:?} is not created on member {:?}",
                    name,
                    self.node()
                ),
            }
            .into());
        }
        self.driver(&record)?.start().await
    }

    pub async fn stop(&self, project: &str, name: &str) -> Result<()> {
        let _guard = self.locks.lock(project, name).await;
        let record = self.record(project, name).await?;
        self.driver(&record)?.stop().await
    }

    /// Networks created on this member, uplinks before their dependents.
    async fn local_networks(&self) -> Result<Vec<NetworkRecord>> {
        let node = self.node().to_string();
        let mut records = self
            .store()
            .query(move |tx| {
                Ok(tx
                    .get_networks(None)
                    .into_iter()
                    .filter(|r| r.local_status(&node) == NetworkStatus::Created)
                    .collect::<Vec<_>>())
            })
            .await?;
        records.sort_by(|a, b| {
            (startup_rank(a), &a.project, &a.name).cmp(&(startup_rank(b), &b.project, &b.name))
        });
        Ok(records)
    }

    /// Start every network created on this member. Failures are reported,
    /// not returned.
    pub async fn start_all(&self) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for record in self.local_networks().await? {
            let key = format!("{}/{}", record.project, record.name);
            let _guard = self.locks.lock(&record.project, &record.name).await;
            let result = async {
                let record = self.record(&record.project, &record.name).await?;
                self.driver(&record)?.start().await
            }
            .await;
            report.record(key, result, "start");
        }
        info!(
            "Started {} network(s), {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Stop every network created on this member, dependents first.
    pub async fn stop_all(&self) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for record in self.local_networks().await?.into_iter().rev() {
            let key = format!("{}/{}", record.project, record.name);
            let _guard = self.locks.lock(&record.project, &record.name).await;
            let result = async {
                let record = self.record(&record.project, &record.name).await?;
                self.driver(&record)?.stop().await
            }
            .await;
            report.record(key, result, "stop");
        }
        info!(
            "Stopped {} network(s), {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Update a network's description and config.
    ///
    /// Volatile keys are never taken from the client: the record's current
    /// ones (as seen by the target member) are carried forward instead.
    pub async fn update(
        &self,
        project: &str,
        name: &str,
        mut put: NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
    ) -> Result<()> {
        let _guard = self.locks.lock(project, name).await;
        debug!(
            "Update network {} ({}) client type {}",
            name, project, client_type
        );

        let record = self.record(project, name).await?;
        put.strip_volatile();
        let view = record.config_for(target_node.unwrap_or(self.node()));
        for (key, value) in view {
            if is_volatile_key(&key) {
                put.config.insert(key, value);
            }
        }

        let mut driver = self.driver(&record)?;
        driver.validate(&put.config).await?;
        driver.update(put, target_node, client_type).await
    }

    /// Stop and remove a network. Normal requests are refused while the
    /// network is in use and are replayed on every other member first.
    pub async fn delete(&self, project: &str, name: &str, client_type: ClientType) -> Result<()> {
        let guard = self.locks.lock(project, name).await;
        debug!(
            "Delete network {} ({}) client type {}",
            name, project, client_type
        );

        let record = self.record(project, name).await?;
        let mut driver = self.driver(&record)?;

        if client_type.is_normal() {
            if driver.common().is_used().await? {
                return Err(ConflictError::Refused {
                    message: format!("Network {:?} is in use", name),
                }
                .into());
            }
            self.ctx
                .members
                .notify_members(project, name, MemberRequest::Delete)
                .await?;
        }

        driver.delete(client_type).await?;

        if client_type.is_normal() {
            drop(guard);
            self.locks.forget(project, name).await;
            info!("Deleted network {} ({})", name, project);
            self.publish(SystemEvent::NetworkDeleted {
                project: project.to_string(),
                name: name.to_string(),
            })
            .await;
        }
        Ok(())
    }

    /// Rename a network. Only supported on a single-member cluster.
    pub async fn rename(&self, project: &str, name: &str, new_name: &str) -> Result<()> {
        checks::network_name(new_name).map_err(|reason| ValidationError::InvalidValue {
            key: "name".to_string(),
            reason,
        })?;

        let members = self.store().query(|tx| Ok(tx.members().len())).await?;
        if members > 1 {
            return Err(ConflictError::Refused {
                message: "Renaming a network is not supported in a cluster".to_string(),
            }
            .into());
        }

        let guard = self.locks.lock(project, name).await;
        let record = self.record(project, name).await?;
        self.driver(&record)?.rename(new_name).await?;
        drop(guard);
        self.locks.forget(project, name).await;

        info!("Renamed network {} to {} ({})", name, new_name, project);
        self.publish(SystemEvent::NetworkRenamed {
            project: project.to_string(),
            old_name: name.to_string(),
            new_name: new_name.to_string(),
        })
        .await;
        Ok(())
    }

    pub async fn get(&self, project: &str, name: &str) -> Result<NetworkRecord> {
        self.record(project, name).await
    }

    /// Networks of `project`, or of every project.
    pub async fn list(&self, project: Option<&str>) -> Result<Vec<NetworkRecord>> {
        Ok(self.store().query(|tx| Ok(tx.get_networks(project))).await?)
    }

    pub async fn warnings(&self) -> Result<Vec<Warning>> {
        Ok(self
            .store()
            .query(|tx| Ok(tx.warnings().to_vec()))
            .await?)
    }

    /// Run the dependency handler of every network using `name` as uplink.
    pub async fn apply_dependency_change(
        &self,
        project: &str,
        name: &str,
        changed_keys: &[String],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        // Uplinks live in the default project only.
        if project != DEFAULT_PROJECT {
            return Ok(report);
        }

        let uplink = self.record(project, name).await?;
        let uplink_name = name.to_string();
        let dependents = self
            .store()
            .query(move |tx| {
                Ok(tx
                    .get_networks(None)
                    .into_iter()
                    .filter(|r| r.config.get("network") == Some(&uplink_name))
                    .collect::<Vec<_>>())
            })
            .await?;

        for dependent in dependents {
            let key = format!("{}/{}", dependent.project, dependent.name);
            debug!("Updating dependent network {} of {}", key, name);
            let _guard = self.locks.lock(&dependent.project, &dependent.name).await;
            let result = async {
                let record = self.record(&dependent.project, &dependent.name).await?;
                self.driver(&record)?
                    .handle_dependency_change(&uplink, changed_keys)
                    .await
            }
            .await;
            report.record(key, result, "update dependent");
        }
        Ok(report)
    }
}

/// Start order: uplink-capable networks first, unknown types last.
fn startup_rank(record: &NetworkRecord) -> u8 {
    match record.network_type.parse::<NetworkType>() {
        Ok(network_type) if network_type.can_be_uplink() => 0,
        Ok(_) => 1,
        Err(_) => 2,
    }
}
