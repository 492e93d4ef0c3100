//! Physical network driver
//!
//! Attaches a network to a host interface, optionally through a VLAN
//! sub-interface created on demand. The (parent, VLAN) pair is claimed
//! exclusively within the default project.

use std::sync::Arc;

use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use log::{debug, warn};

use clusternet_config::{ClusterTx, StoreResult};
use clusternet_core::{
    host_device_name, ConflictError, InterfaceController, NetworkError, ParentClaim, Result,
    RevertScope,
};
use clusternet_shared_types::{
    is_true, ClientType, ConfigMap, NetworkPut, DEFAULT_PROJECT, VOLATILE_LAST_STATE_CREATED,
};
use clusternet_validate::{checks, Rule, RuleSet};

use crate::common::{CommonNetwork, WriteGuard};
use crate::driver::{update_and_restart, NetworkDriver};

const DEFAULT_MTU: &str = "1500";

pub struct PhysicalNetwork {
    common: CommonNetwork,
}

impl PhysicalNetwork {
    pub fn new(common: CommonNetwork) -> Self {
        Self { common }
    }

    fn host_name(&self) -> String {
        host_device_name(self.common.get("parent"), self.common.get("vlan"))
    }

    /// Whether another default-project network claims the parent/VLAN of `config`.
    ///
    /// Runs as a cluster-wide scan inside a store transaction.
    pub async fn check_parent_use(&self, config: &ConfigMap) -> Result<bool> {
        let id = self.common.id();
        let config = config.clone();
        let in_use = self
            .common
            .store()
            .query(move |tx| Ok(parent_claimed(tx, &config, id)))
            .await?;
        Ok(in_use)
    }

    /// Refuses the write when the config being written claims a parent/VLAN
    /// pair another network committed in the meantime.
    fn claim_guard(&self) -> WriteGuard {
        let id = self.common.id();
        Arc::new(move |tx: &mut ClusterTx, config: &mut ConfigMap| -> StoreResult<()> {
            if parent_claimed(tx, config, id) {
                return Err(ConflictError::ParentInUse {
                    parent: config.get("parent").cloned().unwrap_or_default(),
                }
                .into());
            }
            Ok(())
        })
    }

    async fn start_inner(&mut self) -> Result<()> {
        debug!("Start network {} ({})", self.common.name(), self.common.project());

        let host: Arc<dyn InterfaceController> = Arc::clone(self.common.host());
        let host_name = self.host_name();
        let mut revert = RevertScope::new(format!("start network {}", self.common.name()));

        let result = async {
            let created = host
                .create_vlan_interface(
                    self.common.get("parent"),
                    &host_name,
                    self.common.get("vlan"),
                    is_true(self.common.get("gvrp")),
                )
                .await?;
            if created {
                let host = Arc::clone(&host);
                let name = host_name.clone();
                revert.add(format!("remove interface {}", host_name), move || async move {
                    host.remove_interface(&name).await.map_err(anyhow::Error::from)
                });
            }

            let mtu = self.common.get("mtu").to_string();
            if !mtu.is_empty() {
                host.set_mtu(&host_name, &mtu).await?;
            }

            // Keep an earlier "true" so a restart never forgets we own the interface.
            if !is_true(self.common.get(VOLATILE_LAST_STATE_CREATED)) {
                self.common
                    .config_mut()
                    .insert(VOLATILE_LAST_STATE_CREATED.to_string(), created.to_string());
                self.common.persist_node_config("Saving volatile config").await?;
            }

            Ok::<(), NetworkError>(())
        }
        .await;

        revert.finish(result).await
    }
}

/// Whether a default-project network other than `own_id` conflicts with the
/// parent/VLAN claim of `config`.
fn parent_claimed(tx: &mut ClusterTx, config: &ConfigMap, own_id: i64) -> bool {
    let Some(ours) = ParentClaim::from_config(config) else {
        return false;
    };
    let networks = tx.get_created_networks_by_project();
    let Some(defaults) = networks.get(DEFAULT_PROJECT) else {
        return false;
    };
    defaults.values().any(|network| {
        network.id != own_id
            && ParentClaim::from_config(&network.config)
                .map_or(false, |theirs| theirs.conflicts_with(&ours))
    })
}

#[async_trait]
impl NetworkDriver for PhysicalNetwork {
    fn common(&self) -> &CommonNetwork {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonNetwork {
        &mut self.common
    }

    fn dhcpv4_subnet(&self) -> Option<Ipv4Net> {
        self.common
            .get("ipv4.gateway")
            .parse::<Ipv4Net>()
            .ok()
            .map(|net| net.trunc())
    }

    fn dhcpv6_subnet(&self) -> Option<Ipv6Net> {
        self.common
            .get("ipv6.gateway")
            .parse::<Ipv6Net>()
            .ok()
            .map(|net| net.trunc())
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .with("parent", Rule::required(checks::interface_name))
            .with("mtu", Rule::optional(checks::network_mtu))
            .with("vlan", Rule::optional(checks::network_vlan))
            .with("gvrp", Rule::optional(checks::boolean))
            .with("maas.subnet.ipv4", Rule::any())
            .with("maas.subnet.ipv6", Rule::any())
            .with("ipv4.gateway", Rule::optional(checks::ipv4_cidr))
            .with("ipv6.gateway", Rule::optional(checks::ipv6_cidr))
            .with("ipv4.ovn.ranges", Rule::optional(checks::ipv4_range_list))
            .with("ipv6.ovn.ranges", Rule::optional(checks::ipv6_range_list))
            .with("ipv4.routes", Rule::optional(checks::ipv4_network_list))
            .with("ipv4.routes.anycast", Rule::optional(checks::boolean))
            .with("ipv6.routes", Rule::optional(checks::ipv6_network_list))
            .with("ipv6.routes.anycast", Rule::optional(checks::boolean))
            .with("dns.nameservers", Rule::optional(checks::address_list))
            .with(
                "ovn.ingress_mode",
                Rule::optional(checks::one_of(&["l2proxy", "routed"])),
            )
            .with(VOLATILE_LAST_STATE_CREATED, Rule::optional(checks::boolean))
    }

    async fn create(&mut self, client_type: ClientType) -> Result<()> {
        debug!(
            "Create network {} ({}) client type {}",
            self.common.name(),
            self.common.project(),
            client_type
        );

        // The originating member already scanned the cluster.
        if client_type.is_normal() && self.check_parent_use(self.common.config()).await? {
            return Err(ConflictError::ParentInUse {
                parent: self.common.get("parent").to_string(),
            }
            .into());
        }

        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let result = self.start_inner().await;
        self.common.record_start_result(&result).await;
        result
    }

    async fn stop(&mut self) -> Result<()> {
        debug!("Stop network {} ({})", self.common.name(), self.common.project());

        let host = Arc::clone(self.common.host());
        let host_name = self.host_name();

        // Only remove VLAN interfaces we created.
        if !self.common.get("vlan").is_empty()
            && is_true(self.common.get(VOLATILE_LAST_STATE_CREATED))
            && host.interface_exists(&host_name).await
        {
            host.remove_interface(&host_name).await?;
        }

        if !self.common.get("mtu").is_empty() && host.interface_exists(&host_name).await {
            host.set_mtu(&host_name, DEFAULT_MTU).await?;
        }

        self.common.config_mut().shift_remove(VOLATILE_LAST_STATE_CREATED);
        self.common
            .persist_node_config("Removing volatile config")
            .await
    }

    async fn update(
        &mut self,
        mut put: NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
    ) -> Result<()> {
        debug!(
            "Update network {} ({}) client type {}",
            self.common.name(),
            self.common.project(),
            client_type
        );

        let (needed, changed) = self.common.config_changed(&put);
        if !needed {
            return Ok(());
        }

        // Never realised anywhere yet: record only.
        if self.common.is_pending() {
            return self.common.update(put, target_node, client_type).await;
        }

        let host_name_changed = changed.iter().any(|k| k == "vlan" || k == "parent");

        if client_type.is_normal() && host_name_changed {
            if self.common.is_used().await? {
                return Err(ConflictError::InUse {
                    name: self.common.name().to_string(),
                }
                .into());
            }
            if self.check_parent_use(&put.config).await? {
                return Err(ConflictError::ParentInUse {
                    parent: put.config.get("parent").cloned().unwrap_or_default(),
                }
                .into());
            }
        }

        if host_name_changed {
            self.stop().await?;
            put.config.shift_remove(VOLATILE_LAST_STATE_CREATED);
        }

        // Claims committed since the check above are caught by the guard.
        let guard = (client_type.is_normal() && host_name_changed).then(|| self.claim_guard());
        if let Err(err) = update_and_restart(self, put, target_node, client_type, guard).await {
            if host_name_changed {
                if let Err(restart_err) = self.start().await {
                    warn!(
                        "Failed restarting network {} with its previous config: {}",
                        self.common.name(),
                        restart_err
                    );
                }
            }
            return Err(err);
        }

        if client_type.is_normal() && !changed.is_empty() {
            self.common.notify_dependent_networks(&changed).await;
        }

        Ok(())
    }
}
