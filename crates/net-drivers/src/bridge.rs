//! Bridge network driver
//!
//! Owns a host bridge named after the network and enslaves the configured
//! external interfaces to it.

use std::sync::Arc;

use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use log::{debug, warn};

use clusternet_core::{ConflictError, InterfaceController, NetworkError, Result, RevertScope};
use clusternet_shared_types::{is_true, ClientType, NetworkPut, VOLATILE_LAST_STATE_CREATED};
use clusternet_validate::{checks, Rule, RuleSet};

use crate::common::CommonNetwork;
use crate::driver::{update_and_restart, NetworkDriver};

pub struct BridgeNetwork {
    common: CommonNetwork,
}

impl BridgeNetwork {
    pub fn new(common: CommonNetwork) -> Self {
        Self { common }
    }

    fn external_interfaces(&self) -> Vec<String> {
        self.common
            .get("bridge.external_interfaces")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    async fn start_inner(&mut self) -> Result<()> {
        debug!("Start network {} ({})", self.common.name(), self.common.project());

        let host: Arc<dyn InterfaceController> = Arc::clone(self.common.host());
        let bridge = self.common.name().to_string();
        let mut revert = RevertScope::new(format!("start network {}", bridge));

        let result = async {
            let created = host.create_bridge(&bridge).await?;
            if created {
                let host = Arc::clone(&host);
                let name = bridge.clone();
                revert.add(format!("remove bridge {}", bridge), move || async move {
                    host.remove_interface(&name).await.map_err(anyhow::Error::from)
                });
            }

            let mtu = self.common.get("bridge.mtu").to_string();
            if !mtu.is_empty() {
                host.set_mtu(&bridge, &mtu).await?;
            }

            for iface in self.external_interfaces() {
                if !host.interface_exists(&iface).await {
                    warn!("Skipping missing external interface {} of bridge {}", iface, bridge);
                    continue;
                }
                host.set_master(&iface, &bridge).await?;
            }

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

    /// Subnet of `key` unless it is unset or a keyword.
    fn address_subnet<N: std::str::FromStr>(&self, key: &str) -> Option<N> {
        match self.common.get(key) {
            "" | "none" | "auto" => None,
            value => value.parse().ok(),
        }
    }
}

#[async_trait]
impl NetworkDriver for BridgeNetwork {
    fn common(&self) -> &CommonNetwork {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonNetwork {
        &mut self.common
    }

    fn dhcpv4_subnet(&self) -> Option<Ipv4Net> {
        self.address_subnet::<Ipv4Net>("ipv4.address")
            .map(|net| net.trunc())
    }

    fn dhcpv6_subnet(&self) -> Option<Ipv6Net> {
        self.address_subnet::<Ipv6Net>("ipv6.address")
            .map(|net| net.trunc())
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .with("bridge.mtu", Rule::optional(checks::network_mtu))
            .with("bridge.hwaddr", Rule::optional(checks::mac_address))
            .with(
                "bridge.external_interfaces",
                Rule::optional(checks::interface_list),
            )
            .with("ipv4.address", Rule::optional(checks::ipv4_cidr_or_keyword))
            .with("ipv4.nat", Rule::optional(checks::boolean))
            .with("ipv6.address", Rule::optional(checks::ipv6_cidr_or_keyword))
            .with("ipv6.nat", Rule::optional(checks::boolean))
            .with("ipv4.ovn.ranges", Rule::optional(checks::ipv4_range_list))
            .with("ipv6.ovn.ranges", Rule::optional(checks::ipv6_range_list))
            .with("dns.domain", Rule::optional(checks::dns_domain))
            .with(VOLATILE_LAST_STATE_CREATED, Rule::optional(checks::boolean))
    }

    async fn create(&mut self, client_type: ClientType) -> Result<()> {
        debug!(
            "Create network {} ({}) client type {}",
            self.common.name(),
            self.common.project(),
            client_type
        );

        if self.common.host().interface_exists(self.common.name()).await {
            return Err(ConflictError::HostObjectExists {
                name: self.common.name().to_string(),
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
        let bridge = self.common.name().to_string();
        if is_true(self.common.get(VOLATILE_LAST_STATE_CREATED)) && host.interface_exists(&bridge).await {
            host.remove_interface(&bridge).await?;
        }

        self.common.config_mut().shift_remove(VOLATILE_LAST_STATE_CREATED);
        self.common
            .persist_node_config("Removing volatile config")
            .await
    }

    async fn update(
        &mut self,
        put: NetworkPut,
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
        if self.common.is_pending() {
            return self.common.update(put, target_node, client_type).await;
        }

        update_and_restart(self, put, target_node, client_type, None).await?;

        if client_type.is_normal() && !changed.is_empty() {
            self.common.notify_dependent_networks(&changed).await;
        }
        Ok(())
    }

    async fn rename(&mut self, new_name: &str) -> Result<()> {
        debug!("Rename network {} to {}", self.common.name(), new_name);

        // The host bridge carries the old name.
        if self.common.host().interface_exists(self.common.name()).await {
            return Err(ConflictError::Refused {
                message: format!(
                    "Cannot rename network {:?} while its bridge exists on the host",
                    self.common.name()
                ),
            }
            .into());
        }
        self.common.rename(new_name).await
    }
}
