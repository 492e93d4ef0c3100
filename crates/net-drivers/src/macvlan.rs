//! Macvlan network driver
//!
//! Instances get macvlan devices on a shared parent; the network itself
//! owns nothing on the host.

use async_trait::async_trait;
use log::debug;

use clusternet_core::{HostOperationError, Result};
use clusternet_shared_types::{ClientType, NetworkPut};
use clusternet_validate::{checks, Rule, RuleSet};

use crate::common::CommonNetwork;
use crate::driver::{update_and_restart, NetworkDriver};

pub struct MacvlanNetwork {
    common: CommonNetwork,
}

impl MacvlanNetwork {
    pub fn new(common: CommonNetwork) -> Self {
        Self { common }
    }
}

#[async_trait]
impl NetworkDriver for MacvlanNetwork {
    fn common(&self) -> &CommonNetwork {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonNetwork {
        &mut self.common
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .with("parent", Rule::required(checks::interface_name))
            .with("mtu", Rule::optional(checks::network_mtu))
            .with("vlan", Rule::optional(checks::network_vlan))
            .with("gvrp", Rule::optional(checks::boolean))
            .with("maas.subnet.ipv4", Rule::any())
            .with("maas.subnet.ipv6", Rule::any())
    }

    async fn create(&mut self, client_type: ClientType) -> Result<()> {
        debug!(
            "Create network {} ({}) client type {}",
            self.common.name(),
            self.common.project(),
            client_type
        );
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        debug!("Start network {} ({})", self.common.name(), self.common.project());

        let parent = self.common.get("parent");
        let result = if self.common.host().interface_exists(parent).await {
            Ok(())
        } else {
            Err(HostOperationError::new(
                format!("starting network {:?}", self.common.name()),
                format!("parent interface {:?} not found", parent),
            )
            .into())
        };

        self.common.record_start_result(&result).await;
        result
    }

    async fn stop(&mut self) -> Result<()> {
        debug!("Stop network {} ({})", self.common.name(), self.common.project());
        Ok(())
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
}
