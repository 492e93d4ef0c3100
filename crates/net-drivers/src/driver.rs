//! Network driver contract

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};

use clusternet_core::{Result, RevertScope, ValidationError};
use clusternet_shared_types::{ClientType, ConfigMap, NetworkPut, NetworkRecord, NetworkStatus};
use clusternet_validate::{validate_config, RuleSet};

use crate::common::{CommonNetwork, WriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NetworkType {
    Physical,
    Bridge,
    Macvlan,
    Overlay,
}

impl NetworkType {
    pub const ALL: [NetworkType; 4] = [
        NetworkType::Physical,
        NetworkType::Bridge,
        NetworkType::Macvlan,
        NetworkType::Overlay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkType::Physical => "physical",
            NetworkType::Bridge => "bridge",
            NetworkType::Macvlan => "macvlan",
            NetworkType::Overlay => "overlay",
        }
    }

    /// Whether other networks may use this type as their uplink.
    pub fn can_be_uplink(self) -> bool {
        matches!(self, NetworkType::Physical | NetworkType::Bridge)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NetworkType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                key: "type".to_string(),
                reason: format!("Unsupported network type {:?}", s),
            })
    }
}

/// Lifecycle of one network kind.
///
/// A driver instance works on a transient copy of one record, loaded for a
/// single operation. Every persisted change goes through the cluster store.
#[async_trait]
pub trait NetworkDriver: Send + Sync {
    fn common(&self) -> &CommonNetwork;

    fn common_mut(&mut self) -> &mut CommonNetwork;

    fn network_type(&self) -> NetworkType {
        self.common().network_type()
    }

    fn id(&self) -> i64 {
        self.common().id()
    }

    fn name(&self) -> &str {
        self.common().name()
    }

    fn project(&self) -> &str {
        self.common().project()
    }

    fn description(&self) -> &str {
        self.common().description()
    }

    fn config(&self) -> &ConfigMap {
        self.common().config()
    }

    fn status(&self) -> NetworkStatus {
        self.common().status()
    }

    fn local_status(&self) -> NetworkStatus {
        self.common().local_status()
    }

    /// Name of the default-project network this one uses as its uplink.
    fn uplink(&self) -> Option<&str> {
        None
    }

    /// Subnet served by DHCPv4 on this network, if any.
    fn dhcpv4_subnet(&self) -> Option<Ipv4Net> {
        None
    }

    fn dhcpv6_subnet(&self) -> Option<Ipv6Net> {
        None
    }

    /// Per-key rules accepted by this driver.
    fn rules(&self) -> RuleSet;

    /// Validate a full config for this network.
    async fn validate(&self, config: &ConfigMap) -> Result<()> {
        validate_config(config, &self.rules())?;
        Ok(())
    }

    /// Pre-flight checks before the network is started for the first time.
    async fn create(&mut self, client_type: ClientType) -> Result<()>;

    /// Realise the network on this member. Idempotent.
    async fn start(&mut self) -> Result<()>;

    /// Tear down what `start` realised on this member. Idempotent.
    async fn stop(&mut self) -> Result<()>;

    async fn update(
        &mut self,
        put: NetworkPut,
        target_node: Option<&str>,
        client_type: ClientType,
    ) -> Result<()>;

    async fn delete(&mut self, client_type: ClientType) -> Result<()> {
        self.stop().await?;
        self.common_mut().delete(client_type).await
    }

    async fn rename(&mut self, new_name: &str) -> Result<()> {
        self.common_mut().rename(new_name).await
    }

    /// React to a change of the uplink this network depends on.
    async fn handle_dependency_change(
        &mut self,
        _uplink: &NetworkRecord,
        _changed_keys: &[String],
    ) -> Result<()> {
        Ok(())
    }
}

/// Persist `put` through the cluster and restart the network under it.
///
/// `guard` runs in the transaction persisting `put`. On failure the previous
/// description and config are written back and the driver's copy is reset to
/// them before the error is returned.
pub async fn update_and_restart<D>(
    driver: &mut D,
    put: NetworkPut,
    target_node: Option<&str>,
    client_type: ClientType,
    guard: Option<WriteGuard>,
) -> Result<()>
where
    D: NetworkDriver + ?Sized,
{
    let old = driver.common().put();
    let mut revert = RevertScope::new(format!("update network {}", driver.name()));

    let writer = driver.common().writer();
    let target = target_node.map(str::to_string);
    let restore = old.clone();
    revert.add("restore previous configuration", move || async move {
        writer
            .apply(&restore, target.as_deref(), client_type, None)
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    });

    let result = async {
        driver
            .common_mut()
            .update_guarded(put, target_node, client_type, guard.as_ref())
            .await?;
        driver.start().await
    }
    .await;

    match result {
        Ok(()) => {
            revert.success();
            Ok(())
        }
        Err(err) => {
            revert.fail().await;
            driver.common_mut().reset(old);
            Err(err)
        }
    }
}
