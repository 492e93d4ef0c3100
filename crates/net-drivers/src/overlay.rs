//! Overlay network driver
//!
//! An overlay rides on an uplink network of the default project. Each overlay
//! gets one address out of the uplink's `ipv4.ovn.ranges`, allocated once by
//! the member handling the normal create request.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use clusternet_config::{ClusterTx, StoreError, StoreResult};
use clusternet_core::{ConflictError, NetworkError, Result};
use clusternet_shared_types::{ClientType, ConfigMap, NetworkPut, NetworkRecord, DEFAULT_PROJECT};
use clusternet_validate::checks::{self, parse_ipv4_ranges};
use clusternet_validate::{validate_config, Rule, RuleSet};

use crate::common::{CommonNetwork, WriteGuard};
use crate::driver::{update_and_restart, NetworkDriver, NetworkType};

/// Address of the overlay on its uplink.
pub const VOLATILE_UPLINK_ADDRESS: &str = "volatile.network.ipv4.address";

/// Uplink keys the address allocation depends on.
const ALLOCATION_KEYS: [&str; 2] = ["ipv4.ovn.ranges", "ipv4.gateway"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allocation {
    Assigned(Ipv4Addr),
    /// The uplink has no ranges to allocate from.
    Cleared,
    Exhausted,
}

pub struct OverlayNetwork {
    common: CommonNetwork,
}

impl OverlayNetwork {
    pub fn new(common: CommonNetwork) -> Self {
        Self { common }
    }

    /// Keep the current uplink address if still valid, otherwise take the
    /// first free one. Scan and write happen in one transaction.
    async fn allocate_uplink_address(&mut self, clear_on_exhaustion: bool) -> Result<Allocation> {
        let id = self.common.id();
        let node = self.common.node().to_string();
        let description = self.common.description().to_string();
        let mut config = self.common.config().clone();

        let (allocation, config) = self
            .common
            .store()
            .query(move |tx| {
                let before = config.get(VOLATILE_UPLINK_ADDRESS).cloned();
                let allocation = allocate_in(tx, id, &mut config, clear_on_exhaustion)?;
                if config.get(VOLATILE_UPLINK_ADDRESS) != before.as_ref() {
                    tx.update_network(id, &node, &description, &config)?;
                }
                Ok((allocation, config))
            })
            .await
            .map_err(|e| e.into_network_error("Allocating uplink address"))?;

        *self.common.config_mut() = config;
        Ok(allocation)
    }

    /// Allocates the address on the new uplink in the transaction that
    /// persists the move.
    fn uplink_guard(&self) -> WriteGuard {
        let id = self.common.id();
        Arc::new(move |tx: &mut ClusterTx, config: &mut ConfigMap| -> StoreResult<()> {
            allocate_in(tx, id, config, false).map(|_| ())
        })
    }
}

/// Settle the uplink address of network `id` in `config` against the uplink
/// named by its `network` key.
///
/// An exhausted range is refused unless `clear_on_exhaustion`, in which case
/// the address is dropped.
fn allocate_in(
    tx: &mut ClusterTx,
    id: i64,
    config: &mut ConfigMap,
    clear_on_exhaustion: bool,
) -> StoreResult<Allocation> {
    let uplink_name = config.get("network").cloned().unwrap_or_default();
    let networks = tx.get_created_networks_by_project();
    let uplink = networks
        .get(DEFAULT_PROJECT)
        .and_then(|n| n.values().find(|r| r.name == uplink_name))
        .ok_or_else(|| StoreError::NotFound {
            kind: "Uplink network",
            name: uplink_name.clone(),
        })?;

    let ranges = parse_ipv4_ranges(
        uplink.config.get("ipv4.ovn.ranges").map(String::as_str).unwrap_or_default(),
    )
    .map_err(StoreError::Internal)?;

    let used: HashSet<Ipv4Addr> = networks
        .values()
        .flat_map(|n| n.values())
        .filter(|r| r.id != id && r.config.get("network") == Some(&uplink_name))
        .filter_map(|r| r.config.get(VOLATILE_UPLINK_ADDRESS)?.parse().ok())
        .collect();

    let current: Option<Ipv4Addr> = config
        .get(VOLATILE_UPLINK_ADDRESS)
        .and_then(|a| a.parse().ok());

    let allocation = if ranges.is_empty() {
        Allocation::Cleared
    } else {
        match current {
            Some(addr) if in_ranges(addr, &ranges) && !used.contains(&addr) => {
                Allocation::Assigned(addr)
            }
            _ => first_free(&ranges, &used)
                .map(Allocation::Assigned)
                .unwrap_or(Allocation::Exhausted),
        }
    };

    match allocation {
        Allocation::Assigned(addr) => {
            config.insert(VOLATILE_UPLINK_ADDRESS.to_string(), addr.to_string());
        }
        Allocation::Cleared => {
            config.shift_remove(VOLATILE_UPLINK_ADDRESS);
        }
        Allocation::Exhausted if clear_on_exhaustion => {
            config.shift_remove(VOLATILE_UPLINK_ADDRESS);
        }
        Allocation::Exhausted => {
            return Err(ConflictError::Refused {
                message: format!(
                    "No free address left in the ranges of uplink network {:?}",
                    uplink_name
                ),
            }
            .into());
        }
    }
    Ok(allocation)
}

fn in_ranges(addr: Ipv4Addr, ranges: &[(Ipv4Addr, Ipv4Addr)]) -> bool {
    ranges.iter().any(|(start, end)| *start <= addr && addr <= *end)
}

fn first_free(ranges: &[(Ipv4Addr, Ipv4Addr)], used: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
    for (start, end) in ranges {
        let (start, end) = (u32::from(*start), u32::from(*end));
        // At most `used.len()` candidates can be taken.
        let last = end.min(start.saturating_add(used.len() as u32));
        if let Some(free) = (start..=last).map(Ipv4Addr::from).find(|a| !used.contains(a)) {
            return Some(free);
        }
    }
    None
}

#[async_trait]
impl NetworkDriver for OverlayNetwork {
    fn common(&self) -> &CommonNetwork {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonNetwork {
        &mut self.common
    }

    fn uplink(&self) -> Option<&str> {
        Some(self.common.get("network")).filter(|n| !n.is_empty())
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .with("network", Rule::required(checks::network_name))
            .with("bridge.mtu", Rule::optional(checks::network_mtu))
            .with("ipv4.address", Rule::optional(checks::ipv4_cidr_or_keyword))
            .with("ipv6.address", Rule::optional(checks::ipv6_cidr_or_keyword))
            .with("dns.domain", Rule::optional(checks::dns_domain))
            .with(VOLATILE_UPLINK_ADDRESS, Rule::optional(checks::ipv4_address))
    }

    async fn validate(&self, config: &ConfigMap) -> Result<()> {
        validate_config(config, &self.rules())?;

        let uplink_name = config.get("network").cloned().unwrap_or_default();
        let lookup = uplink_name.clone();
        let uplink = self
            .common
            .store()
            .query(move |tx| tx.get_network(DEFAULT_PROJECT, &lookup))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => {
                    NetworkError::semantic(format!("Uplink network {:?} not found", uplink_name))
                }
                other => other.into_network_error("Loading uplink network"),
            })?;

        let uplink_type: NetworkType = uplink.network_type.parse()?;
        if !uplink_type.can_be_uplink() {
            return Err(NetworkError::semantic(format!(
                "Network {:?} of type {} cannot be used as an uplink",
                uplink.name, uplink_type
            )));
        }
        Ok(())
    }

    async fn create(&mut self, client_type: ClientType) -> Result<()> {
        debug!(
            "Create network {} ({}) client type {}",
            self.common.name(),
            self.common.project(),
            client_type
        );

        if client_type.is_normal() {
            if let Allocation::Assigned(addr) = self.allocate_uplink_address(false).await? {
                info!(
                    "Network {} uses address {} on uplink {}",
                    self.common.name(),
                    addr,
                    self.common.get("network")
                );
            }
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        debug!("Start network {} ({})", self.common.name(), self.common.project());

        let uplink = self.common.get("network").to_string();
        let lookup = uplink.clone();
        let result = self
            .common
            .store()
            .query(move |tx| tx.get_network(DEFAULT_PROJECT, &lookup))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                StoreError::NotFound { .. } => NetworkError::NotFound {
                    kind: "Uplink network",
                    name: uplink,
                },
                other => other.into_network_error("Loading uplink network"),
            });

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

        let guard = (client_type.is_normal() && changed.iter().any(|k| k == "network"))
            .then(|| self.uplink_guard());
        update_and_restart(self, put, target_node, client_type, guard).await
    }

    async fn handle_dependency_change(
        &mut self,
        uplink: &NetworkRecord,
        changed_keys: &[String],
    ) -> Result<()> {
        if !changed_keys
            .iter()
            .any(|k| ALLOCATION_KEYS.contains(&k.as_str()))
        {
            return Ok(());
        }

        debug!(
            "Uplink {} of network {} changed {:?}",
            uplink.name,
            self.common.name(),
            changed_keys
        );
        match self.allocate_uplink_address(true).await? {
            Allocation::Assigned(addr) => info!(
                "Network {} uses address {} on uplink {}",
                self.common.name(),
                addr,
                uplink.name
            ),
            Allocation::Cleared => debug!(
                "Uplink {} has no ranges, network {} has no uplink address",
                uplink.name,
                self.common.name()
            ),
            Allocation::Exhausted => warn!(
                "No free address for network {} on uplink {}, address cleared",
                self.common.name(),
                uplink.name
            ),
        }
        Ok(())
    }
}
