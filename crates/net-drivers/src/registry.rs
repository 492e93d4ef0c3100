//! Driver registry
//!
//! Maps the type stored in a network record to the driver constructor.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use clusternet_core::Result;
use clusternet_shared_types::NetworkRecord;

use crate::bridge::BridgeNetwork;
use crate::common::{CommonNetwork, DriverContext};
use crate::driver::{NetworkDriver, NetworkType};
use crate::macvlan::MacvlanNetwork;
use crate::overlay::OverlayNetwork;
use crate::physical::PhysicalNetwork;

/// Driver constructor
pub type DriverFactory = Box<dyn Fn(CommonNetwork) -> Box<dyn NetworkDriver> + Send + Sync>;

pub struct DriverRegistry {
    factories: RwLock<HashMap<NetworkType, DriverFactory>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    /// Registry with the built-in drivers.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(
            NetworkType::Physical,
            Box::new(|common| Box::new(PhysicalNetwork::new(common))),
        );
        registry.register(
            NetworkType::Bridge,
            Box::new(|common| Box::new(BridgeNetwork::new(common))),
        );
        registry.register(
            NetworkType::Macvlan,
            Box::new(|common| Box::new(MacvlanNetwork::new(common))),
        );
        registry.register(
            NetworkType::Overlay,
            Box::new(|common| Box::new(OverlayNetwork::new(common))),
        );
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<NetworkType, DriverFactory>> {
        self.factories.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<NetworkType, DriverFactory>> {
        self.factories.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register or replace the driver of `network_type`.
    pub fn register(&self, network_type: NetworkType, factory: DriverFactory) {
        self.write().insert(network_type, factory);
        debug!("Registered network driver: {}", network_type);
    }

    /// Driver instance for `record` as seen from `ctx.node`.
    pub fn load(&self, record: &NetworkRecord, ctx: DriverContext) -> Result<Box<dyn NetworkDriver>> {
        let common = CommonNetwork::from_record(record, ctx)?;
        let network_type = common.network_type();

        let factories = self.read();
        let factory = factories.get(&network_type).ok_or_else(|| {
            clusternet_core::NetworkError::semantic(format!(
                "No driver registered for network type {}",
                network_type
            ))
        })?;
        Ok(factory(common))
    }

    pub fn available_types(&self) -> Vec<NetworkType> {
        let mut types: Vec<NetworkType> = self.read().keys().copied().collect();
        types.sort();
        types
    }
}
