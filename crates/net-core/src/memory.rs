//! In-memory host interface table
//!
//! Used by tests and by dry runs: it keeps enough state (existence, MTU,
//! master) to observe what a driver did, and can be told to fail a given
//! operation on a given interface.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use crate::error::{HostOperationError, HostResult};
use crate::interface::InterfaceController;

const DEFAULT_MTU: &str = "1500";

/// Mutating host operations, for failure injection and call tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    CreateVlan,
    CreateBridge,
    SetMaster,
    Remove,
    SetMtu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub mtu: String,
    pub master: Option<String>,
    pub bridge: bool,
}

impl Default for HostInterface {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU.to_string(),
            master: None,
            bridge: false,
        }
    }
}

#[derive(Debug, Default)]
struct HostTable {
    interfaces: BTreeMap<String, HostInterface>,
    failures: HashSet<(HostOp, String)>,
    calls: Vec<(HostOp, String)>,
}

#[derive(Debug, Default)]
pub struct InMemoryInterfaces {
    table: Mutex<HostTable>,
}

impl InMemoryInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with existing (non-created) interfaces.
    pub fn with_interfaces<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::new();
        {
            let mut table = host.lock();
            for name in names {
                table.interfaces.insert(name.into(), HostInterface::default());
            }
        }
        host
    }

    fn lock(&self) -> MutexGuard<'_, HostTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_interface(&self, name: impl Into<String>) {
        self.lock()
            .interfaces
            .insert(name.into(), HostInterface::default());
    }

    /// Make every future `op` on `name` fail.
    pub fn fail_on(&self, op: HostOp, name: impl Into<String>) {
        self.lock().failures.insert((op, name.into()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.lock().interfaces.keys().cloned().collect()
    }

    pub fn interface(&self, name: &str) -> Option<HostInterface> {
        self.lock().interfaces.get(name).cloned()
    }

    pub fn mtu(&self, name: &str) -> Option<String> {
        self.lock().interfaces.get(name).map(|i| i.mtu.clone())
    }

    /// Mutating calls that reached the table, in order (failed ones included).
    pub fn calls(&self) -> Vec<(HostOp, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: HostOp) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn check(table: &mut HostTable, op: HostOp, name: &str, step: String) -> HostResult<()> {
        table.calls.push((op, name.to_string()));
        if table.failures.contains(&(op, name.to_string())) {
            return Err(HostOperationError::new(step, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl InterfaceController for InMemoryInterfaces {
    async fn create_vlan_interface(
        &self,
        parent: &str,
        name: &str,
        vlan: &str,
        _gvrp: bool,
    ) -> HostResult<bool> {
        let mut table = self.lock();
        if vlan.is_empty() || table.interfaces.contains_key(name) {
            return Ok(false);
        }

        let step = format!("creating VLAN interface {:?}", name);
        Self::check(&mut table, HostOp::CreateVlan, name, step.clone())?;
        if !table.interfaces.contains_key(parent) {
            return Err(HostOperationError::new(
                step,
                format!("parent interface {:?} not found", parent),
            ));
        }

        debug!("Created VLAN interface {} on {}", name, parent);
        table
            .interfaces
            .insert(name.to_string(), HostInterface::default());
        Ok(true)
    }

    async fn create_bridge(&self, name: &str) -> HostResult<bool> {
        let mut table = self.lock();
        if table.interfaces.contains_key(name) {
            return Ok(false);
        }

        Self::check(
            &mut table,
            HostOp::CreateBridge,
            name,
            format!("creating bridge {:?}", name),
        )?;
        table.interfaces.insert(
            name.to_string(),
            HostInterface {
                bridge: true,
                ..HostInterface::default()
            },
        );
        Ok(true)
    }

    async fn set_master(&self, name: &str, master: &str) -> HostResult<()> {
        let mut table = self.lock();
        let step = format!("attaching {:?} to {:?}", name, master);
        Self::check(&mut table, HostOp::SetMaster, name, step.clone())?;
        if !table.interfaces.contains_key(master) {
            return Err(HostOperationError::new(step, "master not found"));
        }
        match table.interfaces.get_mut(name) {
            Some(iface) => {
                iface.master = Some(master.to_string());
                Ok(())
            }
            None => Err(HostOperationError::new(step, "no such device")),
        }
    }

    async fn remove_interface(&self, name: &str) -> HostResult<()> {
        let mut table = self.lock();
        let step = format!("removing interface {:?}", name);
        Self::check(&mut table, HostOp::Remove, name, step.clone())?;
        if table.interfaces.remove(name).is_none() {
            return Err(HostOperationError::new(step, "no such device"));
        }
        for iface in table.interfaces.values_mut() {
            if iface.master.as_deref() == Some(name) {
                iface.master = None;
            }
        }
        Ok(())
    }

    async fn interface_exists(&self, name: &str) -> bool {
        self.lock().interfaces.contains_key(name)
    }

    async fn set_mtu(&self, name: &str, mtu: &str) -> HostResult<()> {
        let mut table = self.lock();
        let step = format!("setting MTU {:?} on {:?}", mtu, name);
        Self::check(&mut table, HostOp::SetMtu, name, step.clone())?;
        match table.interfaces.get_mut(name) {
            Some(iface) => {
                iface.mtu = mtu.to_string();
                Ok(())
            }
            None => Err(HostOperationError::new(step, "no such device")),
        }
    }
}
