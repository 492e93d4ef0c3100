//! Host interface control contract

use async_trait::async_trait;

use crate::error::HostResult;

/// Host-level interface operations used by the network drivers.
///
/// Every call is a single step: it either completes or reports a
/// [`HostOperationError`](crate::HostOperationError) naming what failed.
#[async_trait]
pub trait InterfaceController: Send + Sync {
    /// Create `name` as a VLAN sub-interface of `parent`.
    ///
    /// Returns `Ok(false)` without touching the host when `vlan` is empty or
    /// `name` already exists, `Ok(true)` when the interface was created.
    async fn create_vlan_interface(
        &self,
        parent: &str,
        name: &str,
        vlan: &str,
        gvrp: bool,
    ) -> HostResult<bool>;

    /// Create a bridge. Returns `Ok(false)` if it already existed.
    async fn create_bridge(&self, name: &str) -> HostResult<bool>;

    /// Enslave `name` to `master`.
    async fn set_master(&self, name: &str, master: &str) -> HostResult<()>;

    async fn remove_interface(&self, name: &str) -> HostResult<()>;

    async fn interface_exists(&self, name: &str) -> bool;

    async fn set_mtu(&self, name: &str, mtu: &str) -> HostResult<()>;
}

/// Name of the host device backing a parent/VLAN pair.
pub fn host_device_name(parent: &str, vlan: &str) -> String {
    if vlan.is_empty() {
        parent.to_string()
    } else {
        format!("{}.{}", parent, vlan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_device_name() {
        assert_eq!(host_device_name("eth0", ""), "eth0");
        assert_eq!(host_device_name("eth0", "10"), "eth0.10");
    }
}
