//! `ip(8)` backed implementation of [`InterfaceController`]

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{HostOperationError, HostResult};
use crate::interface::InterfaceController;

/// Runs `ip link` commands against the local kernel.
#[derive(Debug, Clone)]
pub struct IpRouteController {
    ip_binary: PathBuf,
    sysfs_net: PathBuf,
    command_timeout: Duration,
}

impl Default for IpRouteController {
    fn default() -> Self {
        Self {
            ip_binary: PathBuf::from("/sbin/ip"),
            sysfs_net: PathBuf::from("/sys/class/net"),
            command_timeout: Duration::from_secs(10),
        }
    }
}

impl IpRouteController {
    pub fn new(
        ip_binary: impl Into<PathBuf>,
        sysfs_net: impl Into<PathBuf>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            ip_binary: ip_binary.into(),
            sysfs_net: sysfs_net.into(),
            command_timeout,
        }
    }

    /// Run `ip <args>`; a non-zero exit or a timeout is a failed `step`.
    async fn ip(&self, step: &str, args: &[&str]) -> HostResult<()> {
        debug!("Running {} {}", self.ip_binary.display(), args.join(" "));

        let mut cmd = Command::new(&self.ip_binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                error!("{} failed: {}", step, stderr);
                Err(HostOperationError::new(step, stderr))
            }
            Ok(Err(err)) => Err(HostOperationError::new(step, err.to_string())),
            Err(_) => {
                error!("{} timed out after {:?}", step, self.command_timeout);
                Err(HostOperationError::new(
                    step,
                    format!("timed out after {:?}", self.command_timeout),
                ))
            }
        }
    }
}

#[async_trait]
impl InterfaceController for IpRouteController {
    async fn create_vlan_interface(
        &self,
        parent: &str,
        name: &str,
        vlan: &str,
        gvrp: bool,
    ) -> HostResult<bool> {
        if vlan.is_empty() || self.interface_exists(name).await {
            return Ok(false);
        }

        if !self.interface_exists(parent).await {
            return Err(HostOperationError::new(
                format!("creating VLAN interface {:?}", name),
                format!("parent interface {:?} not found", parent),
            ));
        }

        let step = format!("creating VLAN interface {:?}", name);
        let gvrp = if gvrp { "on" } else { "off" };
        self.ip(
            &step,
            &[
                "link", "add", "link", parent, "name", name, "up", "type", "vlan", "id", vlan,
                "gvrp", gvrp,
            ],
        )
        .await?;

        Ok(true)
    }

    async fn create_bridge(&self, name: &str) -> HostResult<bool> {
        if self.interface_exists(name).await {
            return Ok(false);
        }

        let step = format!("creating bridge {:?}", name);
        self.ip(&step, &["link", "add", "dev", name, "type", "bridge"])
            .await?;
        self.ip(&step, &["link", "set", "dev", name, "up"]).await?;
        Ok(true)
    }

    async fn set_master(&self, name: &str, master: &str) -> HostResult<()> {
        let step = format!("attaching {:?} to {:?}", name, master);
        self.ip(&step, &["link", "set", "dev", name, "master", master])
            .await
    }

    async fn remove_interface(&self, name: &str) -> HostResult<()> {
        let step = format!("removing interface {:?}", name);
        self.ip(&step, &["link", "delete", "dev", name]).await
    }

    async fn interface_exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.sysfs_net.join(name)).await.is_ok()
    }

    async fn set_mtu(&self, name: &str, mtu: &str) -> HostResult<()> {
        let step = format!("setting MTU {:?} on {:?}", mtu, name);
        self.ip(&step, &["link", "set", "dev", name, "mtu", mtu])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existence_reads_sysfs() {
        let sysfs = tempfile::tempdir().unwrap();
        std::fs::create_dir(sysfs.path().join("eth0")).unwrap();

        let ctl = IpRouteController::new("/bin/false", sysfs.path(), Duration::from_secs(1));
        assert!(ctl.interface_exists("eth0").await);
        assert!(!ctl.interface_exists("eth1").await);
    }

    #[tokio::test]
    async fn test_untagged_and_existing_are_not_created() {
        let sysfs = tempfile::tempdir().unwrap();
        std::fs::create_dir(sysfs.path().join("eth0")).unwrap();
        std::fs::create_dir(sysfs.path().join("eth0.10")).unwrap();

        // The binary must never be invoked for these calls.
        let ctl = IpRouteController::new("/nonexistent/ip", sysfs.path(), Duration::from_secs(1));
        assert!(!ctl.create_vlan_interface("eth0", "eth0", "", false).await.unwrap());
        assert!(!ctl
            .create_vlan_interface("eth0", "eth0.10", "10", false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_parent_is_a_failed_step() {
        let sysfs = tempfile::tempdir().unwrap();
        let ctl = IpRouteController::new("/nonexistent/ip", sysfs.path(), Duration::from_secs(1));

        let err = ctl
            .create_vlan_interface("eth9", "eth9.10", "10", false)
            .await
            .unwrap_err();
        assert!(err.step.contains("eth9.10"));
        assert!(err.message.contains("eth9"));
    }

    #[tokio::test]
    async fn test_command_failure_reports_step() {
        let sysfs = tempfile::tempdir().unwrap();
        let ctl = IpRouteController::new("/nonexistent/ip", sysfs.path(), Duration::from_secs(1));

        let err = ctl.set_mtu("eth0", "9000").await.unwrap_err();
        assert_eq!(err.step, "setting MTU \"9000\" on \"eth0\"");
    }
}
