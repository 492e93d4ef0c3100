//! Daemon and CLI settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for setting overrides.
pub const ENV_PREFIX: &str = "CLUSTERNET";

pub const DEFAULT_STATE_PATH: &str = "/var/lib/clusternet/cluster.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of this cluster member
    pub node_name: String,
    /// Other cluster members
    pub members: Vec<String>,
    /// Location of the file-backed cluster store
    pub state_path: PathBuf,
    pub ip_binary: PathBuf,
    pub sysfs_net_path: PathBuf,
    /// Upper bound for a single host command
    pub command_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let node_name = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            node_name,
            members: Vec::new(),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            ip_binary: PathBuf::from("/sbin/ip"),
            sysfs_net_path: PathBuf::from("/sys/class/net"),
            command_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load settings from an optional file, then `CLUSTERNET_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("members"),
            )
            .build()
            .context("Failed to read settings")?;

        settings
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// This member followed by the other members, without duplicates.
    pub fn cluster_members(&self) -> Vec<String> {
        let mut members = vec![self.node_name.clone()];
        for member in &self.members {
            if !members.contains(member) {
                members.push(member.clone());
            }
        }
        members
    }
}
