//! Wiring of the store, host controller and orchestrator for one invocation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};

use clusternet_apply::LifecycleOrchestrator;
use clusternet_config::{
    ClusterStore, ClusterWarnings, FileClusterStore, MemoryClusterStore, Settings,
};
use clusternet_core::{InMemoryInterfaces, InterfaceController, IpRouteController};

pub struct CliContext {
    pub settings: Settings,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub dry_run: bool,
}

impl CliContext {
    /// Build the context from settings.
    ///
    /// A dry run works on a copy of the persisted state and on an in-memory
    /// host seeded with the interfaces currently present, so nothing it does
    /// outlives the process.
    pub async fn bootstrap(settings: Settings, dry_run: bool) -> Result<Arc<Self>> {
        let file_store = FileClusterStore::new(settings.state_path.clone());

        let store: Arc<dyn ClusterStore>;
        let host: Arc<dyn InterfaceController>;
        if dry_run {
            let state = file_store
                .load()
                .await
                .with_context(|| format!("Failed to read {}", settings.state_path.display()))?;
            let names = host_interfaces(&settings.sysfs_net_path).await;
            debug!("Dry run seeded with {} host interface(s)", names.len());
            store = Arc::new(MemoryClusterStore::from_state(state));
            host = Arc::new(InMemoryInterfaces::with_interfaces(names));
        } else {
            store = Arc::new(file_store);
            host = Arc::new(IpRouteController::new(
                settings.ip_binary.clone(),
                settings.sysfs_net_path.clone(),
                settings.command_timeout(),
            ));
        }

        let members = settings.cluster_members();
        store
            .query(|tx| {
                for member in &members {
                    tx.join_member(member);
                }
                Ok(())
            })
            .await
            .context("Failed to register cluster members")?;

        let orchestrator = LifecycleOrchestrator::builder(&settings.node_name, store.clone(), host)
            .warnings(Arc::new(ClusterWarnings::new(store)))
            .build()
            .await;

        info!(
            "Member {} ready ({} member(s){})",
            settings.node_name,
            members.len(),
            if dry_run { ", dry run" } else { "" }
        );

        Ok(Arc::new(Self {
            settings,
            orchestrator,
            dry_run,
        }))
    }
}

/// Names of the interfaces listed under the sysfs network directory.
async fn host_interfaces(sysfs_net: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(sysfs_net).await {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Cannot list {}: {}", sysfs_net.display(), err);
            return names;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}
