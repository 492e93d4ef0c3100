//! Dependent network notifications over the event bus

use std::sync::Weak;

use async_trait::async_trait;
use log::debug;

use clusternet_drivers::DependencyNotifier;
use clusternet_event_bus::{EventBus, EventListener};
use clusternet_shared_types::SystemEvent;

use crate::lifecycle::LifecycleOrchestrator;

/// Publishes [`SystemEvent::NetworkUpdated`] for the networks using the
/// updated one as their uplink.
#[derive(Clone)]
pub struct EventBusNotifier {
    bus: EventBus,
}

impl EventBusNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DependencyNotifier for EventBusNotifier {
    async fn network_updated(
        &self,
        project: &str,
        name: &str,
        changed_keys: &[String],
    ) -> anyhow::Result<()> {
        self.bus
            .publish(SystemEvent::NetworkUpdated {
                project: project.to_string(),
                name: name.to_string(),
                changed_keys: changed_keys.to_vec(),
            })
            .await?;
        Ok(())
    }
}

/// Runs the dependency handler of every network whose uplink was updated.
pub struct DependentNetworkListener {
    orchestrator: Weak<LifecycleOrchestrator>,
}

impl DependentNetworkListener {
    pub fn new(orchestrator: Weak<LifecycleOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl EventListener for DependentNetworkListener {
    fn accepts(&self, event: &SystemEvent) -> bool {
        matches!(event, SystemEvent::NetworkUpdated { .. })
    }

    async fn on_event(&self, event: &SystemEvent) -> anyhow::Result<()> {
        let SystemEvent::NetworkUpdated {
            project,
            name,
            changed_keys,
        } = event
        else {
            return Ok(());
        };

        let Some(orchestrator) = self.orchestrator.upgrade() else {
            debug!("Orchestrator gone, ignoring update of {}/{}", project, name);
            return Ok(());
        };

        let report = orchestrator
            .apply_dependency_change(project, name, changed_keys)
            .await?;
        if report.failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} dependent network(s) of {} failed: {}",
                report.failed.len(),
                name,
                report.failed.join(", ")
            ))
        }
    }
}
