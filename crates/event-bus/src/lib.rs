//! Network event bus
//!
//! Lifecycle events are handed to named listeners in name order. A listener
//! only sees the events it accepts, and one failing listener never keeps the
//! event from the others.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clusternet_shared_types::SystemEvent;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::RwLock;

pub type EventBusResult<T> = Result<T, EventBusError>;

#[async_trait]
pub trait EventListener: Send + Sync {
    /// Whether `event` should be delivered to this listener.
    fn accepts(&self, _event: &SystemEvent) -> bool {
        true
    }

    async fn on_event(&self, event: &SystemEvent) -> anyhow::Result<()>;
}

type Listeners = BTreeMap<String, Arc<dyn EventListener>>;

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_listener<L>(
        &self,
        name: impl Into<String>,
        listener: L,
    ) -> EventBusResult<()>
    where
        L: EventListener + 'static,
    {
        let name = name.into();
        let mut listeners = self.listeners.write().await;
        if listeners.contains_key(&name) {
            return Err(EventBusError::DuplicateListener(name));
        }
        debug!("Listener {} subscribed to network events", name);
        listeners.insert(name, Arc::new(listener));
        Ok(())
    }

    pub async fn unregister_listener(&self, name: &str) -> EventBusResult<()> {
        match self.listeners.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(EventBusError::UnknownListener(name.to_string())),
        }
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Deliver `event` to every accepting listener.
    pub async fn publish(&self, event: SystemEvent) -> EventBusResult<()> {
        // Listeners may publish in turn, so no lock is held while they run.
        let targets: Vec<(String, Arc<dyn EventListener>)> = self
            .listeners
            .read()
            .await
            .iter()
            .filter(|(_, listener)| listener.accepts(&event))
            .map(|(name, listener)| (name.clone(), Arc::clone(listener)))
            .collect();

        let (project, network) = event.network();
        let mut failed = PublishFailures::default();
        for (name, listener) in targets {
            if let Err(err) = listener.on_event(&event).await {
                warn!(
                    "Listener {} failed handling event for {}/{}: {:#}",
                    name, project, network, err
                );
                failed.0.push((name, format!("{:#}", err)));
            }
        }

        if failed.0.is_empty() {
            Ok(())
        } else {
            Err(EventBusError::Delivery(failed))
        }
    }
}

/// Listener name and error of every failed delivery
#[derive(Debug, Clone, Default)]
pub struct PublishFailures(pub Vec<(String, String)>);

impl fmt::Display for PublishFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (listener, error)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", listener, error)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("Listener {0:?} is already registered")]
    DuplicateListener(String),
    #[error("No listener named {0:?}")]
    UnknownListener(String),
    #[error("Event delivery failed: {0}")]
    Delivery(PublishFailures),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Records the networks it hears about; optionally only updates.
    struct Recorder {
        journal: Journal,
        updates_only: bool,
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn accepts(&self, event: &SystemEvent) -> bool {
            !self.updates_only || matches!(event, SystemEvent::NetworkUpdated { .. })
        }

        async fn on_event(&self, event: &SystemEvent) -> anyhow::Result<()> {
            let (project, name) = event.network();
            self.journal.0.lock().unwrap().push(format!("{}/{}", project, name));
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl EventListener for Refusing {
        async fn on_event(&self, _event: &SystemEvent) -> anyhow::Result<()> {
            anyhow::bail!("dependent refused update")
        }
    }

    fn updated(name: &str) -> SystemEvent {
        SystemEvent::NetworkUpdated {
            project: "default".into(),
            name: name.into(),
            changed_keys: vec!["ipv4.ovn.ranges".into()],
        }
    }

    fn deleted(name: &str) -> SystemEvent {
        SystemEvent::NetworkDeleted {
            project: "default".into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn test_listener_only_sees_accepted_events() {
        let bus = EventBus::new();
        let all = Journal::default();
        let updates = Journal::default();
        bus.register_listener("all", Recorder { journal: all.clone(), updates_only: false })
            .await
            .unwrap();
        bus.register_listener("updates", Recorder { journal: updates.clone(), updates_only: true })
            .await
            .unwrap();

        bus.publish(updated("uplink0")).await.unwrap();
        bus.publish(deleted("br0")).await.unwrap();

        assert_eq!(all.entries(), vec!["default/uplink0", "default/br0"]);
        assert_eq!(updates.entries(), vec!["default/uplink0"]);

        let duplicate = bus.register_listener("all", Refusing).await;
        assert!(matches!(duplicate, Err(EventBusError::DuplicateListener(_))));
    }

    #[tokio::test]
    async fn test_failed_delivery_still_reaches_later_listeners() {
        let bus = EventBus::new();
        let journal = Journal::default();
        bus.register_listener("a-refusing", Refusing).await.unwrap();
        bus.register_listener("b-recorder", Recorder { journal: journal.clone(), updates_only: false })
            .await
            .unwrap();

        match bus.publish(updated("uplink0")).await {
            Err(EventBusError::Delivery(failures)) => {
                assert_eq!(failures.0.len(), 1);
                assert_eq!(failures.to_string(), "a-refusing: dependent refused update");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(journal.entries().len(), 1);

        bus.unregister_listener("a-refusing").await.unwrap();
        assert!(bus.unregister_listener("a-refusing").await.is_err());
        assert_eq!(bus.listener_count().await, 1);
        bus.publish(updated("uplink0")).await.unwrap();
    }
}
