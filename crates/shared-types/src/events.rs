use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Network finished its cluster-wide create sequence
    NetworkCreated { project: String, name: String },
    /// Network configuration changed; consumed by networks using it as uplink
    NetworkUpdated {
        project: String,
        name: String,
        changed_keys: Vec<String>,
    },
    /// Network record was removed
    NetworkDeleted { project: String, name: String },
    /// Network identity changed
    NetworkRenamed {
        project: String,
        old_name: String,
        new_name: String,
    },
}

impl SystemEvent {
    /// Project and name of the network the event refers to.
    pub fn network(&self) -> (&str, &str) {
        match self {
            SystemEvent::NetworkCreated { project, name }
            | SystemEvent::NetworkUpdated { project, name, .. }
            | SystemEvent::NetworkDeleted { project, name } => (project, name),
            SystemEvent::NetworkRenamed {
                project, new_name, ..
            } => (project, new_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = SystemEvent::NetworkUpdated {
            project: "default".into(),
            name: "uplink".into(),
            changed_keys: vec!["ipv4.gateway".into()],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "network_updated");
        assert_eq!(event.network(), ("default", "uplink"));
    }
}
