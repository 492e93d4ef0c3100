use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    NetworkStartupFailure,
}

impl fmt::Display for WarningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningType::NetworkStartupFailure => write!(f, "Network startup failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Network,
}

/// Entity a warning is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: i64,
}

impl EntityRef {
    pub fn network(id: i64) -> Self {
        Self {
            entity_type: EntityType::Network,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningStatus {
    New,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub uuid: Uuid,
    pub node: String,
    pub project: String,
    pub entity: EntityRef,
    pub warning_type: WarningType,
    pub last_message: String,
    pub count: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: WarningStatus,
}

impl Warning {
    pub fn new(
        node: &str,
        project: &str,
        entity: EntityRef,
        warning_type: WarningType,
        message: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            uuid: Uuid::new_v4(),
            node: node.to_string(),
            project: project.to_string(),
            entity,
            warning_type,
            last_message: message.to_string(),
            count: 1,
            first_seen_at: now,
            last_seen_at: now,
            status: WarningStatus::New,
        }
    }

    pub fn matches(
        &self,
        node: &str,
        project: &str,
        entity: EntityRef,
        warning_type: WarningType,
    ) -> bool {
        self.node == node
            && self.project == project
            && self.entity == entity
            && self.warning_type == warning_type
    }
}
