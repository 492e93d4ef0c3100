//! Warning sink

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use clusternet_shared_types::{EntityRef, WarningType};

use crate::store::{ClusterStore, StoreResult};

/// Destination for per-member warnings raised by drivers.
#[async_trait]
pub trait WarningSink: Send + Sync {
    async fn upsert_local_warning(
        &self,
        node: &str,
        project: &str,
        entity: EntityRef,
        warning_type: WarningType,
        message: &str,
    ) -> StoreResult<()>;

    async fn resolve_local_warnings(
        &self,
        node: &str,
        project: &str,
        warning_type: WarningType,
        entity: EntityRef,
    ) -> StoreResult<()>;
}

/// Warnings persisted in the cluster store
#[derive(Clone)]
pub struct ClusterWarnings {
    store: Arc<dyn ClusterStore>,
}

impl ClusterWarnings {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WarningSink for ClusterWarnings {
    async fn upsert_local_warning(
        &self,
        node: &str,
        project: &str,
        entity: EntityRef,
        warning_type: WarningType,
        message: &str,
    ) -> StoreResult<()> {
        let warning = self
            .store
            .query(|tx| Ok(tx.upsert_warning(node, project, entity, warning_type, message)))
            .await?;
        debug!(
            "Warning {} ({}) seen {} time(s): {}",
            warning.uuid, warning.warning_type, warning.count, warning.last_message
        );
        Ok(())
    }

    async fn resolve_local_warnings(
        &self,
        node: &str,
        project: &str,
        warning_type: WarningType,
        entity: EntityRef,
    ) -> StoreResult<()> {
        let resolved = self
            .store
            .query(|tx| Ok(tx.resolve_warnings(node, project, warning_type, entity)))
            .await?;
        if resolved > 0 {
            debug!("Resolved {} {} warning(s)", resolved, warning_type);
        }
        Ok(())
    }
}
