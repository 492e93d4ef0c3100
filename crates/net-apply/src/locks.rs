//! Per-record operation locks

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one lifecycle operation on a record.
pub type RecordGuard = OwnedMutexGuard<()>;

/// Serialises operations on the same (project, name); different records
/// proceed concurrently.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, project: &str, name: &str) -> RecordGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry((project.to_string(), name.to_string()))
                    .or_default(),
            )
        };
        debug!("Waiting for lock on network {}/{}", project, name);
        lock.lock_owned().await
    }

    /// Drop the lock entry of a removed or renamed record.
    pub async fn forget(&self, project: &str, name: &str) {
        let mut locks = self.locks.lock().await;
        let key = (project.to_string(), name.to_string());
        // Someone is still waiting on it.
        if locks.get(&key).map_or(false, |l| Arc::strong_count(l) > 1) {
            return;
        }
        locks.remove(&key);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
