//! In-memory cluster store

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use crate::store::{ClusterState, ClusterStore, ClusterTx, StoreError, StoreResult, TxFn};

/// Cluster store kept in process memory.
///
/// Several orchestrators sharing one instance behave like members of one
/// cluster. Writes can be made to fail to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryClusterStore {
    state: Mutex<ClusterState>,
    scans: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose cluster consists of `members`.
    pub fn with_members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = ClusterState {
            members: members.into_iter().map(Into::into).collect(),
            ..ClusterState::default()
        };
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Store starting from a copy of another store's state.
    pub fn from_state(state: ClusterState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every committing transaction fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ClusterState {
        self.lock().clone()
    }

    pub fn reset_scan_count(&self) {
        self.scans.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn transaction<'a>(&self, f: TxFn<'a>) -> StoreResult<()> {
        let mut state = self.lock();
        let mut tx = ClusterTx::new(state.clone());
        let result = f(&mut tx);
        self.scans.fetch_add(tx.scans(), Ordering::SeqCst);
        result?;

        if tx.is_dirty() {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("writes disabled".to_string()));
            }
            debug!("Committing in-memory cluster transaction");
            *state = tx.into_state();
        }
        Ok(())
    }

    fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }
}
