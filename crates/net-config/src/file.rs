//! File-backed cluster store
//!
//! The whole cluster state is a single JSON document. Transactions are
//! serialised by an in-process mutex and, across processes, by a lock file
//! next to the state file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::store::{ClusterState, ClusterStore, ClusterTx, StoreError, StoreResult, TxFn};

/// Maximum time spent waiting for the state lock file.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Content of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub timestamp: u64,
}

/// Held lock file, removed on drop.
#[derive(Debug)]
struct StateLock {
    path: PathBuf,
}

impl StateLock {
    async fn acquire(path: &Path, timeout: Duration) -> StoreResult<Self> {
        let start = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        timestamp: unix_now(),
                    };
                    file.write_all(&serde_json::to_vec(&info)?).await?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(path).await {
                        warn!("Removing stale lock file {}", path.display());
                        let _ = fs::remove_file(path).await;
                        continue;
                    }
                    if start.elapsed() >= timeout {
                        return Err(StoreError::Lock(format!(
                            "{} still held after {:?}",
                            path.display(),
                            timeout
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn is_stale(path: &Path) -> bool {
        let Ok(content) = fs::read(path).await else {
            return false;
        };
        match serde_json::from_slice::<LockInfo>(&content) {
            Ok(info) => unix_now().saturating_sub(info.timestamp) > LOCK_TIMEOUT.as_secs(),
            // Half-written by a holder that is still writing it.
            Err(_) => false,
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), err);
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct FileClusterStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    guard: Mutex<()>,
    scans: AtomicU64,
}

impl FileClusterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_timeout: LOCK_TIMEOUT,
            guard: Mutex::new(()),
            scans: AtomicU64::new(0),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current persisted state, empty if the file does not exist yet.
    pub async fn load(&self) -> StoreResult<ClusterState> {
        match fs::read(&self.path).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ClusterState::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, state: &ClusterState) -> StoreResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for FileClusterStore {
    async fn transaction<'a>(&self, f: TxFn<'a>) -> StoreResult<()> {
        let _guard = self.guard.lock().await;
        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let _lock = StateLock::acquire(&self.lock_path, self.lock_timeout).await?;

        let mut tx = ClusterTx::new(self.load().await?);
        let result = f(&mut tx);
        self.scans.fetch_add(tx.scans(), Ordering::SeqCst);
        result?;

        if tx.is_dirty() {
            debug!("Writing cluster state to {}", self.path.display());
            self.save(&tx.into_state()).await?;
        }
        Ok(())
    }

    fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }
}
