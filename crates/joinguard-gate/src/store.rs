//! Durable checkpoints of pending verifications
//!
//! The gate writes the full pending set after every create and resolve, so
//! in-flight challenge windows survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use joinguard_common::StoreError;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::registry::VerificationRecord;

/// Current on-disk snapshot layout
pub const SNAPSHOT_VERSION: u32 = 1;

/// Trait for pending-set storage backends
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Load the last checkpoint; empty if none exists
    async fn load(&self) -> Result<Vec<VerificationRecord>, StoreError>;

    /// Replace the checkpoint with `records`
    async fn save(&self, records: &[VerificationRecord]) -> Result<(), StoreError>;
}

/// Versioned envelope around any persisted collection
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub items: Vec<T>,
}

/// Read a snapshot file; a missing file is an empty snapshot
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot yet");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot: Snapshot<T> = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "{}: unsupported snapshot version {}",
            path.display(),
            snapshot.version
        )));
    }
    Ok(snapshot.items)
}

/// Write a snapshot via a temp file and rename
pub async fn write_snapshot<T: Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    #[derive(Serialize)]
    struct SnapshotRef<'a, T> {
        version: u32,
        saved_at: DateTime<Utc>,
        items: &'a [T],
    }

    let json = serde_json::to_vec_pretty(&SnapshotRef {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        items,
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// JSON file backed store
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes writers so the file never goes backwards
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PendingStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<VerificationRecord>, StoreError> {
        let records: Vec<VerificationRecord> = read_snapshot(&self.path).await?;
        debug!(path = %self.path.display(), count = records.len(), "loaded pending verifications");
        Ok(records)
    }

    async fn save(&self, records: &[VerificationRecord]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_snapshot(&self.path, records).await.map_err(|e| {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to checkpoint pending verifications"
            );
            e
        })
    }
}

/// In-memory store, for tests and for running without a state directory
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<VerificationRecord>>,
    saves: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate, as if a previous process had checkpointed `records`
    pub fn with_records(records: Vec<VerificationRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<VerificationRecord> {
        self.records.read().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PendingStore for InMemoryStore {
    async fn load(&self) -> Result<Vec<VerificationRecord>, StoreError> {
        Ok(self.records.read().clone())
    }

    async fn save(&self, records: &[VerificationRecord]) -> Result<(), StoreError> {
        *self.records.write() = records.to_vec();
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
