//! In-memory snapshot storage with per-file exclusion.

use crate::{Row, Snapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Exclusive hold on one file identifier.
///
/// Every load -> compare/mutate -> snapshot update sequence for a file runs
/// while holding its guard. Dropping the guard releases the file.
pub struct FileGuard {
    file_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl FileGuard {
    /// The file this guard holds.
    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

impl std::fmt::Debug for FileGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileGuard")
            .field("file_id", &self.file_id)
            .finish()
    }
}

/// Process-wide map from file identifier to its last-observed rows.
///
/// Holds at most one snapshot per file; `put` replaces, never merges.
/// Nothing is persisted: after a restart every file is unseen again.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusion scope for a file.
    ///
    /// Operations on different files never contend.
    pub async fn lock(&self, file_id: &str) -> FileGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(file_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        FileGuard {
            file_id: file_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Get the current snapshot for a file.
    pub fn get(&self, file_id: &str) -> Option<Snapshot> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.get(file_id).cloned()
    }

    /// Replace the snapshot of the guarded file with `rows`.
    pub fn put(&self, guard: &FileGuard, rows: Vec<Row>) -> Snapshot {
        let snapshot = Snapshot::new(guard.file_id(), rows);
        debug!(file = %guard.file_id(), rows = snapshot.len(), "Storing snapshot");

        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(guard.file_id().to_string(), snapshot.clone());
        snapshot
    }

    /// Whether a file has been observed.
    pub fn contains(&self, file_id: &str) -> bool {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.contains_key(file_id)
    }

    /// Identifiers of all observed files, sorted.
    pub fn file_ids(&self) -> Vec<String> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = snapshots.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
