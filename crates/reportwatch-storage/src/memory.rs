//! In-memory storage implementation for testing.

use crate::{apply_query, validate_collection, Filter, Sort, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// In-memory storage for testing.
///
/// This stores all data in memory and is not persistent.
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<Value>>>,
    fail_inserts: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            fail_inserts: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent `insert_one` fail, simulating an unreachable store.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Delay every `insert_one` and `find` by `latency`, simulating a slow store.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    async fn stall(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_one(&self, collection: &str, document: Value) -> StorageResult<()> {
        validate_collection(collection)?;
        if !document.is_object() {
            return Err(StorageError::invalid_document("document must be a JSON object"));
        }
        self.stall().await;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "store unavailable",
            )));
        }

        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.entry(collection.to_string()).or_default().push(document);

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StorageResult<Vec<Value>> {
        validate_collection(collection)?;
        self.stall().await;
        let documents = {
            let data = self
                .data
                .read()
                .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
            data.get(collection).cloned().unwrap_or_default()
        };
        Ok(apply_query(documents, filter, sort))
    }

    async fn count(&self, collection: &str) -> StorageResult<usize> {
        validate_collection(collection)?;
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.get(collection).map(Vec::len).unwrap_or(0))
    }
}
