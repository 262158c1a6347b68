//! JSON-lines file-based storage implementation.
//!
//! Each collection is a single append-only file of one JSON document per line:
//! `changelogs` -> `<base>/changelogs.jsonl`.

use crate::{apply_query, validate_collection, Filter, Sort, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// JSON-lines file-based storage.
///
/// Appends are serialized through a single writer lock and flushed to disk
/// before `insert_one` returns.
#[derive(Clone)]
pub struct JsonlStorage {
    base_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonlStorage {
    /// Create a new JSON-lines storage at the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The directory holding collection files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> StorageResult<PathBuf> {
        validate_collection(collection)?;
        Ok(self.base_path.join(format!("{collection}.jsonl")))
    }

    /// Read every document of a collection in insertion order.
    async fn read_all(&self, collection: &str) -> StorageResult<Vec<Value>> {
        let path = self.collection_path(collection)?;
        debug!(path = %path.display(), "Reading collection");

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut documents = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    // A torn trailing write after a crash; the rest of the file is intact.
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable document"
                    );
                }
            }
        }

        Ok(documents)
    }
}

/// Drop a trailing partial line left by an interrupted append.
///
/// Appends always end with `\n`, so anything after the last newline is a
/// torn write that would otherwise swallow the next document.
async fn truncate_torn_tail(file: &mut fs::File, path: &Path) -> StorageResult<()> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(std::io::SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(());
    }

    file.seek(std::io::SeekFrom::Start(0)).await?;
    let mut content = Vec::with_capacity(len as usize);
    file.read_to_end(&mut content).await?;
    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i as u64 + 1)
        .unwrap_or(0);

    warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "Truncating torn trailing document"
    );
    file.set_len(keep).await?;
    Ok(())
}

#[async_trait]
impl Storage for JsonlStorage {
    async fn insert_one(&self, collection: &str, document: Value) -> StorageResult<()> {
        if !document.is_object() {
            return Err(StorageError::invalid_document("document must be a JSON object"));
        }
        let path = self.collection_path(collection)?;
        let mut line = serde_json::to_string(&document)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        debug!(path = %path.display(), "Appending to collection");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        truncate_torn_tail(&mut file, &path).await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StorageResult<Vec<Value>> {
        let documents = self.read_all(collection).await?;
        Ok(apply_query(documents, filter, sort))
    }

    async fn count(&self, collection: &str) -> StorageResult<usize> {
        Ok(self.read_all(collection).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_insert_and_find() {
        let dir = tempdir().unwrap();
        let storage = JsonlStorage::new(dir.path());

        storage
            .insert_one("changelogs", json!({"fileName": "sales.csv", "rowIndex": 0}))
            .await
            .unwrap();

        let found = storage
            .find("changelogs", &Filter::new().eq("fileName", "sales.csv"), None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["rowIndex"], 0);
    }

    #[tokio::test]
    async fn test_find_missing_collection_is_empty() {
        let dir = tempdir().unwrap();
        let storage = JsonlStorage::new(dir.path());

        let found = storage.find("nothing", &Filter::new(), None).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(storage.count("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = JsonlStorage::new(dir.path());
            storage.insert_one("c", json!({"n": 1})).await.unwrap();
            storage.insert_one("c", json!({"n": 2})).await.unwrap();
        }

        let reopened = JsonlStorage::new(dir.path());
        assert_eq!(reopened.count("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let storage = JsonlStorage::new(dir.path());
        storage.insert_one("c", json!({"n": 1})).await.unwrap();

        let path = dir.path().join("c.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"n\": 2, \"trunc");
        std::fs::write(&path, content).unwrap();

        let found = storage.find("c", &Filter::new(), None).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_torn_line_is_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.jsonl");
        std::fs::write(&path, "{\"n\":1}\n{\"n\": 2, \"trunc").unwrap();

        let storage = JsonlStorage::new(dir.path());
        storage.insert_one("c", json!({"n": 3})).await.unwrap();
        storage.insert_one("c", json!({"n": 4})).await.unwrap();

        let found = storage.find("c", &Filter::new(), None).await.unwrap();
        assert_eq!(found, vec![json!({"n": 1}), json!({"n": 3}), json!({"n": 4})]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"n\":1}\n{\"n\":3}\n{\"n\":4}\n"
        );
    }

    #[tokio::test]
    async fn test_append_after_torn_first_line() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("c.jsonl"), "{\"n\": 1").unwrap();

        let storage = JsonlStorage::new(dir.path());
        storage.insert_one("c", json!({"n": 2})).await.unwrap();

        let found = storage.find("c", &Filter::new(), None).await.unwrap();
        assert_eq!(found, vec![json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_all_kept() {
        let dir = tempdir().unwrap();
        let storage = JsonlStorage::new(dir.path());

        let mut handles = Vec::new();
        for n in 0..20 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.insert_one("c", json!({"n": n})).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(storage.count("c").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_invalid_inputs() {
        let dir = tempdir().unwrap();
        let storage = JsonlStorage::new(dir.path());

        assert!(storage.insert_one("", json!({})).await.is_err());
        assert!(storage.insert_one("../escape", json!({})).await.is_err());
        assert!(matches!(
            storage.insert_one("c", json!([1, 2])).await,
            Err(StorageError::InvalidDocument(_))
        ));
    }
}
