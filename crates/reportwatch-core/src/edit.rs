//! Single-cell edits applied to files on disk.

use crate::audit::{self, AuditTrail, ChangeEvent};
use crate::error::{ReportError, ReportResult};
use crate::tabular::{self, TabularLoader};
use reportwatch_snapshot::SnapshotStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditOutcome {
    /// The recorded change, or `None` when the value was already current.
    pub event: Option<ChangeEvent>,
    /// Whether the change reached the audit trail.
    pub audit_recorded: bool,
}

/// Applies targeted cell mutations and records them.
#[derive(Debug, Clone)]
pub struct EditGateway {
    root: PathBuf,
    snapshots: Arc<SnapshotStore>,
    audit: AuditTrail,
    loader: TabularLoader,
}

impl EditGateway {
    pub fn new(
        root: impl Into<PathBuf>,
        snapshots: Arc<SnapshotStore>,
        audit: AuditTrail,
        loader: TabularLoader,
    ) -> Self {
        Self {
            root: root.into(),
            snapshots,
            audit,
            loader,
        }
    }

    /// Set one cell of one row to `new_value`.
    ///
    /// The change is recorded before the file is written. A failed record
    /// is logged and the write still happens; a failed write fails the edit.
    pub async fn edit(
        &self,
        file_id: &str,
        row_index: usize,
        column_name: &str,
        new_value: &str,
        modified_by: &str,
    ) -> ReportResult<EditOutcome> {
        let path = tabular::resolve(&self.root, file_id)?;
        if !path.is_file() {
            return Err(ReportError::FileNotFound(file_id.to_string()));
        }

        let guard = self.snapshots.lock(file_id).await;
        let mut rows = self.loader.load(&path).await?;

        let row_count = rows.len();
        let Some(row) = rows.get_mut(row_index) else {
            return Err(ReportError::RowNotFound {
                file: file_id.to_string(),
                row_index,
                row_count,
            });
        };

        let old_value = row.get(column_name).unwrap_or("").to_string();
        if old_value == new_value {
            info!(file = %file_id, row = row_index, column = %column_name, "Edit left value unchanged");
            return Ok(EditOutcome {
                event: None,
                audit_recorded: false,
            });
        }
        row.set(column_name, new_value);

        let event = ChangeEvent {
            file_name: file_id.to_string(),
            row_index,
            column_name: column_name.to_string(),
            old_value,
            new_value: new_value.to_string(),
            modified_by: modified_by.to_string(),
            timestamp: audit::now(),
        };

        let audit_recorded = match self.audit.append(&event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    file = %file_id,
                    row = row_index,
                    column = %column_name,
                    code = %e.kind(),
                    error = %e,
                    "Audit record failed, applying edit anyway"
                );
                false
            }
        };

        self.loader.write(&path, rows.clone()).await?;
        self.snapshots.put(&guard, rows);

        info!(
            file = %file_id,
            row = row_index,
            column = %column_name,
            by = %modified_by,
            "Applied edit"
        );

        Ok(EditOutcome {
            event: Some(event),
            audit_recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use reportwatch_storage::MemoryStorage;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        storage: Arc<MemoryStorage>,
        snapshots: Arc<SnapshotStore>,
        gateway: EditGateway,
    }

    fn fixture(csv: &str) -> Fixture {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("sales.csv"), csv).unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let snapshots = Arc::new(SnapshotStore::new());
        let timeout = Duration::from_secs(5);
        let gateway = EditGateway::new(
            dir.path(),
            snapshots.clone(),
            AuditTrail::new(storage.clone(), timeout),
            TabularLoader::new(timeout),
        );
        Fixture {
            dir,
            storage,
            snapshots,
            gateway,
        }
    }

    #[tokio::test]
    async fn test_edit_writes_file_and_snapshot() {
        let fx = fixture("name,amt\nA,10\n");

        let outcome = fx
            .gateway
            .edit("sales.csv", 0, "amt", "30", "user@x.com")
            .await
            .unwrap();

        let event = outcome.event.unwrap();
        assert_eq!(event.old_value, "10");
        assert_eq!(event.new_value, "30");
        assert!(outcome.audit_recorded);

        let content = std::fs::read_to_string(fx.dir.path().join("sales.csv")).unwrap();
        assert_eq!(content, "name,amt\nA,30\n");

        let snapshot = fx.snapshots.get("sales.csv").unwrap();
        assert_eq!(snapshot.rows[0].get("amt"), Some("30"));
    }

    #[tokio::test]
    async fn test_edit_out_of_range_row() {
        let fx = fixture("name,amt\nA,10\n");

        let err = fx
            .gateway
            .edit("sales.csv", 1, "amt", "30", "user@x.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::FailEditNotFound);
        assert!(fx.snapshots.get("sales.csv").is_none());
    }

    #[tokio::test]
    async fn test_edit_survives_audit_failure() {
        let fx = fixture("name,amt\nA,10\n");
        fx.storage.set_fail_inserts(true);

        let outcome = fx
            .gateway
            .edit("sales.csv", 0, "amt", "30", "user@x.com")
            .await
            .unwrap();
        assert!(!outcome.audit_recorded);

        let content = std::fs::read_to_string(fx.dir.path().join("sales.csv")).unwrap();
        assert!(content.contains("A,30"));
    }

    #[tokio::test]
    async fn test_edit_survives_audit_timeout() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("sales.csv"), "name,amt\nA,10\n").unwrap();
        let storage = Arc::new(MemoryStorage::new());
        storage.set_latency(Duration::from_secs(10));
        let snapshots = Arc::new(SnapshotStore::new());
        let gateway = EditGateway::new(
            dir.path(),
            snapshots.clone(),
            AuditTrail::new(storage, Duration::from_millis(50)),
            TabularLoader::new(Duration::from_secs(5)),
        );

        let outcome = gateway
            .edit("sales.csv", 0, "amt", "30", "user@x.com")
            .await
            .unwrap();
        assert!(!outcome.audit_recorded);
        assert_eq!(outcome.event.unwrap().new_value, "30");

        let content = std::fs::read_to_string(dir.path().join("sales.csv")).unwrap();
        assert_eq!(content, "name,amt\nA,30\n");
        assert_eq!(snapshots.get("sales.csv").unwrap().rows[0].get("amt"), Some("30"));
    }

    #[tokio::test]
    async fn test_edit_same_value_is_noop() {
        let fx = fixture("name,amt\nA,10\n");

        let outcome = fx
            .gateway
            .edit("sales.csv", 0, "amt", "10", "user@x.com")
            .await
            .unwrap();
        assert!(outcome.event.is_none());
        assert!(fx.snapshots.get("sales.csv").is_none());
    }

    #[tokio::test]
    async fn test_edit_adds_missing_column() {
        let fx = fixture("name,amt\nA,10\nB,20\n");

        let outcome = fx
            .gateway
            .edit("sales.csv", 1, "note", "late", "user@x.com")
            .await
            .unwrap();
        assert_eq!(outcome.event.unwrap().old_value, "");

        let content = std::fs::read_to_string(fx.dir.path().join("sales.csv")).unwrap();
        assert_eq!(content, "name,amt,note\nA,10,\nB,20,late\n");
    }

    #[tokio::test]
    async fn test_edit_unknown_file() {
        let fx = fixture("name,amt\nA,10\n");

        let err = fx
            .gateway
            .edit("missing.csv", 0, "amt", "1", "user@x.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::FileNotFound);

        let err = fx
            .gateway
            .edit("../sales.csv", 0, "amt", "1", "user@x.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidFileName);
    }
}
