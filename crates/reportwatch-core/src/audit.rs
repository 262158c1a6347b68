//! Append-only audit trail of cell changes.

use crate::error::{ReportError, ReportResult};
use chrono::{DateTime, SubsecRound, Utc};
use reportwatch_storage::{Filter, Sort, Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Collection that holds change events.
pub const CHANGELOG_COLLECTION: &str = "changelogs";

/// One cell-level change, either detected by the watcher or made by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub file_name: String,
    pub row_index: usize,
    pub column_name: String,
    pub old_value: String,
    pub new_value: String,
    pub modified_by: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Current time at the precision events are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that text order equals time order.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Durable change history backed by a document store.
#[derive(Clone)]
pub struct AuditTrail {
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl AuditTrail {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Persist one event.
    pub async fn append(&self, event: &ChangeEvent) -> ReportResult<()> {
        let document = serde_json::to_value(event).map_err(StorageError::from)?;
        self.bounded("audit append", self.storage.insert_one(CHANGELOG_COLLECTION, document))
            .await?;
        debug!(
            file = %event.file_name,
            row = event.row_index,
            column = %event.column_name,
            by = %event.modified_by,
            "Recorded change"
        );
        Ok(())
    }

    /// Persist every event, continuing past failures.
    ///
    /// Returns how many were stored.
    pub async fn append_all(&self, events: &[ChangeEvent]) -> usize {
        let mut stored = 0;
        for event in events {
            match self.append(event).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(
                    file = %event.file_name,
                    row = event.row_index,
                    column = %event.column_name,
                    code = %e.kind(),
                    error = %e,
                    "Failed to record change"
                ),
            }
        }
        stored
    }

    /// Every change to one cell, newest first.
    pub async fn query(
        &self,
        file_name: &str,
        row_index: usize,
        column_name: &str,
    ) -> ReportResult<Vec<ChangeEvent>> {
        let filter = Filter::new()
            .eq("fileName", file_name)
            .eq("rowIndex", row_index)
            .eq("columnName", column_name);
        let sort = Sort::descending("timestamp");

        let documents = self
            .bounded(
                "audit query",
                self.storage.find(CHANGELOG_COLLECTION, &filter, Some(&sort)),
            )
            .await?;

        let events = documents
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<ChangeEvent>(doc) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Skipping malformed change record");
                    None
                }
            })
            .collect();
        Ok(events)
    }

    async fn bounded<T, F>(&self, operation: &'static str, future: F) -> ReportResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result.map_err(ReportError::from),
            Err(_) => Err(ReportError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
