//! Caller-facing operations over the report tree.

use crate::audit::{AuditTrail, ChangeEvent};
use crate::config::{Config, WatchSettings};
use crate::edit::{EditGateway, EditOutcome};
use crate::error::{ReportError, ReportResult};
use crate::tabular::{self, TabularLoader};
use crate::watch::WatchController;
use reportwatch_snapshot::{Row, SnapshotStore};
use reportwatch_storage::{JsonlStorage, Storage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows of one file that matched a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMatches {
    pub file_name: String,
    pub matching_rows: Vec<Row>,
}

/// Wires the loader, snapshot store, audit trail, watcher and edit gateway
/// around one watched root.
#[derive(Debug, Clone)]
pub struct ReportService {
    root: PathBuf,
    loader: TabularLoader,
    audit: AuditTrail,
    edits: EditGateway,
    watch: Arc<WatchController>,
}

impl ReportService {
    pub fn new(root: impl Into<PathBuf>, storage: Arc<dyn Storage>, settings: WatchSettings) -> Self {
        let root = root.into();
        let snapshots = Arc::new(SnapshotStore::new());
        let loader = TabularLoader::new(settings.io_timeout);
        let audit = AuditTrail::new(storage, settings.io_timeout);

        let edits = EditGateway::new(
            root.clone(),
            Arc::clone(&snapshots),
            audit.clone(),
            loader.clone(),
        );
        let watch = Arc::new(WatchController::new(
            root.clone(),
            snapshots,
            audit.clone(),
            loader.clone(),
            settings,
        ));

        Self {
            root,
            loader,
            audit,
            edits,
            watch,
        }
    }

    /// Build a service from configuration, with relative paths resolved
    /// against `base`.
    pub fn from_config(config: &Config, base: &Path) -> Self {
        let root = config.reports_dir(base);
        let data_dir = config.data_dir(base);
        info!(
            reports = %root.display(),
            data = %data_dir.display(),
            "Opening report service"
        );
        Self::new(root, Arc::new(JsonlStorage::new(data_dir)), config.watch_settings())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The watcher over this service's root.
    pub fn watch(&self) -> Arc<WatchController> {
        Arc::clone(&self.watch)
    }

    /// Every tabular file under the root.
    pub async fn list_files(&self) -> ReportResult<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || tabular::discover(&root))
            .await
            .map_err(|e| ReportError::read(&self.root, e))?
    }

    /// Case-insensitive substring search over every cell of the scoped files.
    ///
    /// Without a scope (or with an empty one) every file is searched. Files
    /// that are missing or fail to load are skipped; files without matches
    /// are left out.
    pub async fn search(&self, query: &str, scope: Option<&[String]>) -> ReportResult<Vec<FileMatches>> {
        let files = match scope {
            Some(files) if !files.is_empty() => files.to_vec(),
            _ => self.list_files().await?,
        };

        let needle = query.to_lowercase();
        let mut results = Vec::new();
        for file_id in files {
            let path = match tabular::resolve(&self.root, &file_id) {
                Ok(path) if path.is_file() => path,
                Ok(_) => {
                    warn!(file = %file_id, "Skipping missing file in search");
                    continue;
                }
                Err(e) => {
                    warn!(file = %file_id, error = %e, "Skipping invalid file name in search");
                    continue;
                }
            };

            let rows = match self.loader.load(&path).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(file = %file_id, code = %e.kind(), error = %e, "Skipping unreadable file in search");
                    continue;
                }
            };

            let matching_rows = filter_rows(rows, &needle);
            if !matching_rows.is_empty() {
                results.push(FileMatches {
                    file_name: file_id,
                    matching_rows,
                });
            }
        }

        debug!(query = %query, files = results.len(), "Search complete");
        Ok(results)
    }

    /// Rows of a single file matching `query`.
    pub async fn details(&self, file_id: &str, query: &str) -> ReportResult<FileMatches> {
        let path = tabular::resolve(&self.root, file_id)?;
        if !path.is_file() {
            return Err(ReportError::FileNotFound(file_id.to_string()));
        }

        let rows = self.loader.load(&path).await?;
        Ok(FileMatches {
            file_name: file_id.to_string(),
            matching_rows: filter_rows(rows, &query.to_lowercase()),
        })
    }

    /// Every recorded change to one cell, newest first.
    pub async fn history(
        &self,
        file_id: &str,
        row_index: usize,
        column_name: &str,
    ) -> ReportResult<Vec<ChangeEvent>> {
        tabular::resolve(&self.root, file_id)?;
        let events = self.audit.query(file_id, row_index, column_name).await?;
        if events.is_empty() {
            debug!(file = %file_id, row = row_index, column = %column_name, "No history");
        }
        Ok(events)
    }

    /// Set one cell on behalf of `modified_by`.
    pub async fn edit(
        &self,
        file_id: &str,
        row_index: usize,
        column_name: &str,
        new_value: &str,
        modified_by: &str,
    ) -> ReportResult<EditOutcome> {
        self.edits
            .edit(file_id, row_index, column_name, new_value, modified_by)
            .await
    }
}

fn filter_rows(rows: Vec<Row>, needle: &str) -> Vec<Row> {
    rows.into_iter()
        .filter(|row| row.values().any(|value| value.to_lowercase().contains(needle)))
        .collect()
}
