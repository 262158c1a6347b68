//! Tabular file loading and writing.
//!
//! Two encodings are supported, chosen by extension:
//! - `.xlsx`: a fixed grid, first worksheet only, first row is the header
//! - `.csv`: streamed delimited text, header row establishes the columns
//!
//! Both produce the same `Vec<Row>` shape with every cell rendered as text.

mod delimited;
mod grid;

use crate::error::{ReportError, ReportResult};
use reportwatch_snapshot::Row;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// The supported tabular encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    /// Spreadsheet workbook (`.xlsx`).
    Grid,
    /// Comma-separated text (`.csv`).
    Delimited,
}

impl TabularFormat {
    /// Determine the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(Self::Grid),
            "csv" => Some(Self::Delimited),
            _ => None,
        }
    }
}

/// Whether a path names a tabular file that should be watched and listed.
pub fn is_tabular(path: &Path) -> bool {
    let ignored = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(reportwatch_util::path::is_ignored_name)
        .unwrap_or(true);
    !ignored && TabularFormat::from_path(path).is_some()
}

/// Reads and writes tabular files off the async runtime, with a bounded wait.
#[derive(Debug, Clone)]
pub struct TabularLoader {
    io_timeout: Duration,
}

impl TabularLoader {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    /// Parse a tabular file into rows.
    pub async fn load(&self, path: &Path) -> ReportResult<Vec<Row>> {
        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || load_blocking(&owned));

        match tokio::time::timeout(self.io_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ReportError::read(path, join_error)),
            Err(_) => Err(ReportError::Timeout {
                operation: "load",
                after: self.io_timeout,
            }),
        }
    }

    /// Write rows back to a tabular file, replacing its contents.
    pub async fn write(&self, path: &Path, rows: Vec<Row>) -> ReportResult<()> {
        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || write_blocking(&owned, &rows));

        match tokio::time::timeout(self.io_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ReportError::write(path, join_error)),
            Err(_) => Err(ReportError::Timeout {
                operation: "write",
                after: self.io_timeout,
            }),
        }
    }
}

/// Parse a tabular file into rows on the current thread.
pub fn load_blocking(path: &Path) -> ReportResult<Vec<Row>> {
    let rows = match TabularFormat::from_path(path) {
        Some(TabularFormat::Grid) => grid::read(path)?,
        Some(TabularFormat::Delimited) => delimited::read(path)?,
        None => {
            return Err(ReportError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    debug!(path = %path.display(), rows = rows.len(), "Loaded tabular file");
    Ok(rows)
}

/// Write rows to a tabular file on the current thread.
pub fn write_blocking(path: &Path, rows: &[Row]) -> ReportResult<()> {
    match TabularFormat::from_path(path) {
        Some(TabularFormat::Grid) => grid::write(path, rows)?,
        Some(TabularFormat::Delimited) => delimited::write(path, rows)?,
        None => {
            return Err(ReportError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    }
    debug!(path = %path.display(), rows = rows.len(), "Wrote tabular file");
    Ok(())
}

/// Union of column names across rows, in first-encountered order.
pub fn header_union(rows: &[Row]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !headers.iter().any(|h| h == column) {
                headers.push(column.to_string());
            }
        }
    }
    headers
}

/// Suffix repeated header names `_1`, `_2`, ... so no column shadows another.
pub(crate) fn dedupe_headers(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .map(|base| {
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

/// Every tabular file under `root`, as sorted root-relative identifiers.
pub fn discover(root: &Path) -> ReportResult<Vec<String>> {
    if !root.is_dir() {
        return Err(ReportError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("reports directory not found: {}", root.display()),
        )));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry
                .file_name()
                .to_str()
                .map(reportwatch_util::path::is_ignored_name)
                .unwrap_or(true)
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry under reports directory");
                continue;
            }
        };
        if entry.file_type().is_file() && is_tabular(entry.path()) {
            if let Some(id) = reportwatch_util::path::relative_id(entry.path(), root) {
                files.push(id);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Resolve a root-relative file identifier to a path under `root`.
///
/// Rejects anything that could escape the root.
pub fn resolve(root: &Path, file_id: &str) -> ReportResult<PathBuf> {
    let invalid = || ReportError::InvalidFileName(file_id.to_string());

    if file_id.is_empty() || file_id.contains('\\') || file_id.contains(':') {
        return Err(invalid());
    }

    let mut path = root.to_path_buf();
    for part in file_id.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => return Err(invalid()),
        }
    }

    Ok(path)
}

/// Write through a sibling temporary file, then rename over the target.
fn write_atomically<F>(path: &Path, write: F) -> ReportResult<()>
where
    F: FnOnce(&Path) -> Result<(), String>,
{
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReportError::write(path, "path has no file name"))?;
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    if let Err(message) = write(&temp_path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(ReportError::write(path, message));
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        ReportError::write(path, e)
    })
}

/// Render a number the way spreadsheets display it: integral values without
/// a decimal point.
pub(crate) fn render_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TabularFormat::from_path(Path::new("a/sales.CSV")),
            Some(TabularFormat::Delimited)
        );
        assert_eq!(
            TabularFormat::from_path(Path::new("stock.xlsx")),
            Some(TabularFormat::Grid)
        );
        assert_eq!(TabularFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(TabularFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_is_tabular_ignores_lock_files() {
        assert!(is_tabular(Path::new("/r/sales.xlsx")));
        assert!(!is_tabular(Path::new("/r/~$sales.xlsx")));
        assert!(!is_tabular(Path::new("/r/.sales.csv.123.tmp")));
    }

    #[test]
    fn test_dedupe_headers() {
        let raw = ["id", "amt", "amt", "id", "amt"].into_iter().map(String::from);
        assert_eq!(dedupe_headers(raw), vec!["id", "amt", "amt_1", "id_1", "amt_2"]);
    }

    #[test]
    fn test_header_union_first_seen_order() {
        let rows = vec![row(&[("a", "1"), ("b", "2")]), row(&[("c", "3"), ("a", "4")])];
        assert_eq!(header_union(&rows), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_render_number() {
        assert_eq!(render_number(10.0), "10");
        assert_eq!(render_number(-3.0), "-3");
        assert_eq!(render_number(1.5), "1.5");
        assert_eq!(render_number(0.1), "0.1");
    }

    #[test]
    fn test_resolve_accepts_nested_ids() {
        let root = Path::new("/srv/reports");
        assert_eq!(
            resolve(root, "sales.csv").unwrap(),
            PathBuf::from("/srv/reports/sales.csv")
        );
        assert_eq!(
            resolve(root, "2024/q1.xlsx").unwrap(),
            PathBuf::from("/srv/reports/2024/q1.xlsx")
        );
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/srv/reports");
        for bad in ["", "../etc/passwd", "a/../../b.csv", "/etc/passwd", "a//b.csv", "./a.csv", "a\\b.csv", "C:x.csv"] {
            assert!(
                matches!(resolve(root, bad), Err(ReportError::InvalidFileName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_discover_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024")).unwrap();
        std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join("b.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("~$a.xlsx"), "lock").unwrap();
        std::fs::write(dir.path().join("2024").join("a.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join(".cache").join("c.csv"), "a\n1\n").unwrap();

        let files = discover(dir.path()).unwrap();
        assert_eq!(files, vec!["2024/a.csv", "b.csv"]);
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempdir().unwrap();
        assert!(discover(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_load_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "x").unwrap();

        let loader = TabularLoader::new(Duration::from_secs(5));
        let err = loader.load(&path).await.unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_read_failure() {
        let dir = tempdir().unwrap();
        let loader = TabularLoader::new(Duration::from_secs(5));
        let err = loader.load(&dir.path().join("gone.csv")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::FailRead);
    }

    #[tokio::test]
    async fn test_write_then_load_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        let loader = TabularLoader::new(Duration::from_secs(5));

        let rows = vec![row(&[("name", "A"), ("amt", "10")]), row(&[("name", "B")])];
        loader.write(&path, rows).await.unwrap();

        let loaded = loader.load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].get("amt"), Some(""));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
