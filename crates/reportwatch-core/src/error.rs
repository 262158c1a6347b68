//! Error types for the core crate.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The tabular file could not be opened or parsed.
    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// The file extension is not one of the supported tabular formats.
    #[error("unsupported tabular format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// The destination was not writable or the serializer rejected the rows.
    #[error("failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// The audit store was unreachable or rejected the record.
    #[error("failed to persist audit record: {0}")]
    Persist(#[from] reportwatch_storage::StorageError),

    /// An edit addressed a row past the end of the file.
    #[error("row {row_index} not found in {file} ({row_count} rows)")]
    RowNotFound {
        file: String,
        row_index: usize,
        row_count: usize,
    },

    /// A bounded wait on disk or audit I/O ran out.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// No tabular file with this identifier exists under the watched root.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The identifier is not a plain root-relative path.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The filesystem watcher could not be set up.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub(crate) fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// The failure category reported to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Read { .. } | Self::UnsupportedFormat { .. } => FailureKind::FailRead,
            Self::Write { .. } => FailureKind::FailWrite,
            Self::Persist(_) => FailureKind::FailPersist,
            Self::RowNotFound { .. } => FailureKind::FailEditNotFound,
            Self::Timeout { .. } => FailureKind::FailTimeout,
            Self::FileNotFound(_) => FailureKind::FileNotFound,
            Self::InvalidFileName(_) => FailureKind::InvalidFileName,
            Self::Config(_) | Self::Watch(_) | Self::Io(_) => FailureKind::Internal,
        }
    }
}

/// Stable, user-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FailRead,
    FailWrite,
    FailPersist,
    FailEditNotFound,
    FailTimeout,
    FileNotFound,
    InvalidFileName,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailRead => "fail_read",
            Self::FailWrite => "fail_write",
            Self::FailPersist => "fail_persist",
            Self::FailEditNotFound => "fail_edit_not_found",
            Self::FailTimeout => "fail_timeout",
            Self::FileNotFound => "file_not_found",
            Self::InvalidFileName => "invalid_file_name",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// An override value could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Result type for core operations.
pub type ReportResult<T> = Result<T, ReportError>;
