//! Core logic for reportwatch.
//!
//! This crate watches a tree of tabular report files and keeps an audit
//! trail of every cell change:
//! - Tabular loading and writing (`.xlsx` grids and `.csv` text)
//! - Positional diffing of row sequences
//! - The append-only audit trail of change events
//! - The filesystem watcher that seeds, diffs and records
//! - The edit gateway for user-driven cell changes
//! - Configuration management (multi-source, JSONC support)

pub mod audit;
pub mod config;
pub mod diff;
pub mod edit;
pub mod error;
pub mod service;
pub mod tabular;
pub mod watch;

pub use audit::{AuditTrail, ChangeEvent};
pub use config::{Config, WatchSettings, AUTOMATED_IDENTITY};
pub use edit::{EditGateway, EditOutcome};
pub use error::{ConfigError, FailureKind, ReportError, ReportResult};
pub use service::{FileMatches, ReportService};
pub use tabular::{TabularFormat, TabularLoader};
pub use watch::{FilePhase, PassOutcome, WatchController, WatchStats};

pub use reportwatch_snapshot::{Row, Snapshot, SnapshotStore};
