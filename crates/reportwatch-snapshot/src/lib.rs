//! Row snapshots for reportwatch.
//!
//! This crate holds the last-observed row sequence of every watched file so
//! that successive versions can be compared:
//! - `Row`: one ordered column-name -> cell-text record
//! - `Snapshot`: a file's full row sequence at one point in time
//! - `SnapshotStore`: the in-memory map of snapshots plus per-file exclusion
//!
//! # Example
//!
//! ```
//! use reportwatch_snapshot::{Row, SnapshotStore};
//!
//! # async fn example() {
//! let store = SnapshotStore::new();
//!
//! let guard = store.lock("sales.csv").await;
//! let row: Row = [("name", "A"), ("amt", "10")].into_iter().collect();
//! store.put(&guard, vec![row]);
//! drop(guard);
//!
//! assert_eq!(store.get("sales.csv").unwrap().len(), 1);
//! # }
//! ```

mod snapshot;
mod store;

pub use snapshot::{Row, Snapshot};
pub use store::{FileGuard, SnapshotStore};
