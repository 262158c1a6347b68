//! Storage layer for reportwatch.
//!
//! This crate provides an append-only document store abstraction with two backends:
//! - JSON-lines file storage (default, durable)
//! - In-memory storage (for testing)
//!
//! Documents are JSON objects grouped into named collections. The only
//! operations are insert-one and find-with-filter-and-sort; documents are
//! never updated or removed once written.

pub mod error;
pub mod json;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use json::JsonlStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// A trait for append-only document storage backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Append one document to a collection.
    ///
    /// The document must be a JSON object.
    async fn insert_one(&self, collection: &str, document: Value) -> StorageResult<()>;

    /// Find all documents in a collection matching `filter`.
    ///
    /// Without a sort, documents come back in insertion order. With a sort,
    /// documents that compare equal keep "newest inserted first" order for
    /// descending sorts and insertion order for ascending sorts.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StorageResult<Vec<Value>>;

    /// Count the documents in a collection.
    async fn count(&self, collection: &str) -> StorageResult<usize>;
}

/// Field-equality filter, all conditions must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// A filter that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Check whether a document satisfies every condition.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort specification on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Validate a collection name. Collections map to file names on disk.
pub(crate) fn validate_collection(collection: &str) -> StorageResult<()> {
    if collection.is_empty()
        || collection.contains('/')
        || collection.contains('\\')
        || collection == "."
        || collection == ".."
    {
        return Err(StorageError::invalid_collection(format!(
            "Invalid collection name: {:?}",
            collection
        )));
    }
    Ok(())
}

/// Apply filter and sort to documents given in insertion order.
pub(crate) fn apply_query(documents: Vec<Value>, filter: &Filter, sort: Option<&Sort>) -> Vec<Value> {
    let mut matched: Vec<Value> = documents.into_iter().filter(|d| filter.matches(d)).collect();

    if let Some(sort) = sort {
        if sort.order == SortOrder::Descending {
            // Stable sort after reversal keeps ties newest-first.
            matched.reverse();
        }
        matched.sort_by(|a, b| {
            let ordering = compare_values(a.get(&sort.field), b.get(&sort.field));
            match sort.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }

    matched
}

/// Total order over optional JSON scalars: missing < null < bool < number < string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Value> {
        vec![
            json!({"file": "a.csv", "ts": "2024-01-01T00:00:00.000000Z", "n": 1}),
            json!({"file": "b.csv", "ts": "2024-01-03T00:00:00.000000Z", "n": 2}),
            json!({"file": "a.csv", "ts": "2024-01-02T00:00:00.000000Z", "n": 3}),
            json!({"file": "a.csv", "ts": "2024-01-02T00:00:00.000000Z", "n": 4}),
        ]
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let filter = Filter::new().eq("file", "a.csv").eq("n", 3);
        let result = apply_query(docs(), &filter, None);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["n"], 3);
    }

    #[test]
    fn test_empty_filter_keeps_insertion_order() {
        let result = apply_query(docs(), &Filter::new(), None);
        let ns: Vec<i64> = result.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_descending_sort_breaks_ties_newest_inserted_first() {
        let filter = Filter::new().eq("file", "a.csv");
        let result = apply_query(docs(), &filter, Some(&Sort::descending("ts")));
        let ns: Vec<i64> = result.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![4, 3, 1]);
    }

    #[test]
    fn test_ascending_sort_numbers() {
        let result = apply_query(docs(), &Filter::new(), Some(&Sort::ascending("n")));
        let ns: Vec<i64> = result.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection("changelogs").is_ok());
        assert!(validate_collection("").is_err());
        assert!(validate_collection("..").is_err());
        assert!(validate_collection("a/b").is_err());
        assert!(validate_collection("a\\b").is_err());
    }
}
