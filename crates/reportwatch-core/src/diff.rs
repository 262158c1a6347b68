//! Positional row diffing.
//!
//! Rows are aligned by index only. Inserting or deleting a row in the middle
//! of a file shifts every later comparison; removed trailing rows produce no
//! events at all.

use crate::audit::ChangeEvent;
use chrono::{DateTime, Utc};
use reportwatch_snapshot::Row;

/// Compare `current` against `previous` and emit one event per changed cell.
///
/// Every column of `current[i]` is compared with the same column of
/// `previous[i]`; a missing row or column counts as the empty string.
pub fn diff(
    file_id: &str,
    previous: &[Row],
    current: &[Row],
    modified_by: &str,
    at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (row_index, row) in current.iter().enumerate() {
        let before = previous.get(row_index);
        for (column, new_value) in row.iter() {
            let old_value = before.and_then(|r| r.get(column)).unwrap_or("");
            if old_value != new_value {
                events.push(ChangeEvent {
                    file_name: file_id.to_string(),
                    row_index,
                    column_name: column.to_string(),
                    old_value: old_value.to_string(),
                    new_value: new_value.to_string(),
                    modified_by: modified_by.to_string(),
                    timestamp: at,
                });
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTO: &str = "System Monitoring";

    fn rows(data: &[&[(&str, &str)]]) -> Vec<Row> {
        data.iter().map(|r| r.iter().copied().collect()).collect()
    }

    #[test]
    fn test_identical_sequences_produce_nothing() {
        let current = rows(&[&[("name", "A"), ("amt", "10")], &[("name", "B"), ("amt", "")]]);
        assert!(diff("f.csv", &current, &current.clone(), AUTO, Utc::now()).is_empty());
    }

    #[test]
    fn test_single_cell_change() {
        let previous = rows(&[&[("name", "A"), ("amt", "10")]]);
        let current = rows(&[&[("name", "A"), ("amt", "20")]]);

        let events = diff("sales.csv", &previous, &current, AUTO, Utc::now());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.file_name, "sales.csv");
        assert_eq!(event.row_index, 0);
        assert_eq!(event.column_name, "amt");
        assert_eq!(event.old_value, "10");
        assert_eq!(event.new_value, "20");
        assert_eq!(event.modified_by, AUTO);
    }

    #[test]
    fn test_appended_rows_report_every_column() {
        let previous = rows(&[&[("a", "1"), ("b", "2")]]);
        let current = rows(&[
            &[("a", "1"), ("b", "2")],
            &[("a", "3"), ("b", "4")],
            &[("a", "5"), ("b", "")],
        ]);

        let events = diff("f.csv", &previous, &current, AUTO, Utc::now());
        let cells: Vec<_> = events
            .iter()
            .map(|e| (e.row_index, e.column_name.as_str(), e.old_value.as_str(), e.new_value.as_str()))
            .collect();
        // An empty cell in an appended row equals the implied empty old value.
        assert_eq!(cells, vec![(1, "a", "", "3"), (1, "b", "", "4"), (2, "a", "", "5")]);
    }

    #[test]
    fn test_removed_rows_are_invisible() {
        let previous = rows(&[&[("a", "1")], &[("a", "2")]]);
        let current = rows(&[&[("a", "1")]]);
        assert!(diff("f.csv", &previous, &current, AUTO, Utc::now()).is_empty());
    }

    #[test]
    fn test_new_column_treated_as_previously_empty() {
        let previous = rows(&[&[("a", "1")]]);
        let current = rows(&[&[("a", "1"), ("b", "x")]]);

        let events = diff("f.csv", &previous, &current, AUTO, Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].column_name, "b");
        assert_eq!(events[0].old_value, "");
    }

    #[test]
    fn test_dropped_column_is_not_reported() {
        let previous = rows(&[&[("a", "1"), ("b", "x")]]);
        let current = rows(&[&[("a", "1")]]);
        assert!(diff("f.csv", &previous, &current, AUTO, Utc::now()).is_empty());
    }

    #[test]
    fn test_events_follow_row_then_column_order() {
        let previous = rows(&[&[("a", "1"), ("b", "1")], &[("a", "1"), ("b", "1")]]);
        let current = rows(&[&[("a", "2"), ("b", "2")], &[("a", "2"), ("b", "1")]]);

        let events = diff("f.csv", &previous, &current, AUTO, Utc::now());
        let order: Vec<_> = events.iter().map(|e| (e.row_index, e.column_name.clone())).collect();
        assert_eq!(
            order,
            vec![(0, "a".to_string()), (0, "b".to_string()), (1, "a".to_string())]
        );
    }
}
