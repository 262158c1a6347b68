//! Comma-separated (`.csv`) encoding.

use super::{dedupe_headers, header_union, write_atomically};
use crate::error::{ReportError, ReportResult};
use reportwatch_snapshot::Row;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const BOM: char = '\u{feff}';

pub(super) fn read(path: &Path) -> ReportResult<Vec<Row>> {
    let file = File::open(path).map_err(|e| ReportError::read(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = dedupe_headers(
        reader
            .headers()
            .map_err(|e| ReportError::read(path, e))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(BOM).to_string()
                } else {
                    h.to_string()
                }
            }),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReportError::read(path, e))?;
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            row.set(header.clone(), record.get(i).unwrap_or(""));
        }
        for i in headers.len()..record.len() {
            row.set(format!("_{}", i), record.get(i).unwrap_or(""));
        }
        rows.push(row);
    }

    Ok(rows)
}

pub(super) fn write(path: &Path, rows: &[Row]) -> ReportResult<()> {
    let headers = header_union(rows);

    write_atomically(path, |temp| {
        let mut writer = csv::Writer::from_path(temp).map_err(|e| e.to_string())?;
        writer.write_record(&headers).map_err(|e| e.to_string())?;
        for row in rows {
            let record = headers.iter().map(|h| row.get(h).unwrap_or(""));
            writer.write_record(record).map_err(|e| e.to_string())?;
        }
        writer.flush().map_err(|e| e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_basic() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "sales.csv", "name,amt\nA,10\nB,20\n");

        let rows = read(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some("A"));
        assert_eq!(rows[1].get("amt"), Some("20"));
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["name", "amt"]);
    }

    #[test]
    fn test_read_strips_bom_and_keeps_quotes() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "bom.csv",
            "\u{feff}name,note\nA,\"hello, world\"\n",
        );

        let rows = read(&path).unwrap();
        assert_eq!(rows[0].get("name"), Some("A"));
        assert_eq!(rows[0].get("note"), Some("hello, world"));
    }

    #[test]
    fn test_read_ragged_records() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "ragged.csv", "a,b\n1\n2,3,4\n");

        let rows = read(&path).unwrap();
        assert_eq!(rows[0].get("a"), Some("1"));
        assert_eq!(rows[0].get("b"), Some(""));
        assert_eq!(rows[1].get("_2"), Some("4"));
    }

    #[test]
    fn test_duplicate_headers_keep_every_column() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "dup.csv", "id,amt,amt\n1,10,99\n");

        let mut rows = read(&path).unwrap();
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["id", "amt", "amt_1"]);
        assert_eq!(rows[0].get("amt"), Some("10"));
        assert_eq!(rows[0].get("amt_1"), Some("99"));

        rows[0].set("id", "2");
        write(&path, &rows).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "id,amt,amt_1\n2,10,99\n"
        );
    }

    #[test]
    fn test_read_header_only() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "empty.csv", "a,b\n");
        assert!(read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_union_of_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let first: Row = [("a", "1"), ("b", "x,y")].into_iter().collect();
        let second: Row = [("a", "2"), ("c", "3")].into_iter().collect();
        write(&path, &[first, second]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b,c\n1,\"x,y\",\n2,,3\n");
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let row: Row = [("a", "1")].into_iter().collect();
        assert!(matches!(write(&path, &[row]), Err(ReportError::Write { .. })));
    }
}
