//! Spreadsheet (`.xlsx`) encoding.

use super::{dedupe_headers, header_union, render_number, write_atomically};
use crate::error::{ReportError, ReportResult};
use calamine::{open_workbook, Data, ExcelDateTime, Range, Reader, Xlsx};
use chrono::Timelike;
use reportwatch_snapshot::Row;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

/// Name given to header cells that are blank.
const EMPTY_HEADER: &str = "__EMPTY";

pub(super) fn read(path: &Path) -> ReportResult<Vec<Row>> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| ReportError::read(path, e))?;

    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ReportError::read(path, e))?;

    Ok(rows_from_range(&range))
}

fn rows_from_range(range: &Range<Data>) -> Vec<Row> {
    let mut lines = range.rows();
    let Some(header_cells) = lines.next() else {
        return Vec::new();
    };
    let headers = unique_headers(header_cells.iter().map(render_cell));

    lines
        .filter_map(|cells| {
            let values: Vec<String> = cells.iter().map(render_cell).collect();
            if values.iter().all(|v| v.is_empty()) {
                return None;
            }
            let row = headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), values.get(i).cloned().unwrap_or_default()))
                .collect();
            Some(row)
        })
        .collect()
}

/// Name blank headers `__EMPTY`, `__EMPTY_1`, ... and suffix repeats `_1`, `_2`, ...
fn unique_headers(raw: impl Iterator<Item = String>) -> Vec<String> {
    dedupe_headers(raw.map(|text| {
        if text.is_empty() {
            EMPTY_HEADER.to_string()
        } else {
            text
        }
    }))
}

fn is_generated_header(name: &str) -> bool {
    match name.strip_prefix(EMPTY_HEADER) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => render_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => render_datetime(dt),
        Data::Error(e) => e.to_string(),
    }
}

fn render_datetime(value: &ExcelDateTime) -> String {
    match value.as_datetime() {
        Some(dt) if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 => {
            dt.format("%Y-%m-%d").to_string()
        }
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => render_number(value.as_f64()),
    }
}

/// A cell is written as a number only when it reads back as the same text.
fn numeric_value(text: &str) -> Option<f64> {
    let value: f64 = text.parse().ok()?;
    (value.is_finite() && render_number(value) == text).then_some(value)
}

/// Worksheets of an existing workbook: the first one's name, plus the full
/// contents of every later sheet so they survive a rewrite of the first.
#[derive(Debug, Default)]
struct ExistingSheets {
    first: Option<String>,
    rest: Vec<(String, Range<Data>)>,
}

fn existing_sheets(path: &Path) -> ReportResult<ExistingSheets> {
    if !path.exists() {
        return Ok(ExistingSheets::default());
    }
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| ReportError::write(path, e))?;
    let names = workbook.sheet_names();
    let Some((first, later)) = names.split_first() else {
        return Ok(ExistingSheets::default());
    };

    let mut rest = Vec::with_capacity(later.len());
    for name in later {
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| ReportError::write(path, format!("cannot carry over sheet {name}: {e}")))?;
        rest.push((name.clone(), range));
    }
    Ok(ExistingSheets {
        first: Some(first.clone()),
        rest,
    })
}

pub(super) fn write(path: &Path, rows: &[Row]) -> ReportResult<()> {
    let headers = header_union(rows);
    let existing = existing_sheets(path)?;

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        if let Some(name) = &existing.first {
            sheet.set_name(name).map_err(|e| ReportError::write(path, e))?;
        }

        for (col, header) in headers.iter().enumerate() {
            let col = column_index(path, col)?;
            if !is_generated_header(header) {
                sheet
                    .write_string(0, col, header)
                    .map_err(|e| ReportError::write(path, e))?;
            }
        }

        for (index, row) in rows.iter().enumerate() {
            let line = u32::try_from(index + 1)
                .map_err(|_| ReportError::write(path, "too many rows for a worksheet"))?;
            for (col, header) in headers.iter().enumerate() {
                let value = row.get(header).unwrap_or("");
                if value.is_empty() {
                    continue;
                }
                let col = column_index(path, col)?;
                let written = match numeric_value(value) {
                    Some(number) => sheet.write_number(line, col, number),
                    None => sheet.write_string(line, col, value),
                };
                written.map_err(|e| ReportError::write(path, e))?;
            }
        }
    }

    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    for (name, range) in &existing.rest {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name).map_err(|e| ReportError::write(path, e))?;
        copy_cells(sheet, range, &date_format).map_err(|e| ReportError::write(path, e))?;
    }

    write_atomically(path, |temp| workbook.save(temp).map_err(|e| e.to_string()))
}

/// Re-emit cell values at their original positions. Formulas and styling are
/// not carried over, only the values calamine reports.
fn copy_cells(sheet: &mut Worksheet, range: &Range<Data>, date_format: &Format) -> Result<(), XlsxError> {
    let Some((start_row, start_col)) = range.start() else {
        return Ok(());
    };
    let Ok(start_col) = u16::try_from(start_col) else {
        return Ok(());
    };
    for (r, c, cell) in range.used_cells() {
        let (Ok(r), Ok(c)) = (u32::try_from(r), u16::try_from(c)) else {
            continue;
        };
        let (row, col) = (start_row + r, start_col + c);
        match cell {
            Data::Empty => {}
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                sheet.write_string(row, col, s)?;
            }
            Data::Int(i) => {
                sheet.write_number(row, col, *i as f64)?;
            }
            Data::Float(f) => {
                sheet.write_number(row, col, *f)?;
            }
            Data::Bool(b) => {
                sheet.write_boolean(row, col, *b)?;
            }
            Data::DateTime(dt) => {
                sheet.write_number_with_format(row, col, dt.as_f64(), date_format)?;
            }
            Data::Error(e) => {
                sheet.write_string(row, col, e.to_string())?;
            }
        }
    }
    Ok(())
}

fn column_index(path: &Path, col: usize) -> ReportResult<u16> {
    u16::try_from(col).map_err(|_| ReportError::write(path, "too many columns for a worksheet"))
}
