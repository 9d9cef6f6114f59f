// src/loader.rs
//
// CSV ingestion for the reference sheets and the dataset, plus dataset
// write-back. The engine itself never touches files; everything it consumes
// is parsed here, once, before a cascade runs.
use chrono::{Days, NaiveDate};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cell::Cell;
use crate::filler::DataTable;
use crate::record::Field;
use crate::reference::{RefTable, ReferenceSnapshot};

/// Expected file names inside a reference-workbook directory, one CSV per
/// exported sheet.
pub const INFO_FILE: &str = "info.csv";
pub const RATES_FILE: &str = "hourly_rates.csv";
pub const SUMMARY_FILE: &str = "summary.csv";

// Excel serial date range worth converting; anything outside is left alone
// rather than guessed at.
const SERIAL_DAY_MIN: f64 = 20_000.0; // mid-1954
const SERIAL_DAY_MAX: f64 = 80_000.0; // early 2119

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse CSV '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Dataset '{}' has no header row", path.display())]
    MissingHeader { path: PathBuf },
}

fn csv_err(path: &Path, source: csv::Error) -> LoadError {
    LoadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Parse one raw CSV field into a cell. Blank fields become empty cells,
/// TRUE/FALSE become booleans, numerics become numbers, everything else
/// stays text byte-for-byte (trimming happens at coercion time, not here,
/// so untouched cells round-trip identically).
pub fn parse_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Cell::Empty;
    }
    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Cell::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Cell::Bool(false);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Cell::Number(n);
    }
    Cell::Text(raw.to_string())
}

fn record_to_cells(record: &StringRecord) -> Vec<Cell> {
    record.iter().map(parse_cell).collect()
}

/// Load one headerless, positionally-addressed reference sheet.
pub fn load_ref_table(path: &Path) -> Result<RefTable, LoadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| csv_err(path, e))?;
        rows.push(record_to_cells(&record));
    }
    let table = RefTable::from_rows(rows);
    if table.is_empty() {
        warn!(path = %path.display(), "reference sheet is empty, lookups against it will fall back");
    }
    debug!(path = %path.display(), rows = table.row_count(), "reference sheet loaded");
    Ok(table)
}

/// Load the three reference sheets from a workbook directory. The Summary
/// sheet is optional — older workbooks ship without it, and its absence is
/// data (the unit-price branch degrades to 0), not an error.
pub fn load_reference_dir(dir: &Path) -> Result<ReferenceSnapshot, LoadError> {
    let info = load_ref_table(&dir.join(INFO_FILE))?;
    let rates = load_ref_table(&dir.join(RATES_FILE))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let summary = if summary_path.exists() {
        Some(load_ref_table(&summary_path)?)
    } else {
        info!(
            path = %summary_path.display(),
            "no summary sheet in this workbook, unit prices fall back to 0"
        );
        None
    };

    Ok(ReferenceSnapshot {
        info,
        rates,
        summary,
    })
}

/// Render a week/period cell for display: Excel serial dates and ISO dates
/// become `DD/Mon/YYYY`, anything that does not parse passes through
/// untouched.
pub fn format_week_month(cell: &Cell) -> Cell {
    match cell {
        Cell::Number(n)
            if n.fract() == 0.0 && (SERIAL_DAY_MIN..=SERIAL_DAY_MAX).contains(n) =>
        {
            // Excel's day 0 is 1899-12-30.
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).expect("excel epoch");
            match epoch.checked_add_days(Days::new(*n as u64)) {
                Some(date) => Cell::text(date.format("%d/%b/%Y").to_string()),
                None => cell.clone(),
            }
        }
        Cell::Text(s) => {
            let trimmed = s.trim();
            for pattern in ["%Y-%m-%d", "%d/%b/%Y"] {
                if let Ok(date) = NaiveDate::parse_from_str(trimmed, pattern) {
                    return Cell::text(date.format("%d/%b/%Y").to_string());
                }
            }
            cell.clone()
        }
        _ => cell.clone(),
    }
}

/// Load a dataset table (first row = headers) and normalize its week/period
/// column for display.
pub fn load_dataset(path: &Path) -> Result<DataTable, LoadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_err(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(LoadError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let unknown: Vec<&String> = headers
        .iter()
        .filter(|h| Field::from_name(h).is_none())
        .collect();
    if !unknown.is_empty() {
        debug!(?unknown, "columns outside the known schema pass through untouched");
    }

    let mut table = DataTable::new(headers.clone());
    for result in reader.records() {
        let record = result.map_err(|e| csv_err(path, e))?;
        table.push_row(record_to_cells(&record));
    }

    if let Some(week_col) = table.find_field(Field::WeekMonth) {
        for row in 0..table.row_count() {
            let formatted = format_week_month(table.get(row, week_col));
            if &formatted != table.get(row, week_col) {
                table.set(row, week_col, formatted);
            }
        }
    }

    info!(path = %path.display(), rows = table.row_count(), "dataset loaded");
    Ok(table)
}

/// Write a dataset table back out, headers first, cells rendered the way
/// they display (empty cells as empty fields, integral numbers without a
/// decimal suffix).
pub fn write_dataset(table: &DataTable, path: &Path) -> Result<(), LoadError> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;

    writer
        .write_record(table.columns())
        .map_err(|e| csv_err(path, e))?;
    for row in 0..table.row_count() {
        let rendered: Vec<String> = table.row(row).iter().map(Cell::to_string).collect();
        writer.write_record(&rendered).map_err(|e| csv_err(path, e))?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = table.row_count(), "dataset written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_types() {
        assert_eq!(parse_cell(""), Cell::Empty);
        assert_eq!(parse_cell("   "), Cell::Empty);
        assert_eq!(parse_cell("905264"), Cell::Number(905264.0));
        assert_eq!(parse_cell("35.5"), Cell::Number(35.5));
        assert_eq!(parse_cell("TRUE"), Cell::Bool(true));
        assert_eq!(parse_cell("false"), Cell::Bool(false));
        assert_eq!(parse_cell("Scope-A"), Cell::text("Scope-A"));
        // Untouched text keeps its original bytes.
        assert_eq!(parse_cell(" padded "), Cell::text(" padded "));
    }

    #[test]
    fn week_month_formats_serials_and_iso_dates() {
        // 45962 days after 1899-12-30 is 2025-11-01.
        assert_eq!(
            format_week_month(&Cell::Number(45962.0)),
            Cell::text("01/Nov/2025")
        );
        assert_eq!(
            format_week_month(&Cell::text("2025-11-01")),
            Cell::text("01/Nov/2025")
        );
        // Already formatted values normalize to themselves.
        assert_eq!(
            format_week_month(&Cell::text("01/Nov/2025")),
            Cell::text("01/Nov/2025")
        );
        // Non-dates pass through.
        assert_eq!(
            format_week_month(&Cell::text("Week 44")),
            Cell::text("Week 44")
        );
        assert_eq!(format_week_month(&Cell::Number(160.0)), Cell::Number(160.0));
    }
}
