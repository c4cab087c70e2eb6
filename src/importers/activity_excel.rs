use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{Cell, ColumnMapping};
use crate::ledger::{RawActivity, RawDate};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parse the activity sheet of an Excel workbook
pub fn parse_activity_excel<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawActivity>> {
    let path = file_path.as_ref();
    info!("Parsing activity workbook: {:?}", path);

    let mut workbook = open_workbook_auto(path).context("Failed to open Excel file")?;

    let sheet_name = find_activity_sheet(&workbook.sheet_names())?;
    info!("Using sheet: {}", sheet_name);

    let range = workbook
        .worksheet_range(&sheet_name)
        .context("Failed to read worksheet")?;
    // Absolute row of the range's first row, for 1-indexed row numbers
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut rows = range.rows().enumerate();

    // Scan for header row (first row with all required columns)
    let mut mapping = None;
    for (_, row) in rows.by_ref() {
        let names: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        let candidate = ColumnMapping::from_header(&names);
        if candidate.is_valid() {
            debug!("Column mapping: {:?}", candidate);
            mapping = Some(candidate);
            break;
        }
        if names.iter().any(|n| !n.trim().is_empty()) {
            warn!(
                "Skipping row without required columns (missing {:?})",
                candidate.missing_required()
            );
        }
    }
    let mapping = mapping.ok_or_else(|| {
        anyhow!("Could not find header row with date, asset, type and volume columns")
    })?;

    let mut activities = Vec::new();
    for (idx, row) in rows {
        let cells: Vec<Cell> = row.iter().map(to_cell).collect();
        if let Some(activity) = mapping.to_raw(first_row + idx + 1, &cells)? {
            activities.push(activity);
        }
    }

    info!("Successfully parsed {} activity rows", activities.len());
    Ok(activities)
}

/// Prefer a sheet named like an activity log, else the first sheet
fn find_activity_sheet(sheet_names: &[String]) -> Result<String> {
    let patterns = ["activit", "ledger", "transaktion"];

    for pattern in &patterns {
        if let Some(name) = sheet_names
            .iter()
            .find(|name| name.to_lowercase().contains(pattern))
        {
            return Ok(name.clone());
        }
    }

    sheet_names
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("No sheets found in workbook"))
}

fn to_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(Decimal::from(*i)),
        Data::Float(f) => match Decimal::from_f64(*f) {
            Some(d) => Cell::Number(d),
            None => Cell::Text(f.to_string()),
        },
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(ts) if ts.time() == chrono::NaiveTime::MIN => Cell::Date(RawDate::Day(ts.date())),
            Some(ts) => Cell::Date(RawDate::Timestamp(ts)),
            None => Cell::Text(dt.as_f64().to_string()),
        },
        Data::DateTimeIso(s) => Cell::Date(RawDate::Text(s.clone())),
        Data::String(s) => Cell::from_text(s),
        Data::Error(e) => {
            debug!("Error cell {:?} read as empty", e);
            Cell::Empty
        }
        other => Cell::from_text(&other.to_string()),
    }
}

/// Excel serial day number (1900 date system) to a timestamp
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}
