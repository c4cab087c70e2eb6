use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info};

use super::{sniff_delimiter, Cell, ColumnMapping};
use crate::ledger::RawActivity;

/// Parse an activity ledger exported as CSV (`,` or `;` separated)
pub fn parse_activity_csv<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawActivity>> {
    let path = file_path.as_ref();
    info!("Parsing activity CSV file: {:?}", path);

    let delimiter = sniff_delimiter(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true) // Allow variable number of columns
        .from_path(path)
        .context("Failed to open CSV file")?;

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    debug!("CSV headers: {:?}", headers);

    let names: Vec<&str> = headers.iter().collect();
    let mapping = ColumnMapping::from_header(&names);
    if !mapping.is_valid() {
        return Err(anyhow!(
            "CSV file is missing required columns: {}",
            mapping.missing_required().join(", ")
        ));
    }

    let mut activities = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read CSV record")?;
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        let cells: Vec<Cell> = record.iter().map(Cell::from_text).collect();

        if let Some(activity) = mapping.to_raw(row, &cells)? {
            activities.push(activity);
        }
    }

    info!(
        "Successfully parsed {} activity rows from CSV",
        activities.len()
    );
    Ok(activities)
}
