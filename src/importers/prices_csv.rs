use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, info};

use super::{parse_amount, sniff_delimiter};
use crate::ledger::{parse_day, RawDate};
use crate::pricing::{BenchmarkPoint, PriceObservation};

/// Load a long price table with `date`, `asset` and `price` columns.
///
/// Extra columns are ignored, so a `portfolio_history.csv` written by a
/// previous run loads as-is.
pub fn load_prices<P: AsRef<Path>>(file_path: P) -> Result<Vec<PriceObservation>> {
    let path = file_path.as_ref();
    info!("Loading prices from {:?}", path);

    let (headers, records) = read_table(path)?;
    let date = column(&headers, &["date", "datum"])?;
    let asset = column(&headers, &["asset", "anlage", "ticker"])?;
    let price = column(&headers, &["price", "close", "kurs"])?;

    let mut observations = Vec::with_capacity(records.len());
    for (line, record) in &records {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let Some(value) = parse_amount(field(price)).with_context(|| format!("Line {}", line))? else {
            debug!("Line {}: empty price, skipped", line);
            continue;
        };
        observations.push(PriceObservation {
            asset: field(asset).to_string(),
            date: parse_date(field(date), *line)?,
            price: value,
        });
    }

    info!("Loaded {} price observations", observations.len());
    Ok(observations)
}

/// Load a benchmark series with `date` and `value` columns
pub fn load_benchmark<P: AsRef<Path>>(file_path: P) -> Result<Vec<BenchmarkPoint>> {
    let path = file_path.as_ref();
    info!("Loading benchmark from {:?}", path);

    let (headers, records) = read_table(path)?;
    let date = column(&headers, &["date", "datum"])?;
    let value = column(&headers, &["value", "close", "price"])?;

    let mut points = Vec::with_capacity(records.len());
    for (line, record) in &records {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let Some(v) = parse_amount(field(value)).with_context(|| format!("Line {}", line))? else {
            continue;
        };
        points.push(BenchmarkPoint {
            date: parse_date(field(date), *line)?,
            value: v,
        });
    }

    info!("Loaded {} benchmark points", points.len());
    Ok(points)
}

fn read_table(path: &Path) -> Result<(StringRecord, Vec<(u64, StringRecord)>)> {
    let mut reader = ReaderBuilder::new()
        .delimiter(sniff_delimiter(path)?)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {:?}", path))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        records.push((line, record));
    }
    Ok((headers, records))
}

fn column(headers: &StringRecord, names: &[&str]) -> Result<usize> {
    headers
        .iter()
        .position(|h| {
            let h = h.trim_start_matches('\u{feff}').trim().to_lowercase();
            names.contains(&h.as_str())
        })
        .ok_or_else(|| anyhow!("Missing '{}' column", names[0]))
}

fn parse_date(text: &str, line: u64) -> Result<chrono::NaiveDate> {
    parse_day(&RawDate::Text(text.to_string())).map_err(|e| anyhow!("Line {}: {}", line, e))
}
