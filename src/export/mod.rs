// Export module - CSV tables for the dashboard

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pipeline::{PortfolioRun, PriceHistoryRow};
use crate::pricing::{BenchmarkPoint, PriceObservation};
use crate::reports::{BenchmarkRow, DailyMetrics};

pub const TIME_SERIES_FILE: &str = "time_series_data.csv";
pub const PRICE_HISTORY_FILE: &str = "portfolio_history.csv";
pub const BENCHMARK_FILE: &str = "index_benchmark.csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const OUTPUT_DP: u32 = 10;

#[derive(Serialize)]
struct TimeSeriesRecord<'a> {
    date: NaiveDate,
    asset: &'a str,
    price: Option<Decimal>,
    volume: Option<Decimal>,
    cost_basis: Decimal,
    cash_received: Decimal,
    fees_paid: Decimal,
    owned_value: Option<Decimal>,
    total_return: Option<Decimal>,
    unrealized_return: Option<Decimal>,
    drawdown: Option<Decimal>,
    weighted_drawdown: Option<Decimal>,
    relative_total_return: Option<Decimal>,
}

impl<'a> From<&'a DailyMetrics> for TimeSeriesRecord<'a> {
    fn from(m: &'a DailyMetrics) -> Self {
        Self {
            date: m.date,
            asset: &m.asset,
            price: m.price.map(tidy),
            volume: m.held.map(tidy),
            cost_basis: tidy(m.cost_basis),
            cash_received: tidy(m.cash_received),
            fees_paid: tidy(m.fees_paid),
            owned_value: m.owned_value.map(tidy),
            total_return: m.total_return.map(tidy),
            unrealized_return: m.unrealized_return.map(tidy),
            drawdown: m.drawdown.map(tidy),
            weighted_drawdown: m.weighted_drawdown.map(tidy),
            relative_total_return: m.relative_total_return.map(tidy),
        }
    }
}

#[derive(Serialize)]
struct PriceHistoryRecord<'a> {
    date: NaiveDate,
    asset: &'a str,
    price: Decimal,
    price_index: Decimal,
}

#[derive(Serialize)]
struct BenchmarkRecord {
    date: NaiveDate,
    portfolio_index: Option<Decimal>,
    weighted_index: Option<Decimal>,
    benchmark_index: Option<Decimal>,
}

/// Round away division noise and drop trailing zeros
fn tidy(value: Decimal) -> Decimal {
    value.round_dp(OUTPUT_DP).normalize()
}

/// Write the tables of a run into `dir`, returning the files written.
/// The benchmark table is only written when the comparison produced rows.
pub fn write_all(dir: &Path, run: &PortfolioRun) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let mut written = Vec::new();

    let path = dir.join(TIME_SERIES_FILE);
    write_time_series(&path, &run.metrics)?;
    written.push(path);

    let path = dir.join(PRICE_HISTORY_FILE);
    write_price_history(&path, &run.price_history)?;
    written.push(path);

    if !run.benchmark.is_empty() {
        let path = dir.join(BENCHMARK_FILE);
        write_benchmark(&path, &run.benchmark)?;
        written.push(path);
    }

    info!("Wrote {} files to {:?}", written.len(), dir);
    Ok(written)
}

pub fn write_time_series(path: &Path, rows: &[DailyMetrics]) -> Result<()> {
    write_csv(path, rows.iter().map(TimeSeriesRecord::from))
}

pub fn write_price_history(path: &Path, rows: &[PriceHistoryRow]) -> Result<()> {
    write_csv(
        path,
        rows.iter().map(|r| PriceHistoryRecord {
            date: r.date,
            asset: &r.asset,
            price: tidy(r.price),
            price_index: tidy(r.price_index),
        }),
    )
}

pub fn write_benchmark(path: &Path, rows: &[BenchmarkRow]) -> Result<()> {
    write_csv(
        path,
        rows.iter().map(|r| BenchmarkRecord {
            date: r.date,
            portfolio_index: r.portfolio_index.map(tidy),
            weighted_index: r.weighted_index.map(tidy),
            benchmark_index: r.benchmark_index.map(tidy),
        }),
    )
}

/// Raw observations in the `date,asset,price` layout the price loader reads
pub fn write_prices(path: &Path, observations: &[PriceObservation]) -> Result<()> {
    write_csv(path, observations)
}

/// Benchmark points in the `date,value` layout
pub fn write_benchmark_points(path: &Path, points: &[BenchmarkPoint]) -> Result<()> {
    write_csv(path, points)
}

/// UTF-8 with a byte-order mark, comma separated, header from the record type
fn write_csv<T: Serialize>(path: &Path, records: impl IntoIterator<Item = T>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut out = BufWriter::new(file);
    out.write_all(UTF8_BOM)
        .with_context(|| format!("Failed to write {:?}", path))?;

    let mut writer = csv::Writer::from_writer(out);
    let mut count = 0usize;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write record to {:?}", path))?;
        count += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {:?}", path))?;

    info!("Wrote {} rows to {:?}", count, path);
    Ok(())
}
