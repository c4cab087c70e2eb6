//! End-to-end computation over materialized inputs.
//!
//! `Pipeline::run` is a pure function of its input: normalize the ledger
//! (`run_ledger` takes one already normalized), align prices on the
//! calendar, replay each asset independently, fold the survivors into
//! `Total`, then compare against the benchmark.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::calendar::Calendar;
use crate::config::AnalysisConfig;
use crate::error::EngineError;
use crate::inventory::{self, AssetInventory};
use crate::ledger::{ActivityEvent, Ledger, LedgerNormalizer, RawActivity};
use crate::pricing::{
    AlignedPrices, BenchmarkPoint, PriceAligner, PriceObservation, UnpricedAssetWarning,
};
use crate::reports::{self, AssetSummary, BenchmarkRow, DailyMetrics};

/// External index to compare the portfolio against
#[derive(Debug, Clone, Default)]
pub struct BenchmarkInput {
    pub label: String,
    pub points: Vec<BenchmarkPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub activities: Vec<RawActivity>,
    pub prices: Vec<PriceObservation>,
    pub benchmark: Option<BenchmarkInput>,
}

/// One row of the price history table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistoryRow {
    pub date: NaiveDate,
    pub asset: String,
    pub price: Decimal,
    /// Price rebased to 100 on the first priced day
    pub price_index: Decimal,
}

/// An asset whose reconstruction failed and was left out of `Total`
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFailure {
    pub asset: String,
    pub error: EngineError,
}

/// Everything one run produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioRun {
    /// `None` when the ledger has no events
    pub calendar: Option<Calendar>,
    pub metrics: Vec<DailyMetrics>,
    pub price_history: Vec<PriceHistoryRow>,
    pub benchmark: Vec<BenchmarkRow>,
    pub benchmark_error: Option<EngineError>,
    pub warnings: Vec<UnpricedAssetWarning>,
    pub failures: Vec<AssetFailure>,
    pub summaries: Vec<AssetSummary>,
}

impl PortfolioRun {
    pub fn total_rows(&self) -> impl Iterator<Item = &DailyMetrics> {
        self.metrics.iter().filter(|m| m.is_total())
    }

    pub fn rows_for<'a>(&'a self, asset: &'a str) -> impl Iterator<Item = &'a DailyMetrics> + 'a {
        self.metrics.iter().filter(move |m| m.asset == asset)
    }

    /// Last `Total` row, the portfolio as of the end date
    pub fn latest_total(&self) -> Option<&DailyMetrics> {
        self.total_rows().last()
    }

    /// Largest drawdown of the aggregate owned value
    pub fn max_total_drawdown(&self) -> Option<Decimal> {
        self.total_rows().filter_map(|m| m.drawdown).max()
    }
}

/// Result of the per-asset pass
struct AssetRun {
    metrics: Vec<DailyMetrics>,
    summary: AssetSummary,
}

pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the whole computation.
    ///
    /// Malformed rows abort the run. Per-asset failures are collected in
    /// `failures` unless the configuration is strict, in which case the first
    /// one (in asset order) is returned.
    pub fn run(&self, input: &PipelineInput) -> Result<PortfolioRun, EngineError> {
        let ledger = LedgerNormalizer::new(&self.config).normalize(&input.activities)?;
        self.run_ledger(&ledger, &input.prices, input.benchmark.as_ref())
    }

    /// Run over a ledger the caller already normalized with this configuration
    pub fn run_ledger(
        &self,
        ledger: &Ledger,
        observations: &[PriceObservation],
        benchmark: Option<&BenchmarkInput>,
    ) -> Result<PortfolioRun, EngineError> {
        let aligner = PriceAligner::new(&self.config);

        let Some(calendar) = aligner.calendar_for(ledger) else {
            info!("Ledger is empty, nothing to compute");
            return Ok(PortfolioRun::default());
        };
        info!(
            "Normalized {} events for {} assets, calendar {} to {}",
            ledger.len(),
            ledger.assets().count(),
            calendar.start(),
            calendar.end()
        );

        let prices = aligner.align(ledger, &calendar, observations);

        let assets: Vec<(&str, &[ActivityEvent])> = ledger.iter().collect();
        let outcomes = map_assets(&assets, |asset, events| {
            self.run_asset(asset, events, &calendar, &aligner, &prices)
        });

        let mut runs = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for ((asset, _), outcome) in assets.iter().zip(outcomes) {
            match outcome {
                Ok(run) => runs.push(run),
                Err(error) if self.config.strict => return Err(error),
                Err(error) => {
                    warn!("{} excluded from Total: {}", asset, error);
                    failures.push(AssetFailure {
                        asset: asset.to_string(),
                        error,
                    });
                }
            }
        }

        let total = reports::aggregate(runs.iter().map(|r| r.metrics.as_slice()), &calendar);

        let aligned_benchmark =
            benchmark.map(|bench| (bench, aligner.align_benchmark(&calendar, &bench.points)));

        let (benchmark, benchmark_error) = match &aligned_benchmark {
            Some((bench, aligned)) => match reports::compare(
                &calendar,
                &total,
                runs.iter().map(|r| r.metrics.as_slice()),
                aligned,
            ) {
                Ok(rows) => (rows, None),
                Err(error) => {
                    warn!("Benchmark {}: {}", bench.label, error);
                    (Vec::new(), Some(error))
                }
            },
            None => (Vec::new(), None),
        };

        let mut price_history = price_history(&prices, &calendar);
        if let Some((bench, aligned)) = &aligned_benchmark {
            price_history.extend(rebased_rows(&bench.label, aligned, &calendar));
        }

        let mut metrics = Vec::new();
        let mut summaries = Vec::with_capacity(runs.len());
        for run in runs {
            metrics.extend(run.metrics);
            summaries.push(run.summary);
        }
        metrics.extend(total);

        info!(
            "Computed {} metric rows, {} assets failed, {} unpriced",
            metrics.len(),
            failures.len(),
            prices.warnings.len()
        );

        Ok(PortfolioRun {
            calendar: Some(calendar),
            metrics,
            price_history,
            benchmark,
            benchmark_error,
            warnings: prices.warnings,
            failures,
            summaries,
        })
    }

    fn run_asset(
        &self,
        asset: &str,
        events: &[ActivityEvent],
        calendar: &Calendar,
        aligner: &PriceAligner,
        prices: &AlignedPrices,
    ) -> Result<AssetRun, EngineError> {
        let inventory: AssetInventory = inventory::reconstruct(asset, events, calendar, aligner)?;
        let metrics = reports::asset_metrics(&inventory, prices.get(asset), calendar);
        let summary =
            reports::summarize(events, &inventory, &metrics, aligner, self.config.end_date)?;
        Ok(AssetRun { metrics, summary })
    }
}

#[cfg(feature = "parallel")]
fn map_assets<T, F>(assets: &[(&str, &[ActivityEvent])], f: F) -> Vec<T>
where
    F: Fn(&str, &[ActivityEvent]) -> T + Sync,
    T: Send,
{
    use rayon::prelude::*;

    assets.par_iter().map(|&(asset, events)| f(asset, events)).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_assets<T, F>(assets: &[(&str, &[ActivityEvent])], f: F) -> Vec<T>
where
    F: Fn(&str, &[ActivityEvent]) -> T,
{
    assets.iter().map(|&(asset, events)| f(asset, events)).collect()
}

fn price_history(prices: &AlignedPrices, calendar: &Calendar) -> Vec<PriceHistoryRow> {
    prices
        .series
        .values()
        .flat_map(|series| rebased_rows(&series.asset, series.prices(), calendar))
        .collect()
}

/// Daily rows for a dense series, indexed to 100 on its first defined day
fn rebased_rows(asset: &str, prices: &[Option<Decimal>], calendar: &Calendar) -> Vec<PriceHistoryRow> {
    let Some(base) = prices.iter().flatten().copied().find(|p| *p > Decimal::ZERO) else {
        return Vec::new();
    };
    prices
        .iter()
        .enumerate()
        .filter_map(|(offset, price)| {
            price.map(|price| PriceHistoryRow {
                date: calendar.day(offset),
                asset: asset.to_string(),
                price,
                price_index: (price / base * Decimal::ONE_HUNDRED).round_dp(12),
            })
        })
        .collect()
}
