// Pricing module - price observations, Yahoo Finance history, calendar alignment

pub mod aligner;
pub mod yahoo;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

pub use aligner::{AlignedPrices, AssetPriceSeries, PriceAligner, UnpricedAssetWarning};
pub use yahoo::HistoricalClose;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// One raw close price for an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub asset: String,
    pub price: Decimal,
}

/// One value of the external benchmark index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Result of fetching a set of tickers; failed labels get no observations.
/// Benchmark closes are kept apart so an asset sharing the benchmark's label
/// keeps its own prices.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub observations: Vec<PriceObservation>,
    pub benchmark: Vec<BenchmarkPoint>,
    pub failed: Vec<String>,
}

impl FetchReport {
    pub fn add_asset(&mut self, label: &str, closes: Vec<HistoricalClose>) {
        self.observations
            .extend(closes.into_iter().map(|c| PriceObservation {
                date: c.date,
                asset: label.to_string(),
                price: c.close,
            }));
    }

    pub fn add_benchmark(&mut self, closes: Vec<HistoricalClose>) {
        self.benchmark.extend(closes.into_iter().map(|c| BenchmarkPoint {
            date: c.date,
            value: c.close,
        }));
    }
}

/// Historical price fetcher over a label -> ticker map plus an optional
/// benchmark ticker
pub struct PriceFetcher {
    client: Client,
    tickers: BTreeMap<String, String>,
    benchmark: Option<(String, String)>,
}

impl PriceFetcher {
    pub fn new(tickers: BTreeMap<String, String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; FolioBot/1.0)")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            tickers,
            benchmark: None,
        })
    }

    pub fn with_benchmark(mut self, label: impl Into<String>, ticker: impl Into<String>) -> Self {
        self.benchmark = Some((label.into(), ticker.into()));
        self
    }

    fn ticker_count(&self) -> usize {
        self.tickers.len() + usize::from(self.benchmark.is_some())
    }

    /// Fetch closes for every configured label and the benchmark. A failing
    /// ticker is logged and reported but never aborts the batch.
    pub async fn fetch_all(&self, from: NaiveDate, to: NaiveDate, show_progress: bool) -> FetchReport {
        info!(
            "Fetching historical prices for {} tickers from {} to {}",
            self.ticker_count(),
            from,
            to
        );

        let progress = if show_progress {
            let bar = ProgressBar::new(self.ticker_count() as u64);
            if let Ok(style) = ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut report = FetchReport::default();
        for (label, ticker) in &self.tickers {
            progress.set_message(label.clone());
            if let Some(closes) = self.fetch_closes(label, ticker, from, to, &mut report).await {
                report.add_asset(label, closes);
            }
            progress.inc(1);
        }
        if let Some((label, ticker)) = &self.benchmark {
            progress.set_message(label.clone());
            if let Some(closes) = self.fetch_closes(label, ticker, from, to, &mut report).await {
                report.add_benchmark(closes);
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        report
    }

    async fn fetch_closes(
        &self,
        label: &str,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
        report: &mut FetchReport,
    ) -> Option<Vec<HistoricalClose>> {
        match yahoo::fetch_historical_closes(&self.client, ticker, from, to).await {
            Ok(closes) if !closes.is_empty() => Some(closes),
            Ok(_) => {
                warn!("No price data for {} ({})", label, ticker);
                report.failed.push(label.to_string());
                None
            }
            Err(e) => {
                warn!("Error fetching {} ({}): {:#}", label, ticker, e);
                report.failed.push(label.to_string());
                None
            }
        }
    }
}
