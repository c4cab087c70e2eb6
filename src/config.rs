//! TOML configuration loading
//!
//! The file carries the ticker map, the benchmark definition, manual price
//! overrides and output settings. `Config::analysis` turns it into the
//! explicit `AnalysisConfig` value handed to the normalizer and aligner.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::EngineError;

const LOCAL_CONFIG_FILE: &str = "folio.toml";
const DEFAULT_OUTPUT_DIR: &str = "tableau_data";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisSection,
    /// Asset label -> Yahoo Finance symbol
    pub tickers: BTreeMap<String, String>,
    pub benchmark: Option<BenchmarkConfig>,
    pub manual_prices: Vec<ManualPrice>,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub end_date: Option<NaiveDate>,
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    pub label: String,
    pub ticker: String,
}

/// A manual price override.
///
/// With `date` it applies to a single day, with `from`/`to` to a range
/// (open ends reach the calendar bounds), and with neither to every day.
/// A `fallback` override is only used for assets with no fetched prices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManualPrice {
    pub asset: String,
    pub price: Decimal,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub fallback: bool,
}

impl ManualPrice {
    /// Constant override over the whole calendar
    pub fn constant(asset: impl Into<String>, price: Decimal) -> Self {
        Self {
            asset: asset.into(),
            price,
            date: None,
            from: None,
            to: None,
            fallback: false,
        }
    }

    pub fn on(asset: impl Into<String>, date: NaiveDate, price: Decimal) -> Self {
        Self {
            date: Some(date),
            ..Self::constant(asset, price)
        }
    }

    pub fn between(
        asset: impl Into<String>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        price: Decimal,
    ) -> Self {
        Self {
            from,
            to,
            ..Self::constant(asset, price)
        }
    }

    /// Resolve the inclusive day range this override covers within `[start, end]`
    pub fn span(&self, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let (from, to) = match self.date {
            Some(day) => (day, day),
            None => (self.from.unwrap_or(start), self.to.unwrap_or(end)),
        };
        let from = from.max(start);
        let to = to.min(end);
        (from <= to).then_some((from, to))
    }

    fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.price <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "manual price for {} must be positive, got {}",
                self.asset, self.price
            )));
        }
        if self.date.is_some() && (self.from.is_some() || self.to.is_some()) {
            return Err(EngineError::Config(format!(
                "manual price for {} sets both 'date' and a 'from'/'to' range",
                self.asset
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(EngineError::Config(format!(
                    "manual price range for {} starts after it ends ({} > {})",
                    self.asset, from, to
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

/// Explicit settings threaded into the computation core
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub end_date: NaiveDate,
    pub strict: bool,
    pub manual_prices: Vec<ManualPrice>,
}

impl AnalysisConfig {
    pub fn new(end_date: NaiveDate) -> Self {
        Self {
            end_date,
            strict: false,
            manual_prices: Vec::new(),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_manual_prices(mut self, manual_prices: Vec<ManualPrice>) -> Self {
        self.manual_prices = manual_prices;
        self
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or the first default location that exists.
    /// Falls back to defaults when no file is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        for candidate in default_locations() {
            if candidate.exists() {
                return Self::load_file(&candidate);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {:?}", path);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    fn validate(&self) -> std::result::Result<(), EngineError> {
        for manual in &self.manual_prices {
            manual.validate()?;
        }
        if let Some(benchmark) = &self.benchmark {
            if benchmark.label.trim().is_empty() || benchmark.ticker.trim().is_empty() {
                return Err(EngineError::Config(
                    "benchmark needs both a label and a ticker".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Build the core settings; `end_date` defaults to today
    pub fn analysis(&self) -> AnalysisConfig {
        let end_date = self
            .analysis
            .end_date
            .unwrap_or_else(|| Local::now().date_naive());
        AnalysisConfig::new(end_date)
            .with_strict(self.analysis.strict)
            .with_manual_prices(self.manual_prices.clone())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(config_home) = dir_spec::config_home() {
        locations.push(config_home.join("folio").join("config.toml"));
    }
    locations
}
