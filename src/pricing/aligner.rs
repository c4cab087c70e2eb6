//! Price alignment onto the daily calendar.
//!
//! Fetched observations and manual overrides are merged into one dated map
//! per asset (overrides win), then forward-filled across the calendar. Days
//! before the first known price stay `None`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{BenchmarkPoint, PriceObservation};
use crate::calendar::Calendar;
use crate::config::{AnalysisConfig, ManualPrice};
use crate::ledger::Ledger;

/// Non-fatal: the asset has no usable price over its holding period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpricedAssetWarning {
    pub asset: String,
}

/// Dense daily prices for one asset over the calendar
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPriceSeries {
    pub asset: String,
    prices: Vec<Option<Decimal>>,
}

impl AssetPriceSeries {
    pub fn new(asset: impl Into<String>, prices: Vec<Option<Decimal>>) -> Self {
        Self {
            asset: asset.into(),
            prices,
        }
    }

    /// Price at a calendar offset; `None` before the first known price
    pub fn at(&self, offset: usize) -> Option<Decimal> {
        self.prices.get(offset).copied().flatten()
    }

    pub fn prices(&self) -> &[Option<Decimal>] {
        &self.prices
    }

    pub fn first_defined(&self) -> Option<usize> {
        self.prices.iter().position(Option::is_some)
    }

    /// True when no day from `offset` onward has a price
    pub fn is_unpriced_from(&self, offset: usize) -> bool {
        self.prices.iter().skip(offset).all(Option::is_none)
    }
}

/// Output of the aligner for a whole ledger
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPrices {
    pub series: BTreeMap<String, AssetPriceSeries>,
    pub warnings: Vec<UnpricedAssetWarning>,
}

impl AlignedPrices {
    pub fn get(&self, asset: &str) -> Option<&AssetPriceSeries> {
        self.series.get(asset)
    }

    pub fn is_unpriced(&self, asset: &str) -> bool {
        self.warnings.iter().any(|w| w.asset == asset)
    }
}

/// Merges fetched prices with manual overrides and forward-fills them
#[derive(Debug, Clone)]
pub struct PriceAligner {
    end_date: NaiveDate,
    overrides: Vec<ManualPrice>,
}

impl PriceAligner {
    pub fn new(config: &AnalysisConfig) -> Self {
        let mut overrides = config.manual_prices.clone();
        // Broader overrides first so narrower ones are written over them
        overrides.sort_by_key(specificity);
        Self {
            end_date: config.end_date,
            overrides,
        }
    }

    /// Calendar from the first ledger event through the analysis end date
    pub fn calendar_for(&self, ledger: &Ledger) -> Option<Calendar> {
        ledger
            .first_date()
            .and_then(|start| Calendar::new(start, self.end_date))
    }

    /// Manual override for `asset` on `date`; the most specific entry wins
    pub fn override_price(&self, asset: &str, date: NaiveDate) -> Option<Decimal> {
        self.overrides
            .iter()
            .rev()
            .filter(|m| m.asset == asset)
            .find(|m| m.span(date, date).is_some())
            .map(|m| m.price)
    }

    /// Align every ledger asset and flag the ones with no usable price
    pub fn align(
        &self,
        ledger: &Ledger,
        calendar: &Calendar,
        observations: &[PriceObservation],
    ) -> AlignedPrices {
        let mut by_asset: BTreeMap<&str, BTreeMap<NaiveDate, Decimal>> = BTreeMap::new();
        for obs in observations {
            if obs.price <= Decimal::ZERO {
                warn!(
                    "Ignoring non-positive price {} for {} on {}",
                    obs.price, obs.asset, obs.date
                );
                continue;
            }
            by_asset
                .entry(obs.asset.as_str())
                .or_default()
                .insert(obs.date, obs.price);
        }

        let mut series = BTreeMap::new();
        let mut warnings = Vec::new();

        for asset in ledger.assets() {
            let fetched = by_asset.remove(asset).unwrap_or_default();
            let merged = self.merge_overrides(asset, fetched, calendar);
            let aligned = AssetPriceSeries::new(asset, forward_fill(&merged, calendar));

            let first_event = ledger
                .first_date_of(asset)
                .and_then(|d| calendar.index_of(d))
                .unwrap_or(0);
            if aligned.is_unpriced_from(first_event) {
                warn!("{}: no price data over the holding period", asset);
                warnings.push(UnpricedAssetWarning {
                    asset: asset.to_string(),
                });
            }
            series.insert(asset.to_string(), aligned);
        }

        for asset in by_asset.keys() {
            debug!("Ignoring prices for {}, which has no ledger events", asset);
        }

        AlignedPrices { series, warnings }
    }

    /// Benchmark values forward-filled onto the calendar
    pub fn align_benchmark(&self, calendar: &Calendar, points: &[BenchmarkPoint]) -> Vec<Option<Decimal>> {
        let known: BTreeMap<NaiveDate, Decimal> = points
            .iter()
            .filter(|p| p.value > Decimal::ZERO)
            .map(|p| (p.date, p.value))
            .collect();
        forward_fill(&known, calendar)
    }

    fn merge_overrides(
        &self,
        asset: &str,
        mut known: BTreeMap<NaiveDate, Decimal>,
        calendar: &Calendar,
    ) -> BTreeMap<NaiveDate, Decimal> {
        let has_fetched = !known.is_empty();
        for manual in self.overrides.iter().filter(|m| m.asset == asset) {
            if manual.fallback && has_fetched {
                continue;
            }
            let Some((from, to)) = manual.span(calendar.start(), calendar.end()) else {
                continue;
            };
            let mut day = from;
            while day <= to {
                known.insert(day, manual.price);
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }
        known
    }
}

/// Constant overrides rank lowest, ranges next, single days highest
fn specificity(manual: &ManualPrice) -> u8 {
    match (manual.date, manual.from, manual.to) {
        (Some(_), _, _) => 2,
        (None, None, None) => 0,
        _ => 1,
    }
}

/// Carry each known value forward until the next one. Values dated before
/// the calendar seed the first days.
fn forward_fill(known: &BTreeMap<NaiveDate, Decimal>, calendar: &Calendar) -> Vec<Option<Decimal>> {
    let mut last = known
        .range(..calendar.start())
        .next_back()
        .map(|(_, price)| *price);

    calendar
        .days()
        .map(|day| {
            if let Some(price) = known.get(&day) {
                last = Some(*price);
            }
            last
        })
        .collect()
}
