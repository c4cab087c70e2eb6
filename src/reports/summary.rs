use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;
use crate::inventory::{self, AssetInventory};
use crate::ledger::{ActivityEvent, ActivityKind};
use crate::pricing::PriceAligner;
use crate::reports::metrics::{max_drawdown, DailyMetrics};

const DAYS_PER_YEAR: i64 = 365;

/// Per-asset conclusions at the analysis end date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetSummary {
    pub asset: String,
    pub last_price: Option<Decimal>,
    pub held: Decimal,
    pub owned_value: Option<Decimal>,
    /// Sum of bought volume x price, fees excluded
    pub value_at_buy: Decimal,
    pub value_of_sells: Decimal,
    pub cash_dividends: Decimal,
    pub buy_fees: Decimal,
    pub sell_fees: Decimal,
    /// Custody fees accrued pro rata up to the end date. Only `total_gain`
    /// deducts them; the daily `fees_paid` and `total_return` columns carry
    /// transaction fees alone.
    pub annual_fees: Decimal,
    pub total_gain: Option<Decimal>,
    pub relative_gain: Option<Decimal>,
    pub max_drawdown: Option<Decimal>,
}

/// Build the summary of one successfully reconstructed asset
pub fn summarize(
    events: &[ActivityEvent],
    inventory: &AssetInventory,
    metrics: &[DailyMetrics],
    aligner: &PriceAligner,
    end_date: NaiveDate,
) -> Result<AssetSummary, EngineError> {
    let mut summary = AssetSummary {
        asset: inventory.asset.clone(),
        last_price: metrics.iter().rev().find_map(|m| m.price),
        held: inventory.last().map(|s| s.held).unwrap_or_default(),
        owned_value: None,
        value_at_buy: Decimal::ZERO,
        value_of_sells: Decimal::ZERO,
        cash_dividends: Decimal::ZERO,
        buy_fees: Decimal::ZERO,
        sell_fees: Decimal::ZERO,
        annual_fees: Decimal::ZERO,
        total_gain: None,
        relative_gain: None,
        max_drawdown: max_drawdown(metrics),
    };

    for event in events {
        match event.kind {
            ActivityKind::Buy => {
                summary.value_at_buy += inventory::gross_amount(event, aligner)?;
                summary.buy_fees += event.fee;
                summary.annual_fees += accrued_annual_fee(event, end_date);
            }
            ActivityKind::Sell => {
                summary.value_of_sells += inventory::gross_amount(event, aligner)?;
                summary.sell_fees += event.fee;
            }
            ActivityKind::DividendCash => {
                summary.cash_dividends += inventory::gross_amount(event, aligner)?;
                summary.sell_fees += event.fee;
            }
            ActivityKind::DividendShares => {}
        }
    }

    // A closed position is worth nothing whether or not it is still priced
    summary.owned_value = if summary.held.is_zero() {
        Some(Decimal::ZERO)
    } else {
        metrics.last().and_then(|m| m.owned_value)
    };

    summary.total_gain = summary.owned_value.map(|owned| {
        owned + summary.cash_dividends + summary.value_of_sells
            - summary.value_at_buy
            - summary.buy_fees
            - summary.sell_fees
            - summary.annual_fees
    });
    summary.relative_gain = summary
        .total_gain
        .filter(|_| summary.value_at_buy > Decimal::ZERO)
        .map(|gain| gain / summary.value_at_buy);

    Ok(summary)
}

/// Annual custody fee of a buy, accrued pro rata from the buy date to `end_date`
fn accrued_annual_fee(event: &ActivityEvent, end_date: NaiveDate) -> Decimal {
    if event.annual_fee.is_zero() {
        return Decimal::ZERO;
    }
    let days = (end_date - event.date).num_days().max(0);
    event.annual_fee * Decimal::from(days) / Decimal::from(DAYS_PER_YEAR)
}
