use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::calendar::Calendar;
use crate::inventory::AssetInventory;
use crate::pricing::AssetPriceSeries;

/// Asset label of the aggregate rows
pub const TOTAL_LABEL: &str = "Total";

/// One row of the daily metrics table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub asset: String,
    pub price: Option<Decimal>,
    /// Held volume; `None` on `Total` rows
    pub held: Option<Decimal>,
    pub cost_basis: Decimal,
    pub cash_received: Decimal,
    pub fees_paid: Decimal,
    pub owned_value: Option<Decimal>,
    pub total_return: Option<Decimal>,
    pub unrealized_return: Option<Decimal>,
    pub drawdown: Option<Decimal>,
    pub weighted_drawdown: Option<Decimal>,
    pub relative_total_return: Option<Decimal>,
}

impl DailyMetrics {
    pub fn is_total(&self) -> bool {
        self.asset == TOTAL_LABEL
    }
}

/// Running peaks for drawdown
#[derive(Debug, Default)]
struct DrawdownTracker {
    peak_value: Decimal,
    peak_held: Decimal,
}

impl DrawdownTracker {
    fn observe_held(&mut self, held: Decimal) {
        self.peak_held = self.peak_held.max(held);
    }

    fn observe_value(&mut self, owned: Decimal) -> Decimal {
        self.peak_value = self.peak_value.max(owned);
        if owned.is_zero() || self.peak_value.is_zero() {
            return Decimal::ZERO;
        }
        ((self.peak_value - owned) / self.peak_value).clamp(Decimal::ZERO, Decimal::ONE)
    }

    fn weight(&self, drawdown: Decimal, held: Decimal) -> Decimal {
        if self.peak_held.is_zero() {
            Decimal::ZERO
        } else {
            drawdown * held / self.peak_held
        }
    }
}

/// Return metrics shared by asset and `Total` rows
struct Returns {
    total: Decimal,
    unrealized: Decimal,
    relative: Option<Decimal>,
}

fn returns(owned: Decimal, cost_basis: Decimal, cash_received: Decimal) -> Returns {
    let total = cash_received + owned - cost_basis;
    Returns {
        total,
        unrealized: owned - cost_basis,
        relative: (cost_basis > Decimal::ZERO).then(|| total / cost_basis),
    }
}

/// Daily metrics for one asset, from its first event through the calendar end.
///
/// Days without a defined price keep their cash-flow columns and leave every
/// value-derived column undefined.
pub fn asset_metrics(
    inventory: &AssetInventory,
    prices: Option<&AssetPriceSeries>,
    calendar: &Calendar,
) -> Vec<DailyMetrics> {
    let mut tracker = DrawdownTracker::default();

    inventory
        .snapshots
        .iter()
        .enumerate()
        .map(|(i, snap)| {
            let offset = inventory.start + i;
            let price = prices.and_then(|series| series.at(offset));
            tracker.observe_held(snap.held);

            let mut row = DailyMetrics {
                date: calendar.day(offset),
                asset: inventory.asset.clone(),
                price,
                held: Some(snap.held),
                cost_basis: snap.cost_basis,
                cash_received: snap.cash_received,
                fees_paid: snap.fees_paid,
                owned_value: None,
                total_return: None,
                unrealized_return: None,
                drawdown: None,
                weighted_drawdown: None,
                relative_total_return: None,
            };

            if let Some(price) = price {
                let owned = snap.held * price;
                let drawdown = tracker.observe_value(owned);
                let r = returns(owned, snap.cost_basis, snap.cash_received);
                row.owned_value = Some(owned);
                row.total_return = Some(r.total);
                row.unrealized_return = Some(r.unrealized);
                row.relative_total_return = r.relative;
                row.drawdown = Some(drawdown);
                row.weighted_drawdown = Some(tracker.weight(drawdown, snap.held));
            }
            row
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct DaySums {
    owned: Decimal,
    cost_basis: Decimal,
    cash_received: Decimal,
    fees_paid: Decimal,
}

/// Fold per-asset rows into `Total` rows.
///
/// Only rows with a defined owned value contribute; days where no asset
/// contributes get no `Total` row.
pub fn aggregate<'a>(
    per_asset: impl IntoIterator<Item = &'a [DailyMetrics]>,
    calendar: &Calendar,
) -> Vec<DailyMetrics> {
    let mut sums: Vec<Option<DaySums>> = vec![None; calendar.len()];

    for rows in per_asset {
        for row in rows {
            let (Some(owned), Some(offset)) = (row.owned_value, calendar.index_of(row.date)) else {
                continue;
            };
            let day = sums[offset].get_or_insert_with(DaySums::default);
            day.owned += owned;
            day.cost_basis += row.cost_basis;
            day.cash_received += row.cash_received;
            day.fees_paid += row.fees_paid;
        }
    }

    let mut tracker = DrawdownTracker::default();
    sums.into_iter()
        .enumerate()
        .filter_map(|(offset, day)| {
            let day = day?;
            let drawdown = tracker.observe_value(day.owned);
            let r = returns(day.owned, day.cost_basis, day.cash_received);
            Some(DailyMetrics {
                date: calendar.day(offset),
                asset: TOTAL_LABEL.to_string(),
                price: None,
                held: None,
                cost_basis: day.cost_basis,
                cash_received: day.cash_received,
                fees_paid: day.fees_paid,
                owned_value: Some(day.owned),
                total_return: Some(r.total),
                unrealized_return: Some(r.unrealized),
                drawdown: Some(drawdown),
                weighted_drawdown: Some(drawdown),
                relative_total_return: r.relative,
            })
        })
        .collect()
}

/// Largest drawdown over the rows, `None` when no row has one
pub fn max_drawdown(rows: &[DailyMetrics]) -> Option<Decimal> {
    rows.iter().filter_map(|r| r.drawdown).max()
}
