use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::calendar::Calendar;
use crate::error::EngineError;
use crate::reports::metrics::DailyMetrics;

const BASE: Decimal = Decimal::ONE_HUNDRED;
const INDEX_DP: u32 = 12;

/// One row of the rebased portfolio-vs-benchmark table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRow {
    pub date: NaiveDate,
    pub portfolio_index: Option<Decimal>,
    /// Time-weighted index: price performance net of contributions
    pub weighted_index: Option<Decimal>,
    pub benchmark_index: Option<Decimal>,
}

/// Rebase the `Total` owned value and the aligned benchmark to 100 on the
/// first day both are defined and positive.
///
/// `per_asset` supplies the rows the time-weighted index is chained from.
pub fn compare<'a>(
    calendar: &Calendar,
    total: &[DailyMetrics],
    per_asset: impl IntoIterator<Item = &'a [DailyMetrics]>,
    benchmark: &[Option<Decimal>],
) -> Result<Vec<BenchmarkRow>, EngineError> {
    let mut portfolio: Vec<Option<Decimal>> = vec![None; calendar.len()];
    for row in total {
        if let Some(offset) = calendar.index_of(row.date) {
            portfolio[offset] = row.owned_value;
        }
    }

    let positive = |v: &Option<Decimal>| v.filter(|v| *v > Decimal::ZERO);
    let base = (0..calendar.len())
        .find(|&i| {
            positive(&portfolio[i]).is_some()
                && positive(&benchmark.get(i).copied().flatten()).is_some()
        })
        .ok_or(EngineError::NoOverlap)?;

    let (Some(portfolio_base), Some(benchmark_base)) = (portfolio[base], benchmark[base]) else {
        return Err(EngineError::NoOverlap);
    };
    debug!(
        "Benchmark base day {} (portfolio {}, benchmark {})",
        calendar.day(base),
        portfolio_base,
        benchmark_base
    );

    let weighted = time_weighted_index(calendar, per_asset, base);

    Ok((base..calendar.len())
        .map(|i| BenchmarkRow {
            date: calendar.day(i),
            portfolio_index: portfolio[i].map(|v| rebase(v, portfolio_base)),
            weighted_index: weighted[i],
            benchmark_index: benchmark
                .get(i)
                .copied()
                .flatten()
                .map(|v| rebase(v, benchmark_base)),
        })
        .collect())
}

fn rebase(value: Decimal, base: Decimal) -> Decimal {
    (value / base * BASE).round_dp(INDEX_DP)
}

/// Price and owned value of one asset on one day
#[derive(Debug, Clone, Copy)]
struct Holding {
    price: Decimal,
    owned: Decimal,
}

/// Chain daily returns weighted by the previous day's owned values, starting
/// at 100 on `base`.
///
/// An asset contributes to day `t` when it has a price on both `t - 1` and
/// `t`; a day with nothing owned the day before has a zero return.
pub fn time_weighted_index<'a>(
    calendar: &Calendar,
    per_asset: impl IntoIterator<Item = &'a [DailyMetrics]>,
    base: usize,
) -> Vec<Option<Decimal>> {
    let holdings: Vec<Vec<Option<Holding>>> = per_asset
        .into_iter()
        .map(|rows| {
            let mut by_day = vec![None; calendar.len()];
            for row in rows {
                if let (Some(offset), Some(price), Some(owned)) =
                    (calendar.index_of(row.date), row.price, row.owned_value)
                {
                    by_day[offset] = Some(Holding { price, owned });
                }
            }
            by_day
        })
        .collect();

    let mut index = vec![None; calendar.len()];
    if base >= calendar.len() {
        return index;
    }

    let mut level = BASE;
    index[base] = Some(level);
    for t in base + 1..calendar.len() {
        let mut weight_total = Decimal::ZERO;
        let mut weighted_return = Decimal::ZERO;
        for asset in &holdings {
            let (Some(prev), Some(today)) = (asset[t - 1], asset[t]) else {
                continue;
            };
            if prev.price.is_zero() || prev.owned.is_zero() {
                continue;
            }
            weight_total += prev.owned;
            weighted_return += prev.owned * (today.price / prev.price - Decimal::ONE);
        }
        if !weight_total.is_zero() {
            level = (level * (Decimal::ONE + weighted_return / weight_total)).round_dp(INDEX_DP);
        }
        index[t] = Some(level);
    }

    index
}
