//! Inventory reconstruction: replays one asset's ledger over the calendar.
//!
//! Each day's events are applied in the fixed order buy, share dividend,
//! sell, cash dividend, and the resulting snapshot is recorded. Days without
//! events repeat the previous snapshot.

pub mod position;

use itertools::Itertools;
use rust_decimal::Decimal;
use tracing::debug;

pub use position::{AverageCostPosition, InventorySnapshot};

use crate::calendar::Calendar;
use crate::error::EngineError;
use crate::ledger::{ActivityEvent, ActivityKind};
use crate::pricing::PriceAligner;

/// Daily snapshots of one asset from its first event through the calendar end
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInventory {
    pub asset: String,
    /// Calendar offset of `snapshots[0]`
    pub start: usize,
    pub snapshots: Vec<InventorySnapshot>,
}

impl AssetInventory {
    /// Snapshot at a calendar offset, `None` before the first event
    pub fn at(&self, offset: usize) -> Option<&InventorySnapshot> {
        offset
            .checked_sub(self.start)
            .and_then(|i| self.snapshots.get(i))
    }

    pub fn last(&self) -> Option<&InventorySnapshot> {
        self.snapshots.last()
    }
}

/// Replay `events` (one asset, sorted by date) over `calendar`.
///
/// Buys and sells without a value take the manual override price of their
/// day from `aligner`; without one the asset fails with `MissingPrice`.
pub fn reconstruct(
    asset: &str,
    events: &[ActivityEvent],
    calendar: &Calendar,
    aligner: &PriceAligner,
) -> Result<AssetInventory, EngineError> {
    let Some(first) = events.first() else {
        return Ok(AssetInventory {
            asset: asset.to_string(),
            start: calendar.len(),
            snapshots: Vec::new(),
        });
    };
    let start = calendar.index_of(first.date).unwrap_or(0);

    // Same-day events in replay order; the sort is stable so ledger order
    // survives within a kind
    let mut ordered: Vec<&ActivityEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.date, e.kind.replay_rank()));
    let by_day = ordered.into_iter().chunk_by(|e| e.date);
    let mut days = by_day.into_iter().peekable();

    let mut position = AverageCostPosition::new(asset);
    let mut snapshots = Vec::with_capacity(calendar.len() - start);

    for offset in start..calendar.len() {
        let today = calendar.day(offset);
        if let Some((_, day_events)) = days.next_if(|(date, _)| *date == today) {
            for event in day_events {
                apply(&mut position, event, aligner)?;
            }
        }
        snapshots.push(position.snapshot());
    }

    debug!(
        "{}: reconstructed {} days, final held {}",
        asset,
        snapshots.len(),
        position.held()
    );

    Ok(AssetInventory {
        asset: asset.to_string(),
        start,
        snapshots,
    })
}

fn apply(
    position: &mut AverageCostPosition,
    event: &ActivityEvent,
    aligner: &PriceAligner,
) -> Result<(), EngineError> {
    match event.kind {
        ActivityKind::Buy => {
            position.buy(event.volume, buy_price(event, aligner)?, event.fee);
        }
        ActivityKind::DividendShares => position.dividend_shares(event.volume),
        ActivityKind::Sell => {
            let proceeds = gross_amount(event, aligner)?;
            position.sell(event.date, event.volume, proceeds, event.fee)?;
        }
        ActivityKind::DividendCash => {
            position.dividend_cash(gross_amount(event, aligner)?, event.fee);
        }
    }
    Ok(())
}

fn buy_price(event: &ActivityEvent, aligner: &PriceAligner) -> Result<Decimal, EngineError> {
    match event.value {
        Some(price) => Ok(price),
        None => override_or_missing(event, aligner),
    }
}

/// Money moved by an event before fees: bought volume x price, sell
/// proceeds, or the cash dividend. Share dividends move none.
pub fn gross_amount(event: &ActivityEvent, aligner: &PriceAligner) -> Result<Decimal, EngineError> {
    match event.kind {
        ActivityKind::Buy => Ok(event.volume * buy_price(event, aligner)?),
        ActivityKind::Sell => match event.value {
            Some(proceeds) => Ok(proceeds),
            None => Ok(event.volume * override_or_missing(event, aligner)?),
        },
        // Older ledgers keep the cash amount in the volume column
        ActivityKind::DividendCash => Ok(event.value.unwrap_or(event.volume)),
        ActivityKind::DividendShares => Ok(Decimal::ZERO),
    }
}

fn override_or_missing(event: &ActivityEvent, aligner: &PriceAligner) -> Result<Decimal, EngineError> {
    aligner
        .override_price(&event.asset, event.date)
        .ok_or_else(|| EngineError::MissingPrice {
            asset: event.asset.clone(),
            date: event.date,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, ManualPrice};
    use crate::ledger::{LedgerNormalizer, RawActivity, RawDate};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(n: usize, d: u32, kind: &str, volume: Decimal) -> RawActivity {
        RawActivity::new(n, "X", RawDate::Day(day(d)), kind, Some(volume))
    }

    fn replay(
        config: &AnalysisConfig,
        rows: Vec<RawActivity>,
    ) -> Result<(AssetInventory, Calendar), EngineError> {
        let ledger = LedgerNormalizer::new(config).normalize(&rows)?;
        let aligner = PriceAligner::new(config);
        let calendar = aligner.calendar_for(&ledger).unwrap();
        reconstruct("X", ledger.events("X"), &calendar, &aligner).map(|inv| (inv, calendar))
    }

    #[test]
    fn test_buy_then_partial_sell() {
        let config = AnalysisConfig::new(day(7));
        let (inv, calendar) = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(10)).with_value(dec!(100)).with_fee(dec!(1)),
                row(3, 5, "S", dec!(5)).with_value(dec!(600)).with_fee(dec!(2)),
            ],
        )
        .unwrap();

        assert_eq!(inv.snapshots.len(), 7);
        let day1 = inv.at(0).unwrap();
        assert_eq!(day1.held, dec!(10));
        assert_eq!(day1.cost_basis, dec!(1001));

        // Carried forward unchanged until the sell
        assert_eq!(inv.at(3), inv.at(0));

        let day5 = inv.at(4).unwrap();
        assert_eq!(day5.held, dec!(5));
        assert_eq!(day5.cost_basis, dec!(500.5));
        assert_eq!(day5.cash_received, dec!(598));
        assert_eq!(day5.fees_paid, dec!(3));
        assert_eq!(calendar.day(inv.start + inv.snapshots.len() - 1), day(7));
    }

    #[test]
    fn test_same_day_buy_is_applied_before_sell() {
        let config = AnalysisConfig::new(day(2));
        // Sell listed first in the ledger, but must see the same-day buy
        let (inv, _) = replay(
            &config,
            vec![
                row(2, 1, "S", dec!(5)).with_value(dec!(50)),
                row(3, 1, "B", dec!(5)).with_value(dec!(10)),
            ],
        )
        .unwrap();

        let snap = inv.at(0).unwrap();
        assert_eq!(snap.held, Decimal::ZERO);
        assert_eq!(snap.cost_basis, Decimal::ZERO);
        assert_eq!(snap.cash_received, dec!(50));
    }

    #[test]
    fn test_share_dividend_counts_before_same_day_sell() {
        let config = AnalysisConfig::new(day(3));
        let (inv, _) = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(10)).with_value(dec!(10)),
                row(3, 2, "S", dec!(12)).with_value(dec!(120)),
                row(4, 2, "SD", dec!(2)),
            ],
        )
        .unwrap();

        assert_eq!(inv.at(1).unwrap().held, Decimal::ZERO);
        assert_eq!(inv.at(1).unwrap().cost_basis, Decimal::ZERO);
    }

    #[test]
    fn test_oversell_fails() {
        let config = AnalysisConfig::new(day(5));
        let result = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(10)).with_value(dec!(100)),
                row(3, 3, "S", dec!(11)).with_value(dec!(1000)),
            ],
        );
        assert!(matches!(
            result,
            Err(EngineError::Oversell { requested, held, .. })
                if requested == dec!(11) && held == dec!(10)
        ));
    }

    #[test]
    fn test_buy_without_value_uses_override() {
        let config = AnalysisConfig::new(day(3))
            .with_manual_prices(vec![ManualPrice::constant("X", dec!(11.19))]);
        let (inv, _) = replay(&config, vec![row(2, 1, "B", dec!(2))]).unwrap();
        assert_eq!(inv.at(0).unwrap().cost_basis, dec!(22.38));
    }

    #[test]
    fn test_buy_without_value_or_override_is_missing_price() {
        let config = AnalysisConfig::new(day(3));
        let result = replay(&config, vec![row(2, 2, "B", dec!(2))]);
        assert_eq!(
            result.unwrap_err(),
            EngineError::MissingPrice {
                asset: "X".to_string(),
                date: day(2)
            }
        );
    }

    #[test]
    fn test_sell_without_value_uses_override_of_that_day() {
        let config = AnalysisConfig::new(day(3))
            .with_manual_prices(vec![ManualPrice::on("X", day(2), dec!(12))]);
        let (inv, _) = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(10)).with_value(dec!(10)),
                row(3, 2, "S", dec!(4)),
            ],
        )
        .unwrap();

        let snap = inv.at(1).unwrap();
        assert_eq!(snap.held, dec!(6));
        assert_eq!(snap.cash_received, dec!(48));
        assert_eq!(snap.cost_basis, dec!(60));
        assert_eq!(inv.at(2), inv.at(1));
    }

    #[test]
    fn test_sell_without_value_or_override_is_missing_price() {
        // An override on another day does not price the sell
        let config = AnalysisConfig::new(day(3))
            .with_manual_prices(vec![ManualPrice::on("X", day(1), dec!(12))]);
        let result = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(10)).with_value(dec!(10)),
                row(3, 2, "S", dec!(4)),
            ],
        );
        assert_eq!(
            result.unwrap_err(),
            EngineError::MissingPrice {
                asset: "X".to_string(),
                date: day(2)
            }
        );
    }

    #[test]
    fn test_cash_dividend_amount_falls_back_to_volume() {
        let config = AnalysisConfig::new(day(3));
        let (inv, _) = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(1)).with_value(dec!(10)),
                row(3, 2, "CD", dec!(4.2)),
            ],
        )
        .unwrap();
        let snap = inv.at(1).unwrap();
        assert_eq!(snap.cash_received, dec!(4.2));
        assert_eq!(snap.held, dec!(1));
    }

    #[test]
    fn test_held_never_negative_and_basis_zero_when_flat() {
        let config = AnalysisConfig::new(day(10));
        let (inv, _) = replay(
            &config,
            vec![
                row(2, 1, "B", dec!(3)).with_value(dec!(33.33)).with_fee(dec!(0.7)),
                row(3, 2, "SD", dec!(1)),
                row(4, 4, "S", dec!(2)).with_value(dec!(70)),
                row(5, 6, "S", dec!(2)).with_value(dec!(71)),
                row(6, 8, "B", dec!(1)).with_value(dec!(30)),
            ],
        )
        .unwrap();

        for snap in &inv.snapshots {
            assert!(snap.held >= Decimal::ZERO);
            if snap.held == Decimal::ZERO {
                assert_eq!(snap.cost_basis, Decimal::ZERO);
            } else {
                assert!(snap.cost_basis >= Decimal::ZERO);
            }
        }
        assert_eq!(inv.at(5).unwrap().cost_basis, Decimal::ZERO);
        assert_eq!(inv.at(9).unwrap().cost_basis, dec!(30));
    }
}
