use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;

/// Cumulative state of one asset at the end of a day
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InventorySnapshot {
    pub held: Decimal,
    pub cost_basis: Decimal,
    pub cash_received: Decimal,
    pub fees_paid: Decimal,
}

/// Average-cost position for a single asset.
///
/// Every transition returns the new state or an error; the position never
/// goes negative and is never clamped.
#[derive(Debug, Clone, Default)]
pub struct AverageCostPosition {
    asset: String,
    state: InventorySnapshot,
}

impl AverageCostPosition {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            state: InventorySnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> InventorySnapshot {
        self.state
    }

    pub fn held(&self) -> Decimal {
        self.state.held
    }

    pub fn average_cost(&self) -> Decimal {
        if self.state.held > Decimal::ZERO {
            self.state.cost_basis / self.state.held
        } else {
            Decimal::ZERO
        }
    }

    /// Shares bought at `price` each; the fee is capitalized into cost basis
    pub fn buy(&mut self, volume: Decimal, price: Decimal, fee: Decimal) {
        self.state.held += volume;
        self.state.cost_basis += volume * price + fee;
        self.state.fees_paid += fee;
    }

    /// Shares received at zero incremental cost
    pub fn dividend_shares(&mut self, volume: Decimal) {
        self.state.held += volume;
    }

    /// Remove `volume` shares at average cost and book the proceeds
    pub fn sell(
        &mut self,
        date: NaiveDate,
        volume: Decimal,
        proceeds: Decimal,
        fee: Decimal,
    ) -> Result<Decimal, EngineError> {
        if volume > self.state.held {
            return Err(EngineError::Oversell {
                asset: self.asset.clone(),
                date,
                requested: volume,
                held: self.state.held,
            });
        }

        let removed = if volume == self.state.held {
            self.state.cost_basis
        } else if volume > Decimal::ZERO {
            self.state.cost_basis * volume / self.state.held
        } else {
            Decimal::ZERO
        };

        self.state.held -= volume;
        self.state.cost_basis -= removed;
        if self.state.held == Decimal::ZERO {
            self.state.cost_basis = Decimal::ZERO;
        }
        self.state.cash_received += proceeds - fee;
        self.state.fees_paid += fee;

        Ok(removed)
    }

    pub fn dividend_cash(&mut self, amount: Decimal, fee: Decimal) {
        self.state.cash_received += amount - fee;
        self.state.fees_paid += fee;
    }
}
