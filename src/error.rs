//! Error handling for folio
//!
//! The computation core reports typed `EngineError`s so callers can tell a
//! broken ledger (fatal for the run) from a per-asset failure (fatal for that
//! asset only). Loader, fetcher and CLI glue use anyhow for context chaining.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Core error taxonomy of the ledger/price engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid ledger row; aborts the whole run
    #[error("malformed event in row {row}: {reason}")]
    MalformedEvent { row: usize, reason: String },

    /// A buy or sell has no value and no manual override price for its day
    #[error("{asset}: no price for {date} (row has no value and no manual override exists)")]
    MissingPrice { asset: String, date: NaiveDate },

    /// Selling more than the position currently holds
    #[error("{asset}: selling {requested} units on {date} but only {held} held")]
    Oversell {
        asset: String,
        date: NaiveDate,
        requested: Decimal,
        held: Decimal,
    },

    /// Portfolio and benchmark share no valid day
    #[error("portfolio and benchmark series share no common valid date")]
    NoOverlap,

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Asset the error belongs to, when it is a per-asset failure
    pub fn asset(&self) -> Option<&str> {
        match self {
            EngineError::MissingPrice { asset, .. } | EngineError::Oversell { asset, .. } => {
                Some(asset)
            }
            _ => None,
        }
    }
}

/// Result type alias for application glue (loaders, fetcher, CLI)
pub type Result<T> = anyhow::Result<T>;
