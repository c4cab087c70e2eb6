//! Folio - portfolio time series from an activity ledger
//!
//! Replays buys, sells and dividends against daily prices and produces the
//! per-asset and `Total` metric rows, the rebased price history and the
//! benchmark comparison that the CLI exports as CSV tables.

pub mod calendar;
pub mod config;
pub mod error;
pub mod export;
pub mod importers;
pub mod inventory;
pub mod ledger;
pub mod pipeline;
pub mod pricing;
pub mod reports;
pub mod utils;
