use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;
pub mod runner;

#[derive(Parser)]
#[command(name = "folio")]
#[command(
    version,
    about = "Portfolio time series and benchmark indices from an activity ledger"
)]
#[command(
    long_about = "Replay a buy/sell/dividend ledger against historical prices and export daily per-asset and total valuations, returns, drawdowns and a rebased benchmark comparison as CSV tables for a dashboard."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Configuration file (default: ./folio.toml, then the user config dir)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the daily tables and write them to the output directory
    Run {
        /// Activity ledger (Excel or CSV)
        ledger: PathBuf,

        /// Price CSV (date,asset,price) instead of fetching from Yahoo Finance
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Benchmark CSV (date,value) instead of fetching the configured ticker
        #[arg(long)]
        benchmark: Option<PathBuf>,

        /// Analysis end date (YYYY-MM-DD); defaults to the config or today
        #[arg(long)]
        end: Option<String>,

        /// Abort when any asset fails instead of excluding it from Total
        #[arg(long)]
        strict: bool,

        /// Output directory for the CSV tables
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Never call the price API; use only files and manual prices
        #[arg(long)]
        offline: bool,
    },

    /// Fetch historical prices for the configured tickers into CSV files
    FetchPrices {
        /// Activity ledger, used for the date range
        ledger: PathBuf,

        /// Price file to write
        #[arg(short, long, default_value = "prices.csv")]
        output: PathBuf,

        /// Benchmark file to write when a benchmark is configured
        #[arg(long, default_value = "benchmark.csv")]
        benchmark_output: PathBuf,

        /// Last day to fetch (YYYY-MM-DD); defaults to the config or today
        #[arg(long)]
        end: Option<String>,
    },

    /// Validate a ledger and show its normalized events
    Ledger {
        /// Activity ledger (Excel or CSV)
        file: PathBuf,

        /// Only show events for this asset
        #[arg(short, long)]
        asset: Option<String>,
    },
}
