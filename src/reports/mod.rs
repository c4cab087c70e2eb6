// Reports module - daily metrics, benchmark comparison and per-asset summaries

pub mod benchmark;
pub mod metrics;
pub mod summary;

pub use benchmark::{compare, time_weighted_index, BenchmarkRow};
pub use metrics::{aggregate, asset_metrics, max_drawdown, DailyMetrics, TOTAL_LABEL};
pub use summary::{summarize, AssetSummary};
