//! Output formatting module for CLI display
//!
//! Keeps terminal and JSON presentation apart from the computation.

use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use folio::ledger::ActivityEvent;
use folio::pipeline::PortfolioRun;
use folio::reports::AssetSummary;
use folio::utils::{
    format_amount, format_optional_amount, format_optional_percent, format_volume,
};

fn colored_gain(text: String, value: Option<Decimal>) -> String {
    match value {
        Some(v) if v >= Decimal::ZERO => text.green().to_string(),
        Some(_) => text.red().to_string(),
        None => text,
    }
}

/// Per-asset summary table followed by the portfolio totals
pub fn format_run_table(run: &PortfolioRun, written: &[PathBuf]) -> String {
    let mut output = String::new();

    let Some(calendar) = &run.calendar else {
        return format_empty_ledger();
    };

    output.push_str(&format!(
        "\n{} Portfolio {} to {}\n\n",
        "📊".cyan().bold(),
        calendar.start(),
        calendar.end()
    ));

    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Held")]
        held: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Bought")]
        bought: String,
        #[tabled(rename = "Sold")]
        sold: String,
        #[tabled(rename = "Dividends")]
        dividends: String,
        #[tabled(rename = "Fees")]
        fees: String,
        #[tabled(rename = "Gain")]
        gain: String,
        #[tabled(rename = "Return %")]
        return_pct: String,
        #[tabled(rename = "Max DD")]
        max_drawdown: String,
    }

    let rows: Vec<SummaryRow> = run
        .summaries
        .iter()
        .map(|s: &AssetSummary| SummaryRow {
            asset: s.asset.clone(),
            held: format_volume(s.held),
            price: format_optional_amount(s.last_price),
            value: format_optional_amount(s.owned_value),
            bought: format_amount(s.value_at_buy),
            sold: format_amount(s.value_of_sells),
            dividends: format_amount(s.cash_dividends),
            fees: format_amount(s.buy_fees + s.sell_fees + s.annual_fees),
            gain: colored_gain(format_optional_amount(s.total_gain), s.total_gain),
            return_pct: colored_gain(format_optional_percent(s.relative_gain), s.relative_gain),
            max_drawdown: format_optional_percent(s.max_drawdown),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    // Right-align everything but the asset name
    table.modify(Columns::new(1..), Alignment::right());
    output.push_str(&table.to_string());

    output.push_str(&format!("\n\n{} Total", "━".repeat(80).bright_black()));
    match run.latest_total() {
        Some(total) => {
            output.push_str(&format!(
                "\n{:<20} {}",
                "Value:".bold(),
                format_optional_amount(total.owned_value)
            ));
            output.push_str(&format!(
                "\n{:<20} {}",
                "Cost Basis:".bold(),
                format_amount(total.cost_basis)
            ));
            output.push_str(&format!(
                "\n{:<20} {}",
                "Total Return:".bold(),
                colored_gain(format_optional_amount(total.total_return), total.total_return)
            ));
            output.push_str(&format!(
                "\n{:<20} {}",
                "Relative Return:".bold(),
                colored_gain(
                    format_optional_percent(total.relative_total_return),
                    total.relative_total_return
                )
            ));
            output.push_str(&format!(
                "\n{:<20} {}",
                "Max Drawdown:".bold(),
                format_optional_percent(run.max_total_drawdown())
            ));
        }
        None => output.push_str("\nNo priced holdings in the analysis window"),
    }

    if let Some(last) = run.benchmark.last() {
        output.push_str(&format!(
            "\n{:<20} portfolio {} / benchmark {}",
            "Index:".bold(),
            format_optional_amount(last.portfolio_index),
            format_optional_amount(last.benchmark_index)
        ));
    }
    output.push('\n');

    output.push_str(&format_diagnostics(run));

    if !written.is_empty() {
        output.push_str(&format!("\n{} Wrote:\n", "✓".green().bold()));
        for path in written {
            output.push_str(&format!("  {}\n", path.display()));
        }
    }

    output
}

/// Failed assets, unpriced assets and benchmark problems
pub fn format_diagnostics(run: &PortfolioRun) -> String {
    let mut output = String::new();

    for failure in &run.failures {
        output.push_str(&format!(
            "\n{} {} excluded from Total: {}",
            "✗".red().bold(),
            failure.asset,
            failure.error
        ));
    }
    for warning in &run.warnings {
        output.push_str(&format!(
            "\n{} {} has no price data, its values are undefined",
            "⚠".yellow().bold(),
            warning.asset
        ));
    }
    if let Some(error) = &run.benchmark_error {
        output.push_str(&format!("\n{} Benchmark skipped: {}", "⚠".yellow().bold(), error));
    }
    if !output.is_empty() {
        output.push('\n');
    }
    output
}

/// Machine-readable run result: summaries, latest total and diagnostics
pub fn format_run_json(run: &PortfolioRun, written: &[PathBuf]) -> String {
    #[derive(Serialize)]
    struct JsonTotal {
        date: String,
        owned_value: Option<Decimal>,
        cost_basis: Decimal,
        total_return: Option<Decimal>,
        relative_total_return: Option<Decimal>,
        max_drawdown: Option<Decimal>,
    }

    #[derive(Serialize)]
    struct JsonFailure {
        asset: String,
        error: String,
    }

    #[derive(Serialize)]
    struct JsonRun<'a> {
        start: Option<String>,
        end: Option<String>,
        assets: &'a [AssetSummary],
        total: Option<JsonTotal>,
        failures: Vec<JsonFailure>,
        unpriced: Vec<&'a str>,
        benchmark_error: Option<String>,
        files: Vec<String>,
    }

    let report = JsonRun {
        start: run.calendar.as_ref().map(|c| c.start().to_string()),
        end: run.calendar.as_ref().map(|c| c.end().to_string()),
        assets: &run.summaries,
        total: run.latest_total().map(|t| JsonTotal {
            date: t.date.to_string(),
            owned_value: t.owned_value,
            cost_basis: t.cost_basis,
            total_return: t.total_return,
            relative_total_return: t.relative_total_return,
            max_drawdown: run.max_total_drawdown(),
        }),
        failures: run
            .failures
            .iter()
            .map(|f| JsonFailure {
                asset: f.asset.clone(),
                error: f.error.to_string(),
            })
            .collect(),
        unpriced: run.warnings.iter().map(|w| w.asset.as_str()).collect(),
        benchmark_error: run.benchmark_error.as_ref().map(|e| e.to_string()),
        files: written.iter().map(|p| p.display().to_string()).collect(),
    };

    serde_json::to_string_pretty(&report)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Normalized ledger events, each asset in date order
pub fn format_ledger_table(events: &[&ActivityEvent]) -> String {
    #[derive(Tabled)]
    struct EventRow {
        #[tabled(rename = "Row")]
        row: usize,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Volume")]
        volume: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Fee")]
        fee: String,
        #[tabled(rename = "Annual Fee")]
        annual_fee: String,
    }

    if events.is_empty() {
        return format_empty_ledger();
    }

    let rows: Vec<EventRow> = events
        .iter()
        .map(|e| EventRow {
            row: e.row,
            date: e.date.to_string(),
            asset: e.asset.clone(),
            kind: e.kind.to_string(),
            volume: format_volume(e.volume),
            value: format_optional_amount(e.value),
            fee: format_amount(e.fee),
            annual_fee: format_amount(e.annual_fee),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(4..), Alignment::right());

    format!(
        "\n{}\n\n{} {} events\n",
        table,
        "✓".green().bold(),
        events.len()
    )
}

pub fn format_ledger_json(events: &[&ActivityEvent]) -> String {
    serde_json::to_string_pretty(events)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Message for a ledger without any events
pub fn format_empty_ledger() -> String {
    format!(
        "{} No activities found\nCheck the ledger columns with: {} ledger <file>\n",
        "ℹ".blue().bold(),
        "folio".bold()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use folio::ledger::ActivityKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_run_message() {
        colored::control::set_override(false);
        let msg = format_run_table(&PortfolioRun::default(), &[]);
        assert!(msg.contains("No activities found"));
    }

    #[test]
    fn test_ledger_table_lists_events() {
        colored::control::set_override(false);
        let event = ActivityEvent {
            asset: "ETH".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            kind: ActivityKind::Buy,
            volume: dec!(0.5),
            value: Some(dec!(2000)),
            fee: dec!(1.5),
            annual_fee: Decimal::ZERO,
            row: 2,
        };

        let table = format_ledger_table(&[&event]);
        assert!(table.contains("ETH"));
        assert!(table.contains("2,000.00"));
        assert!(table.contains("1 events"));

        let json = format_ledger_json(&[&event]);
        assert!(json.contains("\"asset\": \"ETH\""));
    }

    #[test]
    fn test_ledger_table_keeps_same_day_rows_in_ledger_order() {
        colored::control::set_override(false);
        let event = |row: usize, kind: ActivityKind| ActivityEvent {
            asset: "ETH".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            kind,
            volume: dec!(1),
            value: Some(dec!(10)),
            fee: Decimal::ZERO,
            annual_fee: Decimal::ZERO,
            row,
        };
        let sell = event(2, ActivityKind::Sell);
        let buy = event(3, ActivityKind::Buy);

        // Replay would apply the buy first; the listing does not reorder
        let table = format_ledger_table(&[&sell, &buy]);
        let sell_at = table.find("SELL").unwrap();
        let buy_at = table.find("BUY").unwrap();
        assert!(sell_at < buy_at);
    }
}
