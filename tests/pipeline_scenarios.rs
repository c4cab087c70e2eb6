//! Scenario tests for the ledger -> inventory -> metrics -> benchmark pipeline
//!
//! These run the public pipeline on small in-memory ledgers:
//! - average-cost buy/sell bookkeeping
//! - unpriced assets keep their cash flows
//! - benchmark rebasing on the first common day
//! - `Total` consistency with the per-asset rows

use chrono::NaiveDate;
use folio::config::{AnalysisConfig, ManualPrice};
use folio::error::EngineError;
use folio::ledger::{LedgerNormalizer, RawActivity, RawDate};
use folio::pipeline::{BenchmarkInput, Pipeline, PipelineInput, PortfolioRun};
use folio::pricing::{BenchmarkPoint, FetchReport, HistoricalClose, PriceObservation};
use folio::reports::TOTAL_LABEL;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn activity(row: usize, asset: &str, d: u32, kind: &str, volume: Decimal) -> RawActivity {
    RawActivity::new(row, asset, RawDate::Day(day(d)), kind, Some(volume))
}

fn price(asset: &str, d: u32, p: Decimal) -> PriceObservation {
    PriceObservation {
        date: day(d),
        asset: asset.to_string(),
        price: p,
    }
}

/// X: buy 10 @ 100 (fee 1) on day 1, sell 5 for 600 (fee 2) on day 5.
/// Y: bought on day 2, never priced, pays a cash dividend on day 4.
fn two_asset_input() -> PipelineInput {
    PipelineInput {
        activities: vec![
            activity(2, "X", 1, "B", dec!(10))
                .with_value(dec!(100))
                .with_fee(dec!(1)),
            activity(3, "Y", 2, "B", dec!(2)).with_value(dec!(50)),
            activity(4, "Y", 4, "CD", dec!(0)).with_value(dec!(7)),
            activity(5, "X", 5, "S", dec!(5))
                .with_value(dec!(600))
                .with_fee(dec!(2)),
        ],
        prices: vec![price("X", 1, dec!(100)), price("X", 5, dec!(120))],
        benchmark: Some(BenchmarkInput {
            label: "MSCI World".to_string(),
            points: vec![
                BenchmarkPoint {
                    date: day(3),
                    value: dec!(50),
                },
                BenchmarkPoint {
                    date: day(6),
                    value: dec!(55),
                },
            ],
        }),
    }
}

fn run(input: &PipelineInput) -> PortfolioRun {
    Pipeline::new(AnalysisConfig::new(day(6)))
        .run(input)
        .expect("pipeline run failed")
}

#[test]
fn buy_then_partial_sell_uses_average_cost() {
    let run = run(&two_asset_input());
    let x: Vec<_> = run.rows_for("X").collect();
    assert_eq!(x.len(), 6);

    let first = x[0];
    assert_eq!(first.date, day(1));
    assert_eq!(first.held, Some(dec!(10)));
    assert_eq!(first.cost_basis, dec!(1001));
    assert_eq!(first.owned_value, Some(dec!(1000)));
    assert_eq!(first.unrealized_return, Some(dec!(-1)));

    let sell_day = x[4];
    assert_eq!(sell_day.date, day(5));
    assert_eq!(sell_day.held, Some(dec!(5)));
    assert_eq!(sell_day.cost_basis, dec!(500.5));
    assert_eq!(sell_day.cash_received, dec!(598));
    assert_eq!(sell_day.fees_paid, dec!(3));
    assert_eq!(sell_day.owned_value, Some(dec!(600)));
    assert_eq!(sell_day.total_return, Some(dec!(697.5)));

    // Price is carried forward past the last observation
    assert_eq!(x[5].price, Some(dec!(120)));
}

#[test]
fn unpriced_asset_keeps_cash_flows_but_no_values() {
    let run = run(&two_asset_input());

    assert_eq!(run.warnings.len(), 1);
    assert_eq!(run.warnings[0].asset, "Y");
    assert!(run.failures.is_empty());

    let y: Vec<_> = run.rows_for("Y").collect();
    assert_eq!(y.first().map(|r| r.date), Some(day(2)));
    assert!(y.iter().all(|r| r.owned_value.is_none() && r.drawdown.is_none()));

    let after_dividend = y.iter().find(|r| r.date == day(4)).unwrap();
    assert_eq!(after_dividend.cash_received, dec!(7));
    assert_eq!(after_dividend.held, Some(dec!(2)));
}

#[test]
fn total_sums_only_valued_assets() {
    let run = run(&two_asset_input());

    let totals: Vec<_> = run.total_rows().collect();
    assert_eq!(totals.len(), 6);
    for total in &totals {
        assert_eq!(total.asset, TOTAL_LABEL);
        let x = run.rows_for("X").find(|r| r.date == total.date).unwrap();
        assert_eq!(total.owned_value, x.owned_value);
        assert_eq!(total.cost_basis, x.cost_basis);
        assert_eq!(total.held, None);
        assert_eq!(total.weighted_drawdown, total.drawdown);
    }

    let latest = run.latest_total().unwrap();
    assert_eq!(latest.date, day(6));
    assert_eq!(latest.owned_value, Some(dec!(600)));
}

#[test]
fn benchmark_rebases_on_first_common_day() {
    let run = run(&two_asset_input());

    assert!(run.benchmark_error.is_none());
    assert_eq!(run.benchmark.len(), 4);

    let base = &run.benchmark[0];
    assert_eq!(base.date, day(3));
    assert_eq!(base.portfolio_index, Some(dec!(100)));
    assert_eq!(base.benchmark_index, Some(dec!(100)));
    assert_eq!(base.weighted_index, Some(dec!(100)));

    let last = run.benchmark.last().unwrap();
    assert_eq!(last.date, day(6));
    assert_eq!(last.benchmark_index, Some(dec!(110)));
    assert_eq!(last.portfolio_index, Some(dec!(60)));
    // The sale does not show up as a loss in the time-weighted index
    assert_eq!(last.weighted_index, Some(dec!(120)));

    let bench_history: Vec<_> = run
        .price_history
        .iter()
        .filter(|r| r.asset == "MSCI World")
        .collect();
    assert_eq!(bench_history.len(), 4);
    assert_eq!(bench_history[3].price_index, dec!(110));
}

#[test]
fn drawdown_tracks_peak_owned_value() {
    let input = PipelineInput {
        activities: vec![activity(2, "X", 1, "B", dec!(1)).with_value(dec!(100))],
        prices: vec![
            price("X", 1, dec!(100)),
            price("X", 2, dec!(80)),
            price("X", 3, dec!(120)),
            price("X", 4, dec!(90)),
        ],
        benchmark: None,
    };
    let run = Pipeline::new(AnalysisConfig::new(day(4))).run(&input).unwrap();

    let drawdowns: Vec<_> = run.rows_for("X").map(|r| r.drawdown).collect();
    assert_eq!(
        drawdowns,
        vec![Some(dec!(0)), Some(dec!(0.2)), Some(dec!(0)), Some(dec!(0.25))]
    );
    assert_eq!(run.max_total_drawdown(), Some(dec!(0.25)));
    assert_eq!(run.summaries[0].max_drawdown, Some(dec!(0.25)));
}

#[test]
fn manual_override_prices_a_valueless_buy() {
    let input = PipelineInput {
        activities: vec![activity(2, "FUND", 1, "B", dec!(4))],
        prices: vec![],
        benchmark: None,
    };
    let config = AnalysisConfig::new(day(3))
        .with_manual_prices(vec![ManualPrice::constant("FUND", dec!(25))]);
    let run = Pipeline::new(config).run(&input).unwrap();

    assert!(run.failures.is_empty());
    assert!(run.warnings.is_empty());
    let rows: Vec<_> = run.rows_for("FUND").collect();
    assert_eq!(rows[0].cost_basis, dec!(100));
    assert!(rows.iter().all(|r| r.owned_value == Some(dec!(100))));
}

#[test]
fn oversell_fails_only_that_asset() {
    let mut input = two_asset_input();
    input
        .activities
        .push(activity(6, "X", 6, "S", dec!(11)).with_value(dec!(1000)));

    let run = run(&input);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].asset, "X");
    assert!(matches!(
        run.failures[0].error,
        EngineError::Oversell { requested, held, .. } if requested == dec!(11) && held == dec!(5)
    ));
    // Only the unpriced asset is left, so no day has a Total row
    assert_eq!(run.total_rows().count(), 0);
    assert_eq!(run.benchmark_error, Some(EngineError::NoOverlap));
}

#[test]
fn repeated_runs_are_identical() {
    let input = two_asset_input();
    assert_eq!(run(&input), run(&input));
}

#[test]
fn row_order_in_ledger_does_not_matter() {
    let input = two_asset_input();
    let mut reversed = input.clone();
    reversed.activities.reverse();

    let a = run(&input);
    let b = run(&reversed);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.benchmark, b.benchmark);
}

#[test]
fn asset_named_like_the_benchmark_keeps_its_prices() {
    let close = |d: u32, c: Decimal| HistoricalClose {
        date: day(d),
        close: c,
    };
    // The same closes fetched once as the held asset and once as the benchmark
    let mut report = FetchReport::default();
    report.add_asset("MSCI", vec![close(1, dec!(80)), close(2, dec!(88))]);
    report.add_benchmark(vec![close(1, dec!(80)), close(2, dec!(88))]);

    let config = AnalysisConfig::new(day(3));
    let activities = vec![activity(2, "MSCI", 1, "B", dec!(10)).with_value(dec!(80))];
    let ledger = LedgerNormalizer::new(&config).normalize(&activities).unwrap();
    let benchmark = BenchmarkInput {
        label: "MSCI".to_string(),
        points: report.benchmark,
    };
    let run = Pipeline::new(config)
        .run_ledger(&ledger, &report.observations, Some(&benchmark))
        .unwrap();

    assert!(run.warnings.is_empty());
    assert_eq!(run.total_rows().count(), 3);
    assert_eq!(run.latest_total().unwrap().owned_value, Some(dec!(880)));
    assert!(run.benchmark_error.is_none());
    let last = run.benchmark.last().unwrap();
    assert_eq!(last.portfolio_index, Some(dec!(110)));
    assert_eq!(last.benchmark_index, Some(dec!(110)));
}

#[test]
fn valueless_sell_is_priced_by_the_override_of_its_day() {
    let input = PipelineInput {
        activities: vec![
            activity(2, "A", 1, "B", dec!(10)).with_value(dec!(10)),
            activity(3, "A", 2, "S", dec!(4)),
        ],
        prices: vec![price("A", 1, dec!(10))],
        benchmark: None,
    };
    let config = AnalysisConfig::new(day(2))
        .with_manual_prices(vec![ManualPrice::on("A", day(2), dec!(12))]);
    let run = Pipeline::new(config).run(&input).unwrap();

    let sell_day = run.rows_for("A").find(|r| r.date == day(2)).unwrap();
    assert_eq!(sell_day.cash_received, dec!(48));
    assert_eq!(sell_day.cost_basis, dec!(60));
    assert_eq!(sell_day.owned_value, Some(dec!(72)));

    let without_override = Pipeline::new(AnalysisConfig::new(day(2))).run(&input).unwrap();
    assert_eq!(
        without_override.failures[0].error,
        EngineError::MissingPrice {
            asset: "A".to_string(),
            date: day(2)
        }
    );
}
