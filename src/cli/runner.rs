use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::{formatters, Cli, Commands};
use folio::config::{AnalysisConfig, BenchmarkConfig, Config};
use folio::export;
use folio::importers;
use folio::ledger::{parse_day, Ledger, LedgerNormalizer, RawDate};
use folio::pipeline::{BenchmarkInput, Pipeline};
use folio::pricing::{FetchReport, PriceFetcher};

const DEFAULT_BENCHMARK_LABEL: &str = "Benchmark";

/// Execute a parsed command line
pub async fn dispatch(cli: Cli) -> Result<()> {
    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            ledger,
            prices,
            benchmark,
            end,
            strict,
            out,
            offline,
        } => {
            let options = RunOptions {
                ledger,
                prices,
                benchmark,
                end,
                strict,
                out,
                offline,
            };
            handle_run(&config, options, cli.json).await
        }
        Commands::FetchPrices {
            ledger,
            output,
            benchmark_output,
            end,
        } => handle_fetch_prices(&config, &ledger, &output, &benchmark_output, end.as_deref(), cli.json).await,
        Commands::Ledger { file, asset } => handle_ledger(&config, &file, asset.as_deref(), cli.json),
    }
}

struct RunOptions {
    ledger: PathBuf,
    prices: Option<PathBuf>,
    benchmark: Option<PathBuf>,
    end: Option<String>,
    strict: bool,
    out: Option<PathBuf>,
    offline: bool,
}

/// Parse a `--end` argument with the same rules as ledger dates
pub fn parse_end_date(text: &str) -> Result<NaiveDate> {
    parse_day(&RawDate::Text(text.to_string())).map_err(|e| anyhow!("Invalid --end date: {}", e))
}

fn analysis_config(config: &Config, end: Option<&str>, strict: bool) -> Result<AnalysisConfig> {
    let mut analysis = config.analysis();
    if let Some(end) = end {
        analysis.end_date = parse_end_date(end)?;
    }
    let strict = analysis.strict || strict;
    Ok(analysis.with_strict(strict))
}

fn normalized_ledger(path: &Path, analysis: &AnalysisConfig) -> Result<Ledger> {
    let activities = importers::load_activities(path)?;
    LedgerNormalizer::new(analysis)
        .normalize(&activities)
        .with_context(|| format!("Invalid ledger {:?}", path))
}

fn show_progress(json: bool) -> bool {
    !json && std::io::stdout().is_terminal()
}

async fn fetch(
    tickers: BTreeMap<String, String>,
    benchmark: Option<&BenchmarkConfig>,
    from: NaiveDate,
    to: NaiveDate,
    json: bool,
) -> Result<FetchReport> {
    let mut fetcher = PriceFetcher::new(tickers)?;
    if let Some(bench) = benchmark {
        fetcher = fetcher.with_benchmark(&bench.label, &bench.ticker);
    }
    let report = fetcher.fetch_all(from, to, show_progress(json)).await;
    for label in &report.failed {
        warn!("No prices fetched for {}", label);
    }
    Ok(report)
}

async fn handle_run(config: &Config, options: RunOptions, json: bool) -> Result<()> {
    let analysis = analysis_config(config, options.end.as_deref(), options.strict)?;
    let ledger = normalized_ledger(&options.ledger, &analysis)?;

    let mut prices = match &options.prices {
        Some(path) => importers::load_prices(path)?,
        None => Vec::new(),
    };
    let mut benchmark = match &options.benchmark {
        Some(path) => Some(BenchmarkInput {
            label: config
                .benchmark
                .as_ref()
                .map(|b| b.label.clone())
                .unwrap_or_else(|| DEFAULT_BENCHMARK_LABEL.to_string()),
            points: importers::load_benchmark(path)?,
        }),
        None => None,
    };

    // Whatever was not supplied as a file comes from the price API
    let mut tickers = BTreeMap::new();
    if options.prices.is_none() {
        tickers.extend(
            config
                .tickers
                .iter()
                .filter(|(label, _)| ledger.assets().any(|a| a == label.as_str()))
                .map(|(label, ticker)| (label.clone(), ticker.clone())),
        );
    }
    let fetch_benchmark = if benchmark.is_none() {
        config.benchmark.as_ref()
    } else {
        None
    };

    match ledger.first_date() {
        Some(from) if !options.offline && (!tickers.is_empty() || fetch_benchmark.is_some()) => {
            let report = fetch(tickers, fetch_benchmark, from, analysis.end_date, json).await?;
            if let Some(bench) = fetch_benchmark {
                if !report.benchmark.is_empty() {
                    benchmark = Some(BenchmarkInput {
                        label: bench.label.clone(),
                        points: report.benchmark,
                    });
                }
            }
            prices.extend(report.observations);
        }
        Some(_) if options.offline => info!("Offline run, prices come from files and manual prices only"),
        _ => {}
    }

    let run = Pipeline::new(analysis).run_ledger(&ledger, &prices, benchmark.as_ref())?;

    let dir = options.out.unwrap_or_else(|| config.output.dir.clone());
    let written = if run.calendar.is_some() {
        export::write_all(&dir, &run)?
    } else {
        Vec::new()
    };

    if json {
        println!("{}", formatters::format_run_json(&run, &written));
    } else {
        print!("{}", formatters::format_run_table(&run, &written));
    }
    Ok(())
}

async fn handle_fetch_prices(
    config: &Config,
    ledger_path: &Path,
    output: &Path,
    benchmark_output: &Path,
    end: Option<&str>,
    json: bool,
) -> Result<()> {
    let analysis = analysis_config(config, end, false)?;
    let ledger = normalized_ledger(ledger_path, &analysis)?;

    let Some(from) = ledger.first_date() else {
        bail!("Ledger {:?} has no activities, nothing to fetch", ledger_path);
    };

    if config.tickers.is_empty() && config.benchmark.is_none() {
        bail!("No tickers configured; add a [tickers] table to the configuration");
    }

    let report = fetch(
        config.tickers.clone(),
        config.benchmark.as_ref(),
        from,
        analysis.end_date,
        json,
    )
    .await?;

    let mut written = Vec::new();
    if !report.benchmark.is_empty() {
        export::write_benchmark_points(benchmark_output, &report.benchmark)?;
        written.push(benchmark_output.to_path_buf());
    }
    export::write_prices(output, &report.observations)?;
    written.push(output.to_path_buf());

    if json {
        let summary = serde_json::json!({
            "from": from.to_string(),
            "to": analysis.end_date.to_string(),
            "observations": report.observations.len(),
            "failed": report.failed,
            "files": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "\n{} Fetched {} prices from {} to {}",
            "✓".green().bold(),
            report.observations.len(),
            from,
            analysis.end_date
        );
        for label in &report.failed {
            println!("{} No data for {}", "⚠".yellow().bold(), label);
        }
        for path in &written {
            println!("  {}", path.display());
        }
    }
    Ok(())
}

fn handle_ledger(config: &Config, path: &Path, asset: Option<&str>, json: bool) -> Result<()> {
    let analysis = analysis_config(config, None, false)?;
    let ledger = normalized_ledger(path, &analysis)?;

    let events: Vec<_> = ledger
        .iter()
        .filter(|(name, _)| asset.map_or(true, |a| a == *name))
        .flat_map(|(_, events)| events.iter())
        .collect();

    if json {
        println!("{}", formatters::format_ledger_json(&events));
    } else {
        print!("{}", formatters::format_ledger_table(&events));
    }
    Ok(())
}
