use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

/// Daily close from the chart endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalClose {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// Fetch daily closes for `symbol` between `from` and `to` (inclusive)
pub async fn fetch_historical_closes(
    client: &Client,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<HistoricalClose>> {
    info!(
        "Fetching historical prices for {} from {} to {}",
        symbol, from, to
    );

    let from_timestamp = from
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid from date"))?
        .and_utc()
        .timestamp();

    let to_timestamp = to
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("Invalid to date"))?
        .and_utc()
        .timestamp();

    let url = format!(
        "{}/{}?period1={}&period2={}&interval=1d",
        CHART_BASE_URL, symbol, from_timestamp, to_timestamp
    );

    let response = client
        .get(&url)
        .send()
        .await
        .context("Failed to send request to Yahoo Finance")?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Yahoo Finance returned error status: {}",
            response.status()
        ));
    }

    let body = response
        .text()
        .await
        .context("Failed to read Yahoo Finance response")?;

    let closes = parse_chart_response(&body)?;
    debug!("Fetched {} closes for {}", closes.len(), symbol);
    Ok(closes)
}

/// Parse a chart response body. Days with a null close (holidays, halted
/// sessions) are skipped rather than treated as errors.
pub fn parse_chart_response(body: &str) -> Result<Vec<HistoricalClose>> {
    let data: YahooChartResponse =
        serde_json::from_str(body).context("Failed to parse Yahoo Finance response")?;

    if let Some(error) = data.chart.error {
        return Err(anyhow!(
            "Yahoo Finance API error: {} - {}",
            error.code,
            error.description
        ));
    }

    let result = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data returned from Yahoo Finance"))?;

    // A symbol without trading days in range comes back without timestamps
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No quote data"))?;
    let closes = quote.close.ok_or_else(|| anyhow!("No close prices"))?;

    let mut prices = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow!("Invalid timestamp {}", timestamp))?
            .date_naive();

        let Some(close) = closes.get(i).copied().flatten() else {
            continue;
        };
        let close =
            Decimal::from_f64(close).ok_or_else(|| anyhow!("Invalid close price {}", close))?;

        prices.push(HistoricalClose { date, close });
    }

    Ok(prices)
}
