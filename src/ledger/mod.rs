//! Activity ledger: raw rows from the loaders and their typed, validated form.
//!
//! `RawActivity` is the single record type produced at the ingestion
//! boundary. `LedgerNormalizer` is the only place that validates it; the rest
//! of the crate works on `ActivityEvent`s and never re-checks them.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::EngineError;

/// Ledger action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ActivityKind {
    Buy,
    Sell,
    DividendShares,
    DividendCash,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Buy => "BUY",
            ActivityKind::Sell => "SELL",
            ActivityKind::DividendShares => "DIVIDEND_SHARES",
            ActivityKind::DividendCash => "DIVIDEND_CASH",
        }
    }

    /// Position in the fixed same-day replay order: buys, share dividends,
    /// sells, cash dividends
    pub fn replay_rank(&self) -> u8 {
        match self {
            ActivityKind::Buy => 0,
            ActivityKind::DividendShares => 1,
            ActivityKind::Sell => 2,
            ActivityKind::DividendCash => 3,
        }
    }
}

impl FromStr for ActivityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B" | "BUY" => Ok(ActivityKind::Buy),
            "S" | "SELL" => Ok(ActivityKind::Sell),
            "SD" | "DIVIDEND_SHARES" | "DIVIDENDSHARES" => Ok(ActivityKind::DividendShares),
            "CD" | "DIVIDEND_CASH" | "DIVIDENDCASH" => Ok(ActivityKind::DividendCash),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date cell as it came out of the loader
#[derive(Debug, Clone, PartialEq)]
pub enum RawDate {
    Day(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
    Missing,
}

/// Untyped activity row as read from a spreadsheet or CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct RawActivity {
    /// Row number in the source file (1-indexed, header included)
    pub row: usize,
    pub asset: String,
    pub date: RawDate,
    pub kind: String,
    pub volume: Option<Decimal>,
    pub value: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub annual_fee: Option<Decimal>,
}

impl RawActivity {
    pub fn new(
        row: usize,
        asset: impl Into<String>,
        date: RawDate,
        kind: impl Into<String>,
        volume: Option<Decimal>,
    ) -> Self {
        Self {
            row,
            asset: asset.into(),
            date,
            kind: kind.into(),
            volume,
            value: None,
            fee: None,
            annual_fee: None,
        }
    }

    pub fn with_value(mut self, value: Decimal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_annual_fee(mut self, annual_fee: Decimal) -> Self {
        self.annual_fee = Some(annual_fee);
        self
    }
}

/// One validated ledger entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub asset: String,
    pub date: NaiveDate,
    pub kind: ActivityKind,
    /// Always >= 0; the effect on holdings comes from `kind`
    pub volume: Decimal,
    /// Price per share (buy), total proceeds (sell) or cash amount (cash dividend)
    pub value: Option<Decimal>,
    pub fee: Decimal,
    pub annual_fee: Decimal,
    /// Source row, used as the stable tie-breaker
    pub row: usize,
}

/// Normalized events grouped per asset, each group sorted by date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    events: BTreeMap<String, Vec<ActivityEvent>>,
}

impl Ledger {
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn events(&self, asset: &str) -> &[ActivityEvent] {
        self.events.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ActivityEvent])> {
        self.events.iter().map(|(a, e)| (a.as_str(), e.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Earliest event date across all assets
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.events
            .values()
            .filter_map(|events| events.first().map(|e| e.date))
            .min()
    }

    pub fn first_date_of(&self, asset: &str) -> Option<NaiveDate> {
        self.events(asset).first().map(|e| e.date)
    }
}

/// Validates raw rows and groups them into a `Ledger`
#[derive(Debug, Clone)]
pub struct LedgerNormalizer {
    end_date: NaiveDate,
}

impl LedgerNormalizer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            end_date: config.end_date,
        }
    }

    /// Normalize all rows. The first malformed row aborts normalization.
    pub fn normalize(&self, rows: &[RawActivity]) -> Result<Ledger, EngineError> {
        let mut events: BTreeMap<String, Vec<ActivityEvent>> = BTreeMap::new();

        for raw in rows {
            let event = self.normalize_row(raw)?;
            events.entry(event.asset.clone()).or_default().push(event);
        }

        for asset_events in events.values_mut() {
            // Stable: ledger order survives for same-day events
            asset_events.sort_by_key(|e| e.date);
        }

        let ledger = Ledger { events };
        info!(
            "Normalized {} events for {} assets",
            ledger.len(),
            ledger.events.len()
        );
        Ok(ledger)
    }

    fn normalize_row(&self, raw: &RawActivity) -> Result<ActivityEvent, EngineError> {
        let malformed = |reason: String| EngineError::MalformedEvent {
            row: raw.row,
            reason,
        };

        let asset = raw.asset.trim();
        if asset.is_empty() {
            return Err(malformed("asset label is empty".to_string()));
        }

        let kind = ActivityKind::from_str(&raw.kind)
            .map_err(|_| malformed(format!("unknown type code '{}'", raw.kind.trim())))?;

        let date = parse_day(&raw.date).map_err(malformed)?;
        if date > self.end_date {
            return Err(malformed(format!(
                "date {} is after the analysis end date {}",
                date, self.end_date
            )));
        }

        let volume = raw
            .volume
            .ok_or_else(|| malformed("volume is missing".to_string()))?;
        if volume < Decimal::ZERO {
            return Err(malformed(format!("volume {} is negative", volume)));
        }

        let value = match raw.value {
            Some(v) if v < Decimal::ZERO => {
                return Err(malformed(format!("value {} is negative", v)));
            }
            other => other,
        };

        let fee = non_negative(raw.fee, "fee").map_err(malformed)?;
        let annual_fee = non_negative(raw.annual_fee, "annual fee").map_err(malformed)?;

        debug!("Row {}: {} {} {} {}", raw.row, date, asset, kind, volume);

        Ok(ActivityEvent {
            asset: asset.to_string(),
            date,
            kind,
            volume,
            value,
            fee,
            annual_fee,
            row: raw.row,
        })
    }
}

fn non_negative(amount: Option<Decimal>, field: &str) -> Result<Decimal, String> {
    match amount {
        Some(a) if a < Decimal::ZERO => Err(format!("{} {} is negative", field, a)),
        Some(a) => Ok(a),
        None => Ok(Decimal::ZERO),
    }
}

/// Reduce a raw date cell to a calendar day (time of day is dropped)
pub fn parse_day(raw: &RawDate) -> Result<NaiveDate, String> {
    match raw {
        RawDate::Day(d) => Ok(*d),
        RawDate::Timestamp(ts) => Ok(ts.date()),
        RawDate::Missing => Err("date is missing".to_string()),
        RawDate::Text(text) => {
            let text = text.trim();
            for format in ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"] {
                if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                    return Ok(date);
                }
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
                    return Ok(ts.date());
                }
            }
            Err(format!("could not parse date '{}'", text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn normalizer() -> LedgerNormalizer {
        LedgerNormalizer::new(&AnalysisConfig::new(day(2025, 12, 31)))
    }

    fn buy(row: usize, asset: &str, date: &str, volume: Decimal) -> RawActivity {
        RawActivity::new(row, asset, RawDate::Text(date.to_string()), "B", Some(volume))
            .with_value(dec!(100))
    }

    fn malformed_row(result: Result<Ledger, EngineError>) -> usize {
        match result {
            Err(EngineError::MalformedEvent { row, .. }) => row,
            other => panic!("expected MalformedEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ActivityKind::from_str("B"), Ok(ActivityKind::Buy));
        assert_eq!(ActivityKind::from_str(" sell "), Ok(ActivityKind::Sell));
        assert_eq!(ActivityKind::from_str("sd"), Ok(ActivityKind::DividendShares));
        assert_eq!(ActivityKind::from_str("CD"), Ok(ActivityKind::DividendCash));
        assert!(ActivityKind::from_str("X").is_err());
        assert!(ActivityKind::from_str("").is_err());
    }

    #[test]
    fn test_groups_and_sorts_per_asset() {
        let rows = vec![
            buy(2, "B", "2024-01-05", dec!(1)),
            buy(3, "A", "2024-01-03", dec!(2)),
            buy(4, "A", "2024-01-01", dec!(3)),
        ];
        let ledger = normalizer().normalize(&rows).unwrap();

        assert_eq!(ledger.assets().collect::<Vec<_>>(), vec!["A", "B"]);
        let a = ledger.events("A");
        assert_eq!(a[0].date, day(2024, 1, 1));
        assert_eq!(a[1].date, day(2024, 1, 3));
        assert_eq!(ledger.first_date(), Some(day(2024, 1, 1)));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_same_day_keeps_ledger_order() {
        let rows = vec![
            buy(2, "A", "2024-01-01", dec!(1)),
            buy(3, "A", "2024-01-01", dec!(2)),
            buy(4, "A", "2024-01-01", dec!(3)),
        ];
        let ledger = normalizer().normalize(&rows).unwrap();
        let rows: Vec<_> = ledger.events("A").iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3, 4]);
    }

    #[test]
    fn test_unknown_type_code_is_malformed() {
        let rows = vec![RawActivity::new(
            7,
            "A",
            RawDate::Day(day(2024, 1, 1)),
            "XX",
            Some(dec!(1)),
        )];
        assert_eq!(malformed_row(normalizer().normalize(&rows)), 7);
    }

    #[test]
    fn test_negative_volume_is_malformed() {
        let rows = vec![buy(3, "A", "2024-01-01", dec!(-1))];
        assert_eq!(malformed_row(normalizer().normalize(&rows)), 3);
    }

    #[test]
    fn test_unparseable_date_is_malformed() {
        let rows = vec![buy(5, "A", "yesterday", dec!(1))];
        assert_eq!(malformed_row(normalizer().normalize(&rows)), 5);
    }

    #[test]
    fn test_event_after_end_date_is_malformed() {
        let rows = vec![buy(2, "A", "2026-01-01", dec!(1))];
        assert_eq!(malformed_row(normalizer().normalize(&rows)), 2);
    }

    #[test]
    fn test_missing_fee_defaults_to_zero_and_buy_price_is_optional() {
        let rows = vec![RawActivity::new(
            2,
            " A ",
            RawDate::Day(day(2024, 1, 1)),
            "B",
            Some(dec!(1)),
        )];
        let ledger = normalizer().normalize(&rows).unwrap();
        let event = &ledger.events("A")[0];
        assert_eq!(event.fee, Decimal::ZERO);
        assert_eq!(event.annual_fee, Decimal::ZERO);
        assert_eq!(event.value, None);
    }

    #[test]
    fn test_parse_day_formats() {
        let expected = day(2024, 3, 15);
        assert_eq!(parse_day(&RawDate::Text("2024-03-15".into())), Ok(expected));
        assert_eq!(parse_day(&RawDate::Text("15.03.2024".into())), Ok(expected));
        assert_eq!(parse_day(&RawDate::Text("15/03/2024".into())), Ok(expected));
        assert_eq!(
            parse_day(&RawDate::Text("2024-03-15 14:30:00".into())),
            Ok(expected)
        );
        let ts = expected.and_hms_opt(9, 45, 0).unwrap();
        assert_eq!(parse_day(&RawDate::Timestamp(ts)), Ok(expected));
        assert!(parse_day(&RawDate::Missing).is_err());
    }
}
