// Import module - activity ledgers (Excel/CSV) and price CSV files

pub mod activity_csv;
pub mod activity_excel;
pub mod prices_csv;

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::ledger::{RawActivity, RawDate};

pub use prices_csv::{load_benchmark, load_prices};

/// Load activity rows, choosing the parser from the file extension
pub fn load_activities<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawActivity>> {
    let path = file_path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("File has no extension: {:?}", path))?
        .to_lowercase();

    info!("Importing activity file: {:?} (type: {})", path, extension);

    match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => activity_excel::parse_activity_excel(path),
        "csv" | "txt" => activity_csv::parse_activity_csv(path),
        _ => Err(anyhow!("Unsupported file format: {}", extension)),
    }
}

/// One cell of an activity row, independent of the source format
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Empty,
    Text(String),
    Number(Decimal),
    Date(RawDate),
}

impl Cell {
    pub(crate) fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_string())
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(t) => t.trim().to_string(),
            Cell::Number(n) => n.normalize().to_string(),
            Cell::Date(RawDate::Day(d)) => d.to_string(),
            Cell::Date(RawDate::Timestamp(ts)) => ts.to_string(),
            Cell::Date(RawDate::Text(t)) => t.clone(),
            Cell::Date(RawDate::Missing) => String::new(),
        }
    }

    fn amount(&self, column: &str) -> Result<Option<Decimal>> {
        match self {
            Cell::Empty => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(t) => parse_amount(t).with_context(|| format!("Invalid {} '{}'", column, t)),
            Cell::Date(_) => bail!("Expected a number in column {}, found a date", column),
        }
    }

    fn date(&self) -> RawDate {
        match self {
            Cell::Empty => RawDate::Missing,
            Cell::Date(d) => d.clone(),
            other => RawDate::Text(other.text()),
        }
    }
}

/// Activity columns located by header name
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ColumnMapping {
    date: Option<usize>,
    asset: Option<usize>,
    kind: Option<usize>,
    volume: Option<usize>,
    value: Option<usize>,
    /// Several fee columns may exist (`fee_buy`, `fee_sell`); the first
    /// non-empty one of a row is used
    fees: Vec<usize>,
    annual_fee: Option<usize>,
}

impl ColumnMapping {
    /// Create column mapping by scanning header names
    pub(crate) fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let mut mapping = ColumnMapping::default();

        for (idx, name) in header.iter().enumerate() {
            let key = name
                .as_ref()
                .trim_start_matches('\u{feff}')
                .trim()
                .to_lowercase()
                .replace([' ', '-'], "_");

            match key.as_str() {
                "date" | "datum" => mapping.date = mapping.date.or(Some(idx)),
                "asset" | "anlage" | "ticker" => mapping.asset = mapping.asset.or(Some(idx)),
                "type" | "kind" | "typ" => mapping.kind = mapping.kind.or(Some(idx)),
                "volume" | "quantity" | "anzahl" => mapping.volume = mapping.volume.or(Some(idx)),
                "value" | "price" | "kurs" => mapping.value = mapping.value.or(Some(idx)),
                "fee" | "fee_buy" | "fee_sell" | "gebühr" | "gebuehr" => mapping.fees.push(idx),
                "fee_annual" | "annual_fee" => mapping.annual_fee = mapping.annual_fee.or(Some(idx)),
                _ => {}
            }
        }

        mapping
    }

    /// Names of required columns that were not found
    pub(crate) fn missing_required(&self) -> Vec<&'static str> {
        [
            ("date", self.date),
            ("asset", self.asset),
            ("type", self.kind),
            ("volume", self.volume),
        ]
        .into_iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Turn one data row into a raw activity; blank rows give `None`.
    /// Unparseable numbers fail here, everything else is left to the normalizer.
    pub(crate) fn to_raw(&self, row: usize, cells: &[Cell]) -> Result<Option<RawActivity>> {
        if cells.iter().all(Cell::is_empty) {
            return Ok(None);
        }

        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).unwrap_or(&Cell::Empty);
        let amount = |idx: Option<usize>, column: &str| {
            cell(idx)
                .amount(column)
                .with_context(|| format!("Row {}", row))
        };

        let fee = self
            .fees
            .iter()
            .map(|&i| cell(Some(i)))
            .find(|c| !c.is_empty())
            .map(|c| c.amount("fee").with_context(|| format!("Row {}", row)))
            .transpose()?
            .flatten();

        Ok(Some(RawActivity {
            row,
            asset: cell(self.asset).text(),
            date: cell(self.date).date(),
            kind: cell(self.kind).text(),
            volume: amount(self.volume, "volume")?,
            value: amount(self.value, "value")?,
            fee,
            annual_fee: amount(self.annual_fee, "annual fee")?,
        }))
    }
}

/// Parse an amount written with a decimal point or a decimal comma.
///
/// When both separators appear the last one is the decimal separator; a
/// separator that repeats is a thousands separator. Empty text is `None`.
pub fn parse_amount(text: &str) -> Result<Option<Decimal>> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let normalized = match (commas, dots) {
        (0, _) if dots > 1 => cleaned.replace('.', ""),
        (0, _) => cleaned,
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    Decimal::from_str(&normalized)
        .map(Some)
        .with_context(|| format!("Failed to parse decimal '{}'", text))
}

/// Pick `;` when the header line has more semicolons than commas
pub(crate) fn sniff_delimiter(path: &Path) -> Result<u8> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .with_context(|| format!("Failed to read {:?}", path))?;

    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    Ok(if semicolons > commas { b';' } else { b',' })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_separators() {
        assert_eq!(parse_amount("12.5").unwrap(), Some(dec!(12.5)));
        assert_eq!(parse_amount("12,5").unwrap(), Some(dec!(12.5)));
        assert_eq!(parse_amount("1.234,56").unwrap(), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1,234.56").unwrap(), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1.234.567").unwrap(), Some(dec!(1234567)));
        assert_eq!(parse_amount("€ 3,10").unwrap(), Some(dec!(3.10)));
        assert_eq!(parse_amount("-4").unwrap(), Some(dec!(-4)));
        assert_eq!(parse_amount("  ").unwrap(), None);
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_column_mapping_from_header() {
        let mapping = ColumnMapping::from_header(&[
            "\u{feff}Date", "Asset", "Type", "Volume", "Value", "fee_buy", "fee_sell", "Fee Annual",
        ]);
        assert!(mapping.is_valid());
        assert_eq!(mapping.date, Some(0));
        assert_eq!(mapping.fees, vec![5, 6]);
        assert_eq!(mapping.annual_fee, Some(7));
    }

    #[test]
    fn test_column_mapping_german_headers() {
        let mapping = ColumnMapping::from_header(&["Datum", "Anlage", "Typ", "Anzahl", "Kurs", "Gebühr"]);
        assert!(mapping.is_valid());
        assert_eq!(mapping.value, Some(4));
        assert_eq!(mapping.fees, vec![5]);
    }

    #[test]
    fn test_missing_required_columns() {
        let mapping = ColumnMapping::from_header(&["date", "asset", "price"]);
        assert_eq!(mapping.missing_required(), vec!["type", "volume"]);
    }

    #[test]
    fn test_to_raw_uses_first_non_empty_fee() {
        let mapping = ColumnMapping::from_header(&["date", "asset", "type", "volume", "fee_buy", "fee_sell"]);
        let cells = vec![
            Cell::Date(RawDate::Day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())),
            Cell::from_text("ETH"),
            Cell::from_text("S"),
            Cell::Number(dec!(2)),
            Cell::Empty,
            Cell::from_text("1,5"),
        ];

        let raw = mapping.to_raw(3, &cells).unwrap().unwrap();
        assert_eq!(raw.row, 3);
        assert_eq!(raw.asset, "ETH");
        assert_eq!(raw.kind, "S");
        assert_eq!(raw.volume, Some(dec!(2)));
        assert_eq!(raw.value, None);
        assert_eq!(raw.fee, Some(dec!(1.5)));
    }

    #[test]
    fn test_to_raw_skips_blank_rows_and_rejects_bad_numbers() {
        let mapping = ColumnMapping::from_header(&["date", "asset", "type", "volume"]);
        assert_eq!(mapping.to_raw(2, &[Cell::Empty, Cell::Empty]).unwrap(), None);

        let cells = vec![
            Cell::from_text("2024-01-02"),
            Cell::from_text("ETH"),
            Cell::from_text("B"),
            Cell::from_text("lots"),
        ];
        let err = mapping.to_raw(9, &cells).unwrap_err();
        assert!(format!("{:#}", err).contains("Row 9"));
    }
}
