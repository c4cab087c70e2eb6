//! Utility functions for formatting values in terminal output
//!
//! Amounts are shown with two decimals and `,` thousands separators; ratios
//! are shown as percentages. Undefined values render as "N/A".

use rust_decimal::Decimal;

const NOT_AVAILABLE: &str = "N/A";

/// Core formatting function: fixed decimals, thousands separators, right
/// aligned to `width` (0 for no padding).
///
/// # Examples
/// ```
/// use folio::utils::format_amount_with_width;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_amount_with_width(dec!(1234.5), 2, 0), "1,234.50");
/// assert_eq!(format_amount_with_width(dec!(-7), 0, 6), "    -7");
/// ```
pub fn format_amount_with_width(value: Decimal, decimals: u32, width: usize) -> String {
    let rounded = value.round_dp(decimals);
    let is_negative = rounded < Decimal::ZERO;
    let formatted = format!("{:.*}", decimals as usize, rounded.abs());

    let (integer_part, decimal_part) = match formatted.split_once('.') {
        Some((int, dec)) => (int, Some(dec)),
        None => (formatted.as_str(), None),
    };

    let digits: Vec<char> = integer_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let sign = if is_negative { "-" } else { "" };
    let result = match decimal_part {
        Some(dec) => format!("{}{}.{}", sign, grouped, dec),
        None => format!("{}{}", sign, grouped),
    };

    format!("{:>width$}", result, width = width)
}

/// Two-decimal amount: "1,234.56"
pub fn format_amount(value: Decimal) -> String {
    format_amount_with_width(value, 2, 0)
}

/// Optional amount, "N/A" when undefined
pub fn format_optional_amount(value: Option<Decimal>) -> String {
    value
        .map(format_amount)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Ratio as a percentage: 0.1234 -> "12.34%"
///
/// # Examples
/// ```
/// use folio::utils::format_percent;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_percent(dec!(0.1234)), "12.34%");
/// ```
pub fn format_percent(ratio: Decimal) -> String {
    format!("{}%", format_amount(ratio * Decimal::ONE_HUNDRED))
}

pub fn format_optional_percent(ratio: Option<Decimal>) -> String {
    ratio
        .map(format_percent)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Volumes keep their own precision, trailing zeros dropped
pub fn format_volume(value: Decimal) -> String {
    value.normalize().to_string()
}
