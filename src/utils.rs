//! Utility functions for common operations

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{LookoutError, LookoutResult};

/// Round `value` to `decimals` decimal places, half away from zero
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Arithmetic mean; zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn matches_pattern(value: &str, pattern: &str) -> bool {
    value.len() == pattern.len()
        && value.bytes().zip(pattern.bytes()).all(|(c, p)| match p {
            b'9' => c.is_ascii_digit(),
            other => c == other,
        })
}

/// Parse a strict `YYYY-MM-DD` calendar date
pub fn parse_date_only(value: &str) -> LookoutResult<NaiveDate> {
    let invalid = || LookoutError::invalid_date_format(value, "YYYY-MM-DD");
    if !matches_pattern(value, "9999-99-99") {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

/// Parse an aggregation bound: RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC),
/// `YYYY-MM-DD` or `dd/MM/yyyy` (both at UTC midnight)
pub fn parse_date_param(value: &str) -> LookoutResult<DateTime<Utc>> {
    let trimmed = value.trim();
    let invalid = || LookoutError::invalid_date_format(trimmed, "ISO 8601 or dd/MM/yyyy");

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    let date = if matches_pattern(trimmed, "99/99/9999") {
        NaiveDate::parse_from_str(trimmed, "%d/%m/%Y").map_err(|_| invalid())?
    } else if matches_pattern(trimmed, "9999-99-99") {
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| invalid())?
    } else {
        return Err(invalid());
    };
    Ok(start_of_day(date))
}

/// UTC midnight of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant (second precision) of `date` in UTC
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + chrono::Duration::seconds(86_399)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    grouped
}

/// Split into (negative, integer digits, two fraction digits)
fn split_cents(value: f64) -> (bool, String, String) {
    let cents = (value.abs() * 100.0).round() as u64;
    let negative = value < 0.0 && cents > 0;
    (negative, (cents / 100).to_string(), format!("{:02}", cents % 100))
}

/// pt-BR number with up to 2 fraction digits: `1234.5` -> `1.234,5`
pub fn format_number_br(value: f64) -> String {
    let (negative, int_part, frac) = split_cents(value);
    let frac = frac.trim_end_matches('0');

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_thousands(&int_part));
    if !frac.is_empty() {
        out.push(',');
        out.push_str(frac);
    }
    out
}

/// pt-BR currency: `1234.5` -> `R$ 1.234,50` (non-breaking space after the symbol)
pub fn format_currency_brl(value: f64) -> String {
    let (negative, int_part, frac) = split_cents(value);
    format!(
        "{}R$\u{a0}{},{}",
        if negative { "-" } else { "" },
        group_thousands(&int_part),
        frac
    )
}
