//! Small shared helpers

use crate::error::{Error, Result};

/// Current Unix timestamp in milliseconds
#[must_use]
pub fn unix_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trim text, mapping whitespace-only input to `None`
#[must_use]
pub fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trim a text option, mapping whitespace-only values to `None`
#[must_use]
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    normalize_text(value?.as_str())
}

/// Check whether a value looks like an http(s) URL
#[must_use]
pub fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("https://") || value.starts_with("http://")
}

/// Render a minor-unit amount (e.g. centavos) as a decimal string
///
/// `-1234` becomes `"-12.34"`.
#[must_use]
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a decimal amount string into minor units
///
/// Accepts `"12"`, `"12.3"`, `"12.34"`, and a leading sign. Rejects more
/// than two decimal places.
pub fn parse_amount(input: &str) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidInput("Amount cannot be empty".into()));
    }

    let (sign, digits) = match input.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, input.strip_prefix('+').unwrap_or(input)),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(Error::InvalidInput(format!("Invalid amount: {input}")));
    }
    if frac.len() > 2 {
        return Err(Error::InvalidInput(format!(
            "Amount has more than two decimal places: {input}"
        )));
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid amount: {input}")))?
    };

    let mut frac_value: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid amount: {input}")))?
    };
    if frac.len() == 1 {
        frac_value *= 10;
    }

    let minor = whole_value
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(frac_value))
        .ok_or_else(|| Error::InvalidInput(format!("Amount is out of range: {input}")))?;
    Ok(sign * minor)
}
