//! Lenient numeric parsing for vendor payloads.
//!
//! Vendors return numbers as strings, floats, `null`, `"None"`, `"-"` or NaN.
//! Anything that does not parse to a finite, non-negative value becomes zero.

use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Parses a vendor string such as `"1,234.50"`. Unparseable or negative input is zero.
pub fn coerce_str(raw: &str) -> Decimal {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    match Decimal::from_str(&cleaned) {
        Ok(v) if v >= Decimal::ZERO => v,
        _ => Decimal::ZERO,
    }
}

/// Converts an optional float. `None`, NaN, infinities and negatives are zero.
pub fn coerce_f64(raw: Option<f64>) -> Decimal {
    match raw {
        Some(v) if v.is_finite() && v >= 0.0 => Decimal::from_f64(v).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Converts any JSON scalar.
pub fn coerce_json(raw: &Value) -> Decimal {
    match raw {
        Value::Number(n) => coerce_f64(n.as_f64()),
        Value::String(s) => coerce_str(s),
        _ => Decimal::ZERO,
    }
}

/// Parses a human-formatted magnitude such as `2.95T`, `812.4B`, `4,512M` or `1.2K`.
///
/// Returns `None` when the text is not a number with an optional suffix.
pub fn parse_magnitude(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'T' => (&cleaned[..cleaned.len() - 1], Decimal::from(1_000_000_000_000u64)),
        'B' => (&cleaned[..cleaned.len() - 1], Decimal::from(1_000_000_000u64)),
        'M' => (&cleaned[..cleaned.len() - 1], Decimal::from(1_000_000u64)),
        'K' => (&cleaned[..cleaned.len() - 1], Decimal::from(1_000u64)),
        _ => (cleaned.as_str(), Decimal::ONE),
    };

    let value = Decimal::from_str(digits.trim()).ok()?;
    value.checked_mul(multiplier)
}
