use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::MarketDataError;
use crate::models::parse_magnitude;
use crate::provider::check_market_cap;

lazy_static! {
    static ref EMBEDDED_RAW: Regex =
        Regex::new(r#""marketCap"\s*:\s*\{\s*"raw"\s*:\s*([0-9]+(?:\.[0-9]+)?)"#).unwrap();
    static ref EMBEDDED_NUMBER: Regex =
        Regex::new(r#""marketCap"\s*:\s*([0-9]+(?:\.[0-9]+)?)"#).unwrap();
    static ref STREAMER_FIELD: Regex = Regex::new(
        r#"data-field="marketCap"[^>]*>\s*\$?([0-9][0-9.,]*\s*[KMBTkmbt]?)\s*<"#
    )
    .unwrap();
    static ref LABELLED_VALUE: Regex = Regex::new(
        r#"(?s)Market\s*Cap[^<]{0,40}</span>\s*<span[^>]*>\s*\$?([0-9][0-9.,]*\s*[KMBTkmbt]?)\s*<"#
    )
    .unwrap();
    static ref LOOSE_TEXT: Regex = Regex::new(
        r#"(?s)Market\s*Cap.{0,200}?([0-9]{1,3}(?:,[0-9]{3})*(?:\.[0-9]+)?[KMBT])\b"#
    )
    .unwrap();
}

/// How the captured text encodes the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// Plain dollars, e.g. `2950000000000`.
    Raw,
    /// Display format with optional thousand/million/billion/trillion suffix.
    Magnitude,
}

/// One way of finding a market cap in a document.
#[derive(Debug, Clone)]
pub struct ExtractionStrategy {
    pub name: &'static str,
    pattern: &'static Regex,
    format: ValueFormat,
}

impl ExtractionStrategy {
    /// Value of the first capture, if the pattern matches and parses.
    pub fn extract(&self, document: &str) -> Option<Decimal> {
        let captured = self.pattern.captures(document)?.get(1)?.as_str().trim();
        match self.format {
            ValueFormat::Raw => Decimal::from_str(captured).ok(),
            ValueFormat::Magnitude => parse_magnitude(&captured.replace(' ', "")),
        }
    }
}

/// Strategies in the order they are tried: embedded JSON first, visible text last.
pub fn default_strategies() -> Vec<ExtractionStrategy> {
    vec![
        ExtractionStrategy {
            name: "embedded_raw",
            pattern: &EMBEDDED_RAW,
            format: ValueFormat::Raw,
        },
        ExtractionStrategy {
            name: "embedded_number",
            pattern: &EMBEDDED_NUMBER,
            format: ValueFormat::Raw,
        },
        ExtractionStrategy {
            name: "streamer_field",
            pattern: &STREAMER_FIELD,
            format: ValueFormat::Magnitude,
        },
        ExtractionStrategy {
            name: "labelled_value",
            pattern: &LABELLED_VALUE,
            format: ValueFormat::Magnitude,
        },
        ExtractionStrategy {
            name: "loose_text",
            pattern: &LOOSE_TEXT,
            format: ValueFormat::Magnitude,
        },
    ]
}

/// Runs the strategies in order and returns the first in-bounds value.
///
/// Values outside the bounds are skipped, not accepted. If nothing usable is
/// found the result is a malformed-response error, which the provider reports
/// as `Empty`.
pub fn extract_market_cap(
    provider: &str,
    document: &str,
    strategies: &[ExtractionStrategy],
) -> Result<Decimal, MarketDataError> {
    let mut rejected = Vec::new();
    for strategy in strategies {
        let Some(value) = strategy.extract(document) else {
            continue;
        };
        match check_market_cap(provider, value) {
            Ok(v) => {
                debug!("{}: market cap {} via {}", provider, v, strategy.name);
                return Ok(v);
            }
            Err(_) => rejected.push(format!("{}={}", strategy.name, value)),
        }
    }

    if rejected.is_empty() {
        Err(MarketDataError::malformed(provider, "no extraction strategy matched"))
    } else {
        Err(MarketDataError::DataQualityAnomaly {
            provider: provider.to_string(),
            message: format!("out-of-bounds candidates: {}", rejected.join(", ")),
        })
    }
}
