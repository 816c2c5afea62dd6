use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ProviderId, Symbol};

/// What a provider can be asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DailySeries,
    MarketCap,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::DailySeries => f.write_str("daily series"),
            Capability::MarketCap => f.write_str("market cap"),
        }
    }
}

/// One trading day for one symbol.
///
/// `(date, symbol)` is unique after normalization. When `estimated` is false,
/// every value came from the provider named in `source`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub price: Decimal,
    pub volume: Decimal,
    pub market_cap: Decimal,
    pub source: ProviderId,
    #[serde(default)]
    pub estimated: bool,
}

impl DailyObservation {
    /// A provider-reported row without a market cap yet.
    pub fn new(
        date: NaiveDate,
        symbol: Symbol,
        price: Decimal,
        volume: Decimal,
        source: &'static str,
    ) -> Self {
        Self {
            date,
            symbol,
            price,
            volume,
            market_cap: Decimal::ZERO,
            source: ProviderId::Borrowed(source),
            estimated: false,
        }
    }
}

/// A market capitalization together with the provider that reported it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCapQuote {
    pub symbol: Symbol,
    pub value: Decimal,
    pub source: ProviderId,
}
