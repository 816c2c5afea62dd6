//! Market data domain models.

use capindex_market_data::{DailyObservation, DateRange};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};

/// Persisted row, uniquely keyed by `(date, symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub price: Decimal,
    pub market_cap: Decimal,
    pub volume: Decimal,
}

impl From<&DailyObservation> for MarketDataRecord {
    fn from(obs: &DailyObservation) -> Self {
        Self {
            date: obs.date,
            symbol: obs.symbol.as_str().to_string(),
            price: obs.price,
            market_cap: obs.market_cap,
            volume: obs.volume,
        }
    }
}

/// Query for stored observations, as accepted on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Comma-separated symbols, e.g. `AAPL,MSFT`.
    pub symbols: Option<String>,
}

impl MarketDataQuery {
    /// Days covered when only one bound is given.
    pub const DEFAULT_SPAN_DAYS: i64 = 30;

    /// Resolves missing bounds: `end` defaults to `today`, `start` to
    /// [`Self::DEFAULT_SPAN_DAYS`] before `end`.
    pub fn range(&self, today: NaiveDate) -> Result<DateRange> {
        let end = self.end_date.unwrap_or(today);
        let start = self
            .start_date
            .unwrap_or_else(|| end - Duration::days(Self::DEFAULT_SPAN_DAYS));
        DateRange::new(start, end).map_err(|e| ValidationError::InvalidInput(e.to_string()).into())
    }

    /// Upper-cased symbol filter, `None` when absent or blank.
    pub fn symbol_list(&self) -> Option<Vec<String>> {
        let list: Vec<String> = self
            .symbols
            .as_deref()?
            .split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if list.is_empty() {
            None
        } else {
            Some(list)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_range_defaults() {
        let query = MarketDataQuery::default();
        let range = query.range(d(2024, 3, 31)).unwrap();
        assert_eq!(range.start, d(2024, 3, 1));
        assert_eq!(range.end, d(2024, 3, 31));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let query = MarketDataQuery {
            start_date: Some(d(2024, 2, 1)),
            end_date: Some(d(2024, 1, 1)),
            symbols: None,
        };
        assert!(query.range(d(2024, 3, 31)).is_err());
    }

    #[test]
    fn test_symbol_list_parsing() {
        let query = MarketDataQuery {
            symbols: Some(" aapl, ,MSFT ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.symbol_list(),
            Some(vec!["AAPL".to_string(), "MSFT".to_string()])
        );

        let blank = MarketDataQuery {
            symbols: Some(" , ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.symbol_list(), None);
    }
}
