//! Polygon.io provider.
//!
//! - Daily series via v2 aggregates (`results[].t` in epoch millis, `c`, `v`)
//! - Market capitalization via v3 ticker reference (`results.market_cap`)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{coerce_f64, Capability, DailyObservation, DateRange, ProviderOutcome, Symbol};
use crate::provider::http::{build_client, fetch_text};
use crate::provider::{
    check_market_cap, ProviderCapabilities, ProviderShape, RateLimit, SourceProvider,
};

const BASE_URL: &str = "https://api.polygon.io";
const PROVIDER_ID: &str = "POLYGON";

pub struct PolygonProvider {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    error: Option<String>,
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    t: i64,
    c: Option<f64>,
    v: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    status: Option<String>,
    error: Option<String>,
    results: Option<TickerDetails>,
}

#[derive(Debug, Deserialize)]
struct TickerDetails {
    market_cap: Option<f64>,
}

impl PolygonProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_client(),
            api_key,
        }
    }

    fn check_status(status: &Option<String>, error: &Option<String>) -> Result<(), MarketDataError> {
        match status.as_deref() {
            Some("NOT_AUTHORIZED") => Err(MarketDataError::Blocked {
                provider: PROVIDER_ID.to_string(),
                reason: error.clone().unwrap_or_else(|| "not authorized".to_string()),
            }),
            Some("ERROR") => {
                let message = error.clone().unwrap_or_default();
                if message.contains("exceeded the maximum requests") {
                    Err(MarketDataError::RateLimited {
                        provider: PROVIDER_ID.to_string(),
                    })
                } else {
                    Err(MarketDataError::ProviderError {
                        provider: PROVIDER_ID.to_string(),
                        message,
                    })
                }
            }
            _ => Ok(()),
        }
    }

    fn parse_aggs(
        symbol: &Symbol,
        body: &str,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let response: AggsResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;
        Self::check_status(&response.status, &response.error)?;

        let mut rows: Vec<DailyObservation> = response
            .results
            .into_iter()
            .filter_map(|bar| {
                let date: NaiveDate = DateTime::<Utc>::from_timestamp_millis(bar.t)?.date_naive();
                if !range.contains(date) || bar.c.is_none() {
                    return None;
                }
                Some(DailyObservation::new(
                    date,
                    symbol.clone(),
                    coerce_f64(bar.c),
                    coerce_f64(bar.v),
                    PROVIDER_ID,
                ))
            })
            .collect();

        if rows.is_empty() {
            return Err(MarketDataError::NoDataForRange);
        }
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    fn parse_ticker(body: &str) -> Result<Decimal, MarketDataError> {
        let response: TickerResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;
        Self::check_status(&response.status, &response.error)?;

        let raw = response
            .results
            .and_then(|r| r.market_cap)
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "no market_cap in ticker details"))?;
        check_market_cap(PROVIDER_ID, coerce_f64(Some(raw)))
    }

    async fn fetch_daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            BASE_URL,
            encode(&symbol.dotted()),
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        );
        debug!("Polygon aggs request: {}", url);

        let request = self.client.get(&url).query(&[
            ("adjusted", "true"),
            ("sort", "asc"),
            ("limit", "50000"),
            ("apiKey", self.api_key.as_str()),
        ]);
        let body = fetch_text(PROVIDER_ID, request).await?;
        Self::parse_aggs(symbol, &body, range)
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let url = format!(
            "{}/v3/reference/tickers/{}",
            BASE_URL,
            encode(&symbol.dotted())
        );
        let request = self.client.get(&url).query(&[("apiKey", self.api_key.as_str())]);
        let body = fetch_text(PROVIDER_ID, request).await?;
        Self::parse_ticker(&body)
    }
}

#[async_trait]
impl SourceProvider for PolygonProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self, capability: Capability) -> u8 {
        match capability {
            Capability::DailySeries => 3,
            Capability::MarketCap => 5,
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            daily_series: true,
            market_cap: true,
            shape: ProviderShape::StructuredApi,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Free tier: 5 requests per minute
        RateLimit::from_secs(12)
    }

    async fn daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> ProviderOutcome<Vec<DailyObservation>> {
        ProviderOutcome::from_series(self.fetch_daily_series(symbol, range).await)
    }

    async fn market_cap(&self, symbol: &Symbol) -> ProviderOutcome<Decimal> {
        ProviderOutcome::from_result(self.fetch_market_cap(symbol).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_aggs() {
        let body = r#"{
            "ticker": "AAPL", "status": "OK", "resultsCount": 2,
            "results": [
                {"v": 82488700, "o": 187.15, "c": 185.64, "t": 1704171600000},
                {"v": 58414500, "o": 184.22, "c": 184.25, "t": 1704258000000}
            ]
        }"#;
        let range = DateRange::new(d("2024-01-02"), d("2024-01-03")).unwrap();
        let rows = PolygonProvider::parse_aggs(&Symbol::new("AAPL"), body, &range).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d("2024-01-02"));
        assert_eq!(rows[1].price, dec!(184.25));
        assert_eq!(rows[1].source, "POLYGON");
    }

    #[test]
    fn test_empty_results_is_no_data() {
        let body = r#"{"ticker": "AAPL", "status": "OK", "resultsCount": 0}"#;
        let range = DateRange::new(d("2024-01-02"), d("2024-01-03")).unwrap();
        let err = PolygonProvider::parse_aggs(&Symbol::new("AAPL"), body, &range).unwrap_err();
        assert!(matches!(err, MarketDataError::NoDataForRange));
    }

    #[test]
    fn test_request_cap_is_rate_limited() {
        let body = r#"{"status": "ERROR", "error": "You've exceeded the maximum requests per minute."}"#;
        let err = PolygonProvider::parse_ticker(body).unwrap_err();
        assert!(matches!(err, MarketDataError::RateLimited { .. }));
    }

    #[test]
    fn test_not_authorized_is_blocked() {
        let body = r#"{"status": "NOT_AUTHORIZED", "error": "Your plan doesn't include this data timeframe."}"#;
        let err = PolygonProvider::parse_ticker(body).unwrap_err();
        assert!(matches!(err, MarketDataError::Blocked { .. }));
    }

    #[test]
    fn test_parse_ticker_market_cap() {
        let body = r#"{"status": "OK", "results": {"ticker": "AAPL", "market_cap": 2950000000000.0}}"#;
        assert_eq!(
            PolygonProvider::parse_ticker(body).unwrap(),
            dec!(2950000000000)
        );
    }
}
