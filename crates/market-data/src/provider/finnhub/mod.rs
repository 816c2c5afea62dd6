//! Finnhub provider.
//!
//! - Daily series via /stock/candle
//! - Market capitalization via /stock/metric (`metric.marketCapitalization`,
//!   reported in millions)
//!
//! Finnhub free tier is limited to 60 API calls per minute, and candles are
//! premium on new keys (answered with 403, which classifies as blocked).

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{coerce_f64, Capability, DailyObservation, DateRange, ProviderOutcome, Symbol};
use crate::provider::http::{build_client, fetch_text};
use crate::provider::{
    check_market_cap, ProviderCapabilities, ProviderShape, RateLimit, SourceProvider,
};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "FINNHUB";

pub struct FinnhubProvider {
    client: Client,
    api_key: String,
}

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /stock/candle. `s` is "ok" or "no_data".
#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(default)]
    c: Vec<Option<f64>>,
    #[serde(default)]
    v: Vec<Option<f64>>,
    #[serde(default)]
    t: Vec<i64>,
    s: String,
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    metric: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metrics {
    market_capitalization: Option<f64>,
}

impl FinnhubProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_client(),
            api_key,
        }
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let url = format!("{}{}", BASE_URL, endpoint);
        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        // API key as header rather than query param
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(params);
        fetch_text(PROVIDER_ID, request).await
    }

    fn parse_candles(
        symbol: &Symbol,
        body: &str,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let response: CandleResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;

        if response.s != "ok" {
            return Err(MarketDataError::NoDataForRange);
        }

        let mut rows: Vec<DailyObservation> = response
            .t
            .iter()
            .enumerate()
            .filter_map(|(idx, ts)| {
                let date = DateTime::<Utc>::from_timestamp(*ts, 0)?.date_naive();
                let close = response.c.get(idx).copied().flatten();
                if !range.contains(date) || close.is_none() {
                    return None;
                }
                Some(DailyObservation::new(
                    date,
                    symbol.clone(),
                    coerce_f64(close),
                    coerce_f64(response.v.get(idx).copied().flatten()),
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

    fn parse_metric(body: &str) -> Result<Decimal, MarketDataError> {
        let response: MetricResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;
        let millions = response
            .metric
            .and_then(|m| m.market_capitalization)
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "no marketCapitalization"))?;
        let value = coerce_f64(Some(millions)) * Decimal::from(1_000_000u32);
        check_market_cap(PROVIDER_ID, value)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let from = range.start.and_time(NaiveTime::MIN).and_utc().timestamp().to_string();
        let to = (range.end + chrono::Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp()
            .to_string();
        let ticker = symbol.dotted();
        let body = self
            .fetch(
                "/stock/candle",
                &[("symbol", ticker.as_str()), ("resolution", "D"), ("from", from.as_str()), ("to", to.as_str())],
            )
            .await?;
        Self::parse_candles(symbol, &body, range)
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let ticker = symbol.dotted();
        let body = self
            .fetch("/stock/metric", &[("symbol", ticker.as_str()), ("metric", "all")])
            .await?;
        Self::parse_metric(&body)
    }
}

#[async_trait]
impl SourceProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self, capability: Capability) -> u8 {
        match capability {
            Capability::DailySeries => 4,
            Capability::MarketCap => 3,
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
        RateLimit::from_secs(2)
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
