//! Alpha Vantage provider.
//!
//! - Daily series via TIME_SERIES_DAILY_ADJUSTED
//! - Market capitalization via OVERVIEW
//!
//! Note: the free tier is limited to 5 API calls per minute, so this is the
//! slow primary source and gets the longest spacing.

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::errors::MarketDataError;
use crate::models::{
    coerce_str, Capability, DailyObservation, DateRange, ProviderOutcome, Symbol,
};
use crate::provider::http::{build_client, fetch_text};
use crate::provider::{
    check_market_cap, ProviderCapabilities, ProviderShape, RateLimit, SourceProvider,
};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Compact output covers the latest 100 data points.
const COMPACT_WINDOW_DAYS: i64 = 100;

pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============================================================================
// Response structures for Alpha Vantage API
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyBar>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: String,
    // Adjusted endpoint puts volume at 6, the plain one at 5
    #[serde(rename = "6. volume", alias = "5. volume")]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(rename = "MarketCapitalization")]
    market_capitalization: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

// ============================================================================
// Provider implementation
// ============================================================================

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            client: build_client(),
            api_key,
            base_url: base_url.to_string(),
        }
    }

    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(&self.base_url, &all_params).map_err(|e| {
            MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("Failed to build URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        fetch_text(PROVIDER_ID, self.client.get(url)).await
    }

    /// Alpha Vantage answers 200 even when throttled; the body says so.
    fn check_api_error(
        error_message: &Option<String>,
        note: &Option<String>,
        information: &Option<String>,
    ) -> Result<(), MarketDataError> {
        if let Some(ref msg) = error_message {
            if msg.contains("Invalid API call") || msg.contains("not found") {
                return Err(MarketDataError::SymbolNotFound(msg.clone()));
            }
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: msg.clone(),
            });
        }

        for msg in [note, information].into_iter().flatten() {
            if msg.contains("API call frequency")
                || msg.contains("rate limit")
                || msg.contains("requests per day")
            {
                return Err(MarketDataError::RateLimited {
                    provider: PROVIDER_ID.to_string(),
                });
            }
            if msg.contains("premium") {
                return Err(MarketDataError::Blocked {
                    provider: PROVIDER_ID.to_string(),
                    reason: "premium endpoint".to_string(),
                });
            }
            warn!("Alpha Vantage note: {}", msg);
        }

        Ok(())
    }

    fn parse_time_series(
        symbol: &Symbol,
        body: &str,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let response: TimeSeriesResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let series = response
            .time_series
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "missing time series"))?;

        let mut rows: Vec<DailyObservation> = series
            .into_iter()
            .filter_map(|(date_str, bar)| {
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?;
                if !range.contains(date) {
                    return None;
                }
                Some(DailyObservation::new(
                    date,
                    symbol.clone(),
                    coerce_str(&bar.close),
                    coerce_str(&bar.volume),
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

    fn parse_overview(body: &str) -> Result<Decimal, MarketDataError> {
        let response: OverviewResponse = serde_json::from_str(body)
            .map_err(|e| MarketDataError::malformed(PROVIDER_ID, e.to_string()))?;

        Self::check_api_error(
            &response.error_message,
            &response.note,
            &response.information,
        )?;

        let raw = response
            .market_capitalization
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "missing MarketCapitalization"))?;
        check_market_cap(PROVIDER_ID, coerce_str(&raw))
    }

    async fn fetch_daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let ticker = symbol.dotted();
        let today = chrono::Utc::now().date_naive();
        let output_size = if (today - range.start).num_days() < COMPACT_WINDOW_DAYS {
            "compact"
        } else {
            "full"
        };

        let body = self
            .fetch(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", ticker.as_str()),
                ("outputsize", output_size),
            ])
            .await?;
        Self::parse_time_series(symbol, &body, range)
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let ticker = symbol.dotted();
        let body = self
            .fetch(&[("function", "OVERVIEW"), ("symbol", ticker.as_str())])
            .await?;
        Self::parse_overview(&body)
    }
}

#[async_trait]
impl SourceProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self, capability: Capability) -> u8 {
        match capability {
            Capability::DailySeries => 1,
            Capability::MarketCap => 4,
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
