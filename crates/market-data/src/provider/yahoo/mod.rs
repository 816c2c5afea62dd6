//! Yahoo Finance provider (structured JSON endpoints).
//!
//! - Daily series via the v8 chart API (query1, falling back to query2)
//! - Market capitalization via quoteSummary (needs a session crumb), then the
//!   search API as a crumb-free fallback

mod models;

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lazy_static::lazy_static;
use reqwest::{header, Client, StatusCode};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::{MarketDataError, OutcomeClass};
use crate::models::{coerce_f64, Capability, DailyObservation, DateRange, ProviderOutcome, Symbol};
use crate::provider::http::{build_client, fetch_json, send_error, BROWSER_USER_AGENT};
use crate::provider::{
    check_market_cap, ProviderCapabilities, ProviderShape, RateLimit, SourceProvider,
};

use models::{YahooChartResponse, YahooQuoteSummaryResponse, YahooSearchResponse};

const PROVIDER_ID: &str = "YAHOO";
const CHART_HOSTS: [&str; 2] = [
    "https://query1.finance.yahoo.com",
    "https://query2.finance.yahoo.com",
];

// ============================================================================
// Crumb/Cookie Authentication
// ============================================================================

/// Cached Yahoo authentication data
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

lazy_static! {
    /// Global cache for Yahoo authentication crumb
    static ref YAHOO_CRUMB: RwLock<Option<CrumbData>> = RwLock::default();
}

// ============================================================================
// Yahoo Provider
// ============================================================================

pub struct YahooProvider {
    client: Client,
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }

    // ========================================================================
    // Crumb/Cookie Authentication
    // ========================================================================

    async fn ensure_crumb(&self) -> Result<CrumbData, MarketDataError> {
        {
            let guard = YAHOO_CRUMB.read().unwrap_or_else(|p| p.into_inner());
            if let Some(crumb) = guard.as_ref() {
                return Ok(crumb.clone());
            }
        }
        self.fetch_crumb().await
    }

    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        // fc.yahoo.com answers 404 but still sets the session cookie
        let response = self
            .client
            .get("https://fc.yahoo.com")
            .send()
            .await
            .map_err(|e| send_error(PROVIDER_ID, e))?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| MarketDataError::Blocked {
                provider: PROVIDER_ID.to_string(),
                reason: "no session cookie issued".to_string(),
            })?;

        let response = self
            .client
            .get("https://query1.finance.yahoo.com/v1/test/getcrumb")
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| send_error(PROVIDER_ID, e))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        let crumb = response
            .text()
            .await
            .map_err(|e| send_error(PROVIDER_ID, e))?;

        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketDataError::Blocked {
                provider: PROVIDER_ID.to_string(),
                reason: "crumb endpoint refused".to_string(),
            });
        }

        let crumb_data = CrumbData { cookie, crumb };
        let mut guard = YAHOO_CRUMB.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(crumb_data.clone());

        Ok(crumb_data)
    }

    fn clear_crumb(&self) {
        let mut guard = YAHOO_CRUMB.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    // ========================================================================
    // Daily series
    // ========================================================================

    fn parse_chart(
        symbol: &Symbol,
        response: YahooChartResponse,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        if let Some(err) = response.chart.error {
            let code = err.code.unwrap_or_default();
            if code.eq_ignore_ascii_case("Not Found") {
                return Err(MarketDataError::SymbolNotFound(symbol.to_string()));
            }
            return Err(MarketDataError::malformed(
                PROVIDER_ID,
                format!("{}: {}", code, err.description.unwrap_or_default()),
            ));
        }

        let result = response
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "empty chart result"))?;

        let gmtoffset = result.meta.as_ref().map(|m| m.gmtoffset).unwrap_or(0);
        let quote = result
            .indicators
            .and_then(|mut i| if i.quote.is_empty() { None } else { Some(i.quote.remove(0)) })
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "missing quote indicators"))?;

        let mut rows = Vec::with_capacity(result.timestamp.len());
        for (idx, ts) in result.timestamp.iter().enumerate() {
            let Some(date) = exchange_date(*ts, gmtoffset) else {
                continue;
            };
            if !range.contains(date) {
                continue;
            }
            let close = quote.close.get(idx).copied().flatten();
            if close.is_none() {
                continue;
            }
            let volume = quote.volume.get(idx).copied().flatten();
            rows.push(DailyObservation::new(
                date,
                symbol.clone(),
                coerce_f64(close),
                coerce_f64(volume),
                PROVIDER_ID,
            ));
        }

        if rows.is_empty() {
            return Err(MarketDataError::NoDataForRange);
        }
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Ok(rows)
    }

    async fn fetch_daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> Result<Vec<DailyObservation>, MarketDataError> {
        let period1 = range.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // Pad a day so the end date survives exchange-timezone shifts
        let period2 = (range.end + chrono::Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let mut last_err = None;
        for host in CHART_HOSTS {
            let url = format!(
                "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
                host,
                encode(&symbol.dashed()),
                period1,
                period2
            );
            debug!("Yahoo chart request: {}", url);

            match fetch_json::<YahooChartResponse>(PROVIDER_ID, self.client.get(&url)).await {
                Ok(response) => return Self::parse_chart(symbol, response, range),
                // Only a transient failure is worth the second host
                Err(e) if e.outcome_class() == OutcomeClass::Transient => {
                    warn!("Yahoo chart host {} failed: {}", host, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(MarketDataError::NoDataForRange))
    }

    // ========================================================================
    // Market cap
    // ========================================================================

    fn parse_quote_summary(response: YahooQuoteSummaryResponse) -> Option<f64> {
        let result = response.quote_summary.result.into_iter().next()?;
        [result.price, result.summary_detail]
            .into_iter()
            .flatten()
            .filter_map(|holder| holder.market_cap.and_then(|m| m.raw))
            .find(|v| *v > 0.0)
    }

    fn parse_search(symbol: &Symbol, response: YahooSearchResponse) -> Option<f64> {
        let wanted = symbol.dashed();
        response
            .quotes
            .into_iter()
            .filter(|q| {
                q.symbol
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(&wanted))
            })
            .find_map(|q| q.market_cap)
    }

    async fn fetch_quote_summary_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let crumb = self.ensure_crumb().await?;
        let url = format!(
            "https://query1.finance.yahoo.com/v10/finance/quoteSummary/{}?modules=price,summaryDetail&crumb={}",
            encode(&symbol.dashed()),
            encode(&crumb.crumb)
        );

        let request = self
            .client
            .get(&url)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .header(header::COOKIE, &crumb.cookie);

        let response: YahooQuoteSummaryResponse = match fetch_json(PROVIDER_ID, request).await {
            Ok(r) => r,
            Err(e @ MarketDataError::Blocked { .. }) => {
                // Crumb expired or was revoked
                self.clear_crumb();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let raw = Self::parse_quote_summary(response)
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "no marketCap in quoteSummary"))?;
        check_market_cap(PROVIDER_ID, coerce_f64(Some(raw)))
    }

    async fn fetch_search_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let url = format!(
            "https://query2.finance.yahoo.com/v1/finance/search?q={}&quotesCount=5&newsCount=0",
            encode(&symbol.dashed())
        );
        let response: YahooSearchResponse = fetch_json(PROVIDER_ID, self.client.get(&url)).await?;
        let raw = Self::parse_search(symbol, response)
            .ok_or_else(|| MarketDataError::malformed(PROVIDER_ID, "no marketCap in search"))?;
        check_market_cap(PROVIDER_ID, coerce_f64(Some(raw)))
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        match self.fetch_quote_summary_cap(symbol).await {
            Ok(value) => Ok(value),
            Err(e @ MarketDataError::RateLimited { .. }) => Err(e),
            Err(e) => {
                debug!("Yahoo quoteSummary failed for {}: {}, trying search", symbol, e);
                self.fetch_search_cap(symbol).await
            }
        }
    }
}

/// Calendar date at the exchange for a UTC epoch second.
fn exchange_date(ts: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts + gmtoffset, 0).map(|dt| dt.date_naive())
}

#[async_trait]
impl SourceProvider for YahooProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self, capability: Capability) -> u8 {
        match capability {
            Capability::DailySeries => 2,
            Capability::MarketCap => 1,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // 2024-01-02 .. 2024-01-04, 14:30 UTC opens, New York offset
    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"gmtoffset": -18000, "regularMarketPrice": 181.91},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {"quote": [{
                    "close": [185.64, null, 181.91],
                    "volume": [82488700, 58414500, 71983600]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_skips_null_closes() {
        let response: YahooChartResponse = serde_json::from_str(CHART).unwrap();
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let rows = YahooProvider::parse_chart(&Symbol::new("AAPL"), response, &range).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d("2024-01-02"));
        assert_eq!(rows[0].price, dec!(185.64));
        assert_eq!(rows[1].date, d("2024-01-04"));
        assert_eq!(rows[1].volume, dec!(71983600));
    }

    #[test]
    fn test_parse_chart_filters_range() {
        let response: YahooChartResponse = serde_json::from_str(CHART).unwrap();
        let range = DateRange::new(d("2024-01-04"), d("2024-01-04")).unwrap();
        let rows = YahooProvider::parse_chart(&Symbol::new("AAPL"), response, &range).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, d("2024-01-04"));
    }

    #[test]
    fn test_parse_chart_not_found() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let err = YahooProvider::parse_chart(&Symbol::new("ZZZZ"), response, &range).unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound(_)));
    }

    #[test]
    fn test_parse_quote_summary_prefers_price_module() {
        let body = r#"{"quoteSummary": {"result": [{
            "price": {"marketCap": {"raw": 2950000000000, "fmt": "2.95T"}},
            "summaryDetail": {"marketCap": {"raw": 1}}
        }], "error": null}}"#;
        let response: YahooQuoteSummaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            YahooProvider::parse_quote_summary(response),
            Some(2950000000000.0)
        );
    }

    #[test]
    fn test_parse_quote_summary_empty_object() {
        let body = r#"{"quoteSummary": {"result": [{
            "price": {"marketCap": {}},
            "summaryDetail": {"marketCap": {"raw": 812400000000}}
        }]}}"#;
        let response: YahooQuoteSummaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            YahooProvider::parse_quote_summary(response),
            Some(812400000000.0)
        );
    }

    #[test]
    fn test_parse_search_matches_symbol() {
        let body = r#"{"quotes": [
            {"symbol": "BRK-A", "marketCap": 900000000000},
            {"symbol": "BRK-B", "marketCap": 880000000000}
        ]}"#;
        let response: YahooSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            YahooProvider::parse_search(&Symbol::new("BRK.B"), response),
            Some(880000000000.0)
        );
    }

    #[test]
    fn test_exchange_date_applies_offset() {
        // 2024-01-03 03:00 UTC is still 2024-01-02 in New York
        assert_eq!(exchange_date(1704250800, -18000), Some(d("2024-01-02")));
    }
}
