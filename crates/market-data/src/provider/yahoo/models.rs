//! Yahoo Finance API response models.
//!
//! Only the fields the provider reads are modelled; everything else is ignored.

use serde::Deserialize;

// ============================================================================
// chart v8
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    pub result: Option<Vec<YahooChartResult>>,
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooApiError {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartResult {
    pub meta: Option<YahooChartMeta>,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartMeta {
    #[serde(default)]
    pub gmtoffset: i64,
    pub regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooQuoteIndicator>,
}

/// Arrays are aligned with `timestamp`; holidays and halts show up as `null`.
#[derive(Debug, Deserialize)]
pub struct YahooQuoteIndicator {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

// ============================================================================
// quoteSummary v10
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResponse {
    pub quote_summary: YahooQuoteSummary,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteSummary {
    #[serde(default)]
    pub result: Vec<YahooQuoteSummaryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResult {
    pub price: Option<YahooMarketCapHolder>,
    pub summary_detail: Option<YahooMarketCapHolder>,
}

/// Both `price` and `summaryDetail` carry `marketCap` as `{"raw": .., "fmt": ..}`,
/// or as an empty object when Yahoo has no value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooMarketCapHolder {
    pub market_cap: Option<YahooRawValue>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YahooRawValue {
    pub raw: Option<f64>,
}

// ============================================================================
// search v1
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooSearchResponse {
    #[serde(default)]
    pub quotes: Vec<YahooSearchQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSearchQuote {
    pub symbol: Option<String>,
    pub market_cap: Option<f64>,
}
