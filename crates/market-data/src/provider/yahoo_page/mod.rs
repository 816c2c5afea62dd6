//! Yahoo quote page scraper.
//!
//! Fetches the public quote page and pulls the market cap out of the HTML
//! with an ordered list of [`ExtractionStrategy`] values. The first strategy
//! whose value lands inside the sane market-cap bounds wins.

mod strategies;

use async_trait::async_trait;
use reqwest::{header, Client};
use rust_decimal::Decimal;
use tracing::debug;
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{Capability, ProviderOutcome, Symbol};
use crate::provider::http::{build_client, fetch_text};
use crate::provider::{ProviderCapabilities, ProviderShape, RateLimit, SourceProvider};

pub use strategies::{default_strategies, extract_market_cap, ExtractionStrategy, ValueFormat};

const PROVIDER_ID: &str = "YAHOO_PAGE";
const QUOTE_PAGE_URL: &str = "https://finance.yahoo.com/quote";

/// Markers of the consent/robot wall served instead of the quote page.
const BLOCK_MARKERS: [&str; 4] = [
    "consent.yahoo.com",
    "guce.yahoo.com",
    "Will be right back",
    "captcha",
];

pub struct YahooPageProvider {
    client: Client,
    strategies: Vec<ExtractionStrategy>,
}

impl Default for YahooPageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooPageProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(),
            strategies: default_strategies(),
        }
    }

    fn check_blocked(document: &str) -> Result<(), MarketDataError> {
        if let Some(marker) = BLOCK_MARKERS.iter().find(|m| document.contains(*m)) {
            return Err(MarketDataError::Blocked {
                provider: PROVIDER_ID.to_string(),
                reason: format!("page contains '{}'", marker),
            });
        }
        Ok(())
    }

    async fn fetch_market_cap(&self, symbol: &Symbol) -> Result<Decimal, MarketDataError> {
        let url = format!("{}/{}/", QUOTE_PAGE_URL, encode(&symbol.dashed()));
        debug!("Yahoo quote page request: {}", url);

        let request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
        let document = fetch_text(PROVIDER_ID, request).await?;

        Self::check_blocked(&document)?;
        extract_market_cap(PROVIDER_ID, &document, &self.strategies)
    }
}

#[async_trait]
impl SourceProvider for YahooPageProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self, _capability: Capability) -> u8 {
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            daily_series: false,
            market_cap: true,
            shape: ProviderShape::DocumentScrape,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::from_secs(2)
    }

    async fn market_cap(&self, symbol: &Symbol) -> ProviderOutcome<Decimal> {
        ProviderOutcome::from_result(self.fetch_market_cap(symbol).await)
    }
}
