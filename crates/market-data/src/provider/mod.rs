//! Source provider abstractions and implementations.
//!
//! This module contains:
//! - The `SourceProvider` trait every source adapter implements
//! - Provider capabilities and request spacing configuration
//! - Shared HTTP status classification and market-cap bounds
//! - Concrete adapters (Alpha Vantage, Yahoo, Yahoo quote page, Polygon, Finnhub)
//!
//! Adapters come in two shapes. Structured-API adapters parse a known JSON
//! schema; document-scraping adapters run an ordered list of extraction
//! strategies over a free-form page. The provider chain cannot tell them apart.

mod bounds;
mod capabilities;
pub(crate) mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod polygon;
pub mod yahoo;
pub mod yahoo_page;

// Re-exports
pub use bounds::{check_market_cap, MAX_MARKET_CAP, MIN_MARKET_CAP};
pub use capabilities::{ProviderCapabilities, ProviderShape, RateLimit};
pub use traits::SourceProvider;

use std::sync::Arc;

/// API keys for the keyed providers. A missing key leaves that provider out.
#[derive(Clone, Debug, Default)]
pub struct ProviderKeys {
    pub alpha_vantage: Option<String>,
    pub polygon: Option<String>,
    pub finnhub: Option<String>,
}

/// The standard provider set. Yahoo endpoints need no key and are always present.
pub fn default_providers(keys: &ProviderKeys) -> Vec<Arc<dyn SourceProvider>> {
    let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();

    if let Some(key) = keys.alpha_vantage.as_ref().filter(|k| !k.is_empty()) {
        providers.push(Arc::new(alpha_vantage::AlphaVantageProvider::new(key.clone())));
    }
    providers.push(Arc::new(yahoo::YahooProvider::new()));
    providers.push(Arc::new(yahoo_page::YahooPageProvider::new()));
    if let Some(key) = keys.polygon.as_ref().filter(|k| !k.is_empty()) {
        providers.push(Arc::new(polygon::PolygonProvider::new(key.clone())));
    }
    if let Some(key) = keys.finnhub.as_ref().filter(|k| !k.is_empty()) {
        providers.push(Arc::new(finnhub::FinnhubProvider::new(key.clone())));
    }

    providers
}
