//! Provider capabilities and request spacing configuration.

use std::time::Duration;

use serde::Serialize;

use crate::models::Capability;

/// How a provider obtains its values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderShape {
    /// Parses a documented JSON schema.
    StructuredApi,
    /// Extracts values embedded in an HTML document.
    DocumentScrape,
}

/// Describes what a provider can do.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub daily_series: bool,
    pub market_cap: bool,
    pub shape: ProviderShape,
}

impl ProviderCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::DailySeries => self.daily_series,
            Capability::MarketCap => self.market_cap,
        }
    }
}

/// Request spacing for a provider endpoint.
///
/// The slow primary source needs long spacing (Alpha Vantage free tier allows
/// five calls a minute); secondary and scraping sources need less.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Minimum time between two requests on the same endpoint key.
    pub min_spacing: Duration,
}

impl RateLimit {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            min_spacing: Duration::from_secs(secs),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_secs(1),
        }
    }
}
