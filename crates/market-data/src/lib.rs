//! Capindex Market Data Crate
//!
//! Provider-agnostic acquisition of daily equity observations and current
//! market capitalizations.
//!
//! # Overview
//!
//! - Several source providers: Alpha Vantage, Yahoo (chart API and quote page),
//!   Polygon, Finnhub
//! - Uniform classified outcomes (success, empty, rate limited, blocked, transient)
//! - A provider chain per capability with request spacing, backoff and deadlines
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  ProviderChain   |  (priority order, spacing, backoff, deadline)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |  SourceProvider  |  (structured API or document scrape)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | ProviderOutcome  |  (Success / Empty / RateLimited / Blocked / TransientError)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Symbol`] - Normalized ticker
//! - [`DateRange`] - Inclusive calendar range
//! - [`DailyObservation`] - One symbol on one trading day
//! - [`ProviderOutcome`] - Classified result of a provider call
//! - [`ProviderChain`] - Ordered fallback across providers

pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

pub use errors::{MarketDataError, OutcomeClass};

pub use models::{
    coerce_f64, coerce_json, coerce_str, parse_magnitude, Capability, DailyObservation, DateRange,
    MarketCapQuote, ProviderId, ProviderOutcome, Symbol,
};

pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::polygon::PolygonProvider;
pub use provider::yahoo::YahooProvider;
pub use provider::yahoo_page::YahooPageProvider;
pub use provider::{
    check_market_cap, default_providers, ProviderCapabilities, ProviderKeys, ProviderShape,
    RateLimit, SourceProvider, MAX_MARKET_CAP, MIN_MARKET_CAP,
};

pub use registry::{
    BackoffPolicy, ChainConfig, FetchDiagnostics, ProviderAttempt, ProviderChain, ProviderSummary,
    RateLimiter, SeriesValidator, SkipReason, ValidationReport,
};
