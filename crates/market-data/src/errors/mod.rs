//! Error types and outcome classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The error enum used inside provider adapters
//! - [`OutcomeClass`]: How an error maps onto a [`ProviderOutcome`](crate::models::ProviderOutcome)

mod class;

pub use class::OutcomeClass;

use thiserror::Error;

/// Errors that can occur while talking to a market data source.
///
/// Provider adapters use this type for their internal plumbing. It never
/// crosses the provider trait boundary: every error is classified via
/// [`outcome_class`](Self::outcome_class) and folded into a
/// [`ProviderOutcome`](crate::models::ProviderOutcome).
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The requested symbol was not found by the provider.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The symbol exists but has no observations in the requested period.
    #[error("No data for date range")]
    NoDataForRange,

    /// The provider throttled the request (HTTP 429 or a vendor note).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The provider actively refused the request (auth wall, consent page, 403).
    #[error("Blocked by {provider}: {reason}")]
    Blocked {
        /// The provider that refused the request
        provider: String,
        /// What the refusal looked like
        reason: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The response did not match the expected schema, or no extraction
    /// strategy produced a value.
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse {
        /// The provider that returned the response
        provider: String,
        /// What did not match
        message: String,
    },

    /// A value was extracted but lies outside sane bounds.
    #[error("Data quality anomaly from {provider}: {message}")]
    DataQualityAnomaly {
        /// The provider that produced the value
        provider: String,
        /// Description of the anomaly
        message: String,
    },

    /// A provider-specific server-side failure (5xx and similar).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider does not implement the requested capability.
    #[error("{provider} does not support {capability}")]
    NotSupported {
        /// The provider asked
        provider: String,
        /// The capability requested
        capability: String,
    },

    /// The requested date range is inverted.
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the outcome classification for this error.
    ///
    /// - [`OutcomeClass::RateLimited`]: back off, then retry or advance
    /// - [`OutcomeClass::Blocked`]: skip this provider for the rest of the call
    /// - [`OutcomeClass::Transient`]: network-level failure, advance
    /// - [`OutcomeClass::Empty`]: nothing usable, advance
    ///
    /// # Examples
    ///
    /// ```
    /// use capindex_market_data::errors::{MarketDataError, OutcomeClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "YAHOO".to_string() };
    /// assert_eq!(error.outcome_class(), OutcomeClass::RateLimited);
    ///
    /// let error = MarketDataError::SymbolNotFound("INVALID".to_string());
    /// assert_eq!(error.outcome_class(), OutcomeClass::Empty);
    /// ```
    pub fn outcome_class(&self) -> OutcomeClass {
        match self {
            Self::RateLimited { .. } => OutcomeClass::RateLimited,

            Self::Blocked { .. } => OutcomeClass::Blocked,

            Self::Timeout { .. } | Self::ProviderError { .. } | Self::Network(_) => {
                OutcomeClass::Transient
            }

            // Schema mismatches and bad values are treated as "no data"
            Self::SymbolNotFound(_)
            | Self::NoDataForRange
            | Self::MalformedResponse { .. }
            | Self::DataQualityAnomaly { .. }
            | Self::NotSupported { .. }
            | Self::InvalidRange(_) => OutcomeClass::Empty,
        }
    }

    /// Convenience constructor for schema mismatches.
    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
