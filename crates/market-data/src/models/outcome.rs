use log::{debug, warn};
use serde::Serialize;

use crate::errors::{MarketDataError, OutcomeClass};

/// Result of a single provider attempt.
///
/// This is the only thing a provider hands back across its trait boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProviderOutcome<T> {
    Success(T),
    Empty,
    RateLimited,
    Blocked,
    TransientError(String),
}

impl<T> ProviderOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success(_))
    }

    /// Short reason used in diagnostics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderOutcome::Success(_) => "success",
            ProviderOutcome::Empty => "empty",
            ProviderOutcome::RateLimited => "rate limited",
            ProviderOutcome::Blocked => "blocked",
            ProviderOutcome::TransientError(_) => "transient error",
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProviderOutcome<U> {
        match self {
            ProviderOutcome::Success(v) => ProviderOutcome::Success(f(v)),
            ProviderOutcome::Empty => ProviderOutcome::Empty,
            ProviderOutcome::RateLimited => ProviderOutcome::RateLimited,
            ProviderOutcome::Blocked => ProviderOutcome::Blocked,
            ProviderOutcome::TransientError(m) => ProviderOutcome::TransientError(m),
        }
    }

    /// Folds an adapter's internal error into its outcome class.
    ///
    /// Outcomes other than `TransientError` carry no message, so the detail
    /// is logged here before it is dropped.
    pub fn from_error(err: &MarketDataError) -> Self {
        match err {
            MarketDataError::DataQualityAnomaly { .. } => warn!("{}", err),
            MarketDataError::MalformedResponse { .. } | MarketDataError::Blocked { .. } => {
                debug!("{}", err)
            }
            _ => {}
        }

        match err.outcome_class() {
            OutcomeClass::RateLimited => ProviderOutcome::RateLimited,
            OutcomeClass::Blocked => ProviderOutcome::Blocked,
            OutcomeClass::Transient => ProviderOutcome::TransientError(err.to_string()),
            OutcomeClass::Empty => ProviderOutcome::Empty,
        }
    }

    pub fn from_result(result: Result<T, MarketDataError>) -> Self {
        match result {
            Ok(value) => ProviderOutcome::Success(value),
            Err(err) => Self::from_error(&err),
        }
    }
}

impl<T> ProviderOutcome<Vec<T>> {
    /// Like [`from_result`](Self::from_result), but an empty payload is `Empty`.
    pub fn from_series(result: Result<Vec<T>, MarketDataError>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => ProviderOutcome::Empty,
            other => Self::from_result(other),
        }
    }
}
