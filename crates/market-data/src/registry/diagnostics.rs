//! Per-call diagnostics for the provider chain.

use serde::Serialize;

use crate::models::ProviderId;

/// Why a provider was passed over without a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Provider does not implement the capability.
    CapabilityNotSupported,

    /// The per-symbol deadline passed before this provider's turn.
    DeadlineExceeded,
}

/// Record of a single provider attempt during a chain call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    /// Outcome label for requests that went out ("empty", "blocked", ...).
    pub outcome: Option<String>,
    pub error: Option<String>,
    /// Rate-limit retries spent on this provider.
    pub retries: u32,
    pub success: bool,
}

/// Ordered record of what the chain did for one symbol and capability.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            outcome: None,
            error: None,
            retries: 0,
            success: false,
        });
    }

    pub fn record_failure(
        &mut self,
        provider_id: ProviderId,
        outcome: &str,
        error: Option<String>,
        retries: u32,
    ) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            outcome: Some(outcome.to_string()),
            error,
            retries,
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId, retries: u32) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            outcome: None,
            error: None,
            retries,
            success: true,
        });
    }

    /// Summary for logging/debugging, e.g. `YAHOO: rate limited -> FINNHUB: SUCCESS`.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!(
                        "{}: {} ({})",
                        a.provider_id,
                        a.outcome.as_deref().unwrap_or("error"),
                        err
                    )
                } else if let Some(outcome) = &a.outcome {
                    format!("{}: {}", a.provider_id, outcome)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// Providers a request was actually sent to, in order.
    pub fn providers_called(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| a.skipped.is_none())
            .map(|a| a.provider_id.as_ref())
            .collect()
    }
}
