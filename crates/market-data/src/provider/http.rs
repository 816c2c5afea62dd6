//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::errors::MarketDataError;

/// Browser-like agent; several sources refuse the default reqwest agent.
pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Upper bound for any single request.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Maps a transport failure onto the error taxonomy.
pub(crate) fn send_error(provider: &str, e: reqwest::Error) -> MarketDataError {
    if e.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        MarketDataError::Network(e)
    }
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub(crate) fn check_status(provider: &str, status: StatusCode) -> Result<(), MarketDataError> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => MarketDataError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MarketDataError::Blocked {
            provider: provider.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        },
        StatusCode::NOT_FOUND => MarketDataError::SymbolNotFound(format!("{} returned 404", provider)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => MarketDataError::Timeout {
            provider: provider.to_string(),
        },
        s if s.is_server_error() => MarketDataError::ProviderError {
            provider: provider.to_string(),
            message: format!("HTTP {}", s.as_u16()),
        },
        s => MarketDataError::malformed(provider, format!("unexpected HTTP {}", s.as_u16())),
    })
}

/// Sends a prepared request and returns the body text, classifying failures.
pub(crate) async fn fetch_text(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, MarketDataError> {
    let response: Response = request.send().await.map_err(|e| send_error(provider, e))?;
    check_status(provider, response.status())?;
    response.text().await.map_err(|e| send_error(provider, e))
}

/// Like [`fetch_text`], then parses JSON into `T`.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, MarketDataError> {
    let body = fetch_text(provider, request).await?;
    serde_json::from_str(&body)
        .map_err(|e| MarketDataError::malformed(provider, format!("failed to parse response: {}", e)))
}
