//! Source provider trait definition.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Capability, DailyObservation, DateRange, ProviderOutcome, Symbol};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Adapter for one external data source.
///
/// Implementations never return errors: every failure is classified into a
/// [`ProviderOutcome`] before it leaves the adapter.
///
/// # Example
///
/// ```ignore
/// struct MyProvider;
///
/// #[async_trait]
/// impl SourceProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             daily_series: false,
///             market_cap: true,
///             shape: ProviderShape::StructuredApi,
///         }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::from_secs(2)
///     }
///
///     async fn market_cap(&self, symbol: &Symbol) -> ProviderOutcome<Decimal> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Unique identifier, e.g. "YAHOO" or "ALPHA_VANTAGE".
    fn id(&self) -> &'static str;

    /// Position in the chain for a capability. Lower values are tried first.
    fn priority(&self, _capability: Capability) -> u8 {
        10
    }

    fn capabilities(&self) -> ProviderCapabilities;

    /// Default spacing between requests. Configuration may override it.
    fn rate_limit(&self) -> RateLimit;

    /// Key the rate limiter tracks. Providers sharing a quota share a key.
    fn endpoint_key(&self) -> &'static str {
        self.id()
    }

    /// Daily observations for the inclusive range, ascending by date.
    ///
    /// `market_cap` on the returned rows is zero unless the source reports it.
    async fn daily_series(
        &self,
        _symbol: &Symbol,
        _range: &DateRange,
    ) -> ProviderOutcome<Vec<DailyObservation>> {
        ProviderOutcome::Empty
    }

    /// Current market capitalization in dollars.
    async fn market_cap(&self, _symbol: &Symbol) -> ProviderOutcome<Decimal> {
        ProviderOutcome::Empty
    }
}
