/// Classification of a provider failure.
///
/// Every [`MarketDataError`](super::MarketDataError) maps to exactly one class,
/// and each class maps to one non-success
/// [`ProviderOutcome`](crate::models::ProviderOutcome) variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// Source throttled us. Back off, then retry the same provider or advance.
    RateLimited,

    /// Source refused outright. Advance, no retry this call.
    Blocked,

    /// Network/timeout/5xx. Advance, no retry this call.
    Transient,

    /// Nothing usable came back. Advance.
    Empty,
}
