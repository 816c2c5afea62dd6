//! Provider chain module.
//!
//! Orchestration for source providers:
//! - Per-capability priority ordering with short-circuit on first success
//! - Request spacing per endpoint key and exponential backoff on rate limits
//! - Per-symbol deadline across all attempts
//! - Series validation and per-call diagnostics

mod chain;
mod diagnostics;
mod rate_limiter;
mod validator;

pub use chain::{ChainConfig, ProviderChain, ProviderSummary};
pub use diagnostics::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use rate_limiter::{BackoffPolicy, RateLimiter};
pub use validator::{SeriesValidator, ValidationReport};
