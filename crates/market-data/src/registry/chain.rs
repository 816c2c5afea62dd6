//! Provider chain orchestrator.
//!
//! Holds one ordered provider list per capability and walks it for each
//! request:
//! 1. Obtain a permit from the rate limiter for the provider's endpoint key
//! 2. Call the provider and take its classified outcome
//! 3. Non-empty success: validate and return, later providers are never called
//! 4. Rate limited: back off and retry the same provider, up to the policy cap;
//!    past the cap, or when no permit fits before the deadline, the chain
//!    moves on
//! 5. Blocked, empty or transient: move on to the next provider
//!
//! Everything for one symbol runs under a wall-clock deadline. Running out of
//! providers or out of time yields "no data", never an error.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};

use super::diagnostics::{FetchDiagnostics, SkipReason};
use super::rate_limiter::{BackoffPolicy, RateLimiter};
use super::validator::SeriesValidator;
use crate::models::{
    Capability, DailyObservation, DateRange, MarketCapQuote, ProviderId, ProviderOutcome, Symbol,
};
use crate::provider::{check_market_cap, ProviderCapabilities, SourceProvider};

/// Tunables for the chain. All of them can change at runtime.
#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub backoff: BackoffPolicy,
    /// Ceiling for all provider attempts for one symbol and capability.
    pub per_symbol_timeout: Duration,
    /// Spacing overrides by provider id; providers not listed keep their default.
    pub spacing_overrides: HashMap<String, Duration>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            per_symbol_timeout: Duration::from_secs(120),
            spacing_overrides: HashMap::new(),
        }
    }
}

/// What a provider looks like from the outside, for listing endpoints.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: &'static str,
    pub capabilities: ProviderCapabilities,
    pub spacing_seconds: u64,
    pub daily_series_rank: Option<usize>,
    pub market_cap_rank: Option<usize>,
}

enum AttemptEnd<T> {
    Accepted(T),
    Advance,
    DeadlineHit,
}

pub struct ProviderChain {
    daily_series: Vec<Arc<dyn SourceProvider>>,
    market_cap: Vec<Arc<dyn SourceProvider>>,
    rate_limiter: RateLimiter,
    validator: SeriesValidator,
    config: RwLock<ChainConfig>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self::with_config(providers, ChainConfig::default())
    }

    /// Builds both capability lists. Providers are ordered by
    /// `priority(capability)`; registration order breaks ties.
    pub fn with_config(providers: Vec<Arc<dyn SourceProvider>>, config: ChainConfig) -> Self {
        let ordered = |capability: Capability| {
            let mut list: Vec<Arc<dyn SourceProvider>> = providers
                .iter()
                .filter(|p| p.capabilities().supports(capability))
                .cloned()
                .collect();
            list.sort_by_key(|p| p.priority(capability));
            list
        };

        let chain = Self {
            daily_series: ordered(Capability::DailySeries),
            market_cap: ordered(Capability::MarketCap),
            rate_limiter: RateLimiter::new(),
            validator: SeriesValidator::new(),
            config: RwLock::new(config.clone()),
        };

        for provider in &providers {
            chain.configure_spacing(provider.as_ref(), &config);
        }

        info!(
            "Provider chain ready. daily series: [{}], market cap: [{}]",
            chain.ids(Capability::DailySeries).join(", "),
            chain.ids(Capability::MarketCap).join(", ")
        );
        chain
    }

    fn configure_spacing(&self, provider: &dyn SourceProvider, config: &ChainConfig) {
        let spacing = config
            .spacing_overrides
            .get(provider.id())
            .copied()
            .unwrap_or_else(|| provider.rate_limit().min_spacing);
        self.rate_limiter.configure(provider.endpoint_key(), spacing);
    }

    fn current_config(&self) -> ChainConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applies new tunables; in-flight calls finish with the old ones.
    pub fn reconfigure(&self, config: ChainConfig) {
        let mut seen = Vec::new();
        for provider in self.daily_series.iter().chain(self.market_cap.iter()) {
            if !seen.contains(&provider.id()) {
                seen.push(provider.id());
                self.configure_spacing(provider.as_ref(), &config);
            }
        }
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn providers(&self, capability: Capability) -> &[Arc<dyn SourceProvider>] {
        match capability {
            Capability::DailySeries => &self.daily_series,
            Capability::MarketCap => &self.market_cap,
        }
    }

    fn ids(&self, capability: Capability) -> Vec<&'static str> {
        self.providers(capability).iter().map(|p| p.id()).collect()
    }

    /// Provider id -> position in the chain (0 is tried first).
    pub fn priority_ranking(&self, capability: Capability) -> HashMap<String, usize> {
        self.providers(capability)
            .iter()
            .enumerate()
            .map(|(rank, p)| (p.id().to_string(), rank))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        let series_rank = self.priority_ranking(Capability::DailySeries);
        let cap_rank = self.priority_ranking(Capability::MarketCap);

        let mut out: Vec<ProviderSummary> = Vec::new();
        for provider in self.daily_series.iter().chain(self.market_cap.iter()) {
            if out.iter().any(|s| s.id == provider.id()) {
                continue;
            }
            out.push(ProviderSummary {
                id: provider.id(),
                capabilities: provider.capabilities(),
                spacing_seconds: self.rate_limiter.spacing(provider.endpoint_key()).as_secs(),
                daily_series_rank: series_rank.get(provider.id()).copied(),
                market_cap_rank: cap_rank.get(provider.id()).copied(),
            });
        }
        out
    }

    // ========================================================================
    // Public fetch API
    // ========================================================================

    /// Daily observations for `symbol` within `range`, possibly empty.
    pub async fn fetch_daily_series(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> Vec<DailyObservation> {
        self.fetch_daily_series_with_diagnostics(symbol, range)
            .await
            .0
    }

    pub async fn fetch_daily_series_with_diagnostics(
        &self,
        symbol: &Symbol,
        range: &DateRange,
    ) -> (Vec<DailyObservation>, FetchDiagnostics) {
        let (rows, diagnostics) = self
            .run(
                Capability::DailySeries,
                symbol,
                |provider| async move { provider.daily_series(symbol, range).await },
                |rows| {
                    let (kept, _) = self.validator.validate(rows, range);
                    if kept.is_empty() {
                        None
                    } else {
                        Some(kept)
                    }
                },
            )
            .await;

        (rows.map(|(r, _)| r).unwrap_or_default(), diagnostics)
    }

    /// Current market cap for `symbol`, if any provider has one.
    pub async fn fetch_market_cap(&self, symbol: &Symbol) -> Option<Decimal> {
        self.fetch_market_cap_with_diagnostics(symbol)
            .await
            .0
            .map(|q| q.value)
    }

    pub async fn fetch_market_cap_with_diagnostics(
        &self,
        symbol: &Symbol,
    ) -> (Option<MarketCapQuote>, FetchDiagnostics) {
        let (value, diagnostics) = self
            .run(
                Capability::MarketCap,
                symbol,
                |provider| async move { provider.market_cap(symbol).await },
                |value| check_market_cap("chain", value).ok(),
            )
            .await;

        let quote = value.map(|(value, source)| MarketCapQuote {
            symbol: symbol.clone(),
            value,
            source,
        });
        (quote, diagnostics)
    }

    // ========================================================================
    // Chain loop
    // ========================================================================

    async fn run<'a, T, Call, Fut, Accept>(
        &'a self,
        capability: Capability,
        symbol: &'a Symbol,
        call: Call,
        accept: Accept,
    ) -> (Option<(T, ProviderId)>, FetchDiagnostics)
    where
        Call: Fn(Arc<dyn SourceProvider>) -> Fut,
        Fut: Future<Output = ProviderOutcome<T>> + 'a,
        Accept: Fn(T) -> Option<T>,
    {
        let config = self.current_config();
        let deadline = Instant::now() + config.per_symbol_timeout;
        let mut diagnostics = FetchDiagnostics::new();
        let providers = self.providers(capability);

        for (idx, provider) in providers.iter().enumerate() {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());

            if Instant::now() >= deadline {
                Self::skip_remaining(&mut diagnostics, &providers[idx..]);
                break;
            }

            match self
                .attempt(
                    provider,
                    &provider_id,
                    symbol,
                    capability,
                    &config.backoff,
                    deadline,
                    &call,
                    &accept,
                    &mut diagnostics,
                )
                .await
            {
                AttemptEnd::Accepted(value) => {
                    debug!(
                        "{} for {}: {}",
                        capability,
                        symbol,
                        diagnostics.summary()
                    );
                    return (Some((value, provider_id)), diagnostics);
                }
                AttemptEnd::Advance => continue,
                AttemptEnd::DeadlineHit => {
                    warn!(
                        "{} for {} hit the {:?} deadline at '{}'",
                        capability, symbol, config.per_symbol_timeout, provider_id
                    );
                    Self::skip_remaining(&mut diagnostics, &providers[idx + 1..]);
                    break;
                }
            }
        }

        info!(
            "No {} available for {}: {}",
            capability,
            symbol,
            diagnostics.summary()
        );
        (None, diagnostics)
    }

    /// One provider's turn, including its rate-limit retries.
    #[allow(clippy::too_many_arguments)]
    async fn attempt<T, Call, Fut, Accept>(
        &self,
        provider: &Arc<dyn SourceProvider>,
        provider_id: &ProviderId,
        symbol: &Symbol,
        capability: Capability,
        backoff: &BackoffPolicy,
        deadline: Instant,
        call: &Call,
        accept: &Accept,
        diagnostics: &mut FetchDiagnostics,
    ) -> AttemptEnd<T>
    where
        Call: Fn(Arc<dyn SourceProvider>) -> Fut,
        Fut: Future<Output = ProviderOutcome<T>>,
        Accept: Fn(T) -> Option<T>,
    {
        let mut retries: u32 = 0;

        loop {
            if !self
                .rate_limiter
                .acquire_before(provider.endpoint_key(), deadline)
                .await
            {
                warn!(
                    "'{}' has no free slot for {} before its deadline, moving on",
                    provider_id, symbol
                );
                diagnostics.record_failure(
                    provider_id.clone(),
                    "rate limited",
                    Some("no permit before deadline".to_string()),
                    retries,
                );
                return AttemptEnd::Advance;
            }

            let outcome = match timeout_at(deadline, call(Arc::clone(provider))).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    diagnostics.record_failure(
                        provider_id.clone(),
                        "deadline exceeded",
                        None,
                        retries,
                    );
                    return AttemptEnd::DeadlineHit;
                }
            };

            match outcome {
                ProviderOutcome::Success(value) => {
                    return match accept(value) {
                        Some(value) => {
                            diagnostics.record_success(provider_id.clone(), retries);
                            AttemptEnd::Accepted(value)
                        }
                        None => {
                            debug!("'{}' returned nothing usable for {}", provider_id, symbol);
                            diagnostics.record_failure(provider_id.clone(), "empty", None, retries);
                            AttemptEnd::Advance
                        }
                    };
                }
                ProviderOutcome::RateLimited if backoff.allows_retry(retries) => {
                    let delay = backoff.delay(retries);
                    if Instant::now() + delay >= deadline {
                        warn!(
                            "'{}' rate limited {} for {}, backoff would pass the deadline",
                            provider_id, capability, symbol
                        );
                        diagnostics.record_failure(
                            provider_id.clone(),
                            "rate limited",
                            Some("backoff exceeds deadline".to_string()),
                            retries,
                        );
                        return AttemptEnd::Advance;
                    }
                    retries += 1;
                    warn!(
                        "'{}' rate limited {} for {}, backing off {:?} (retry {}/{})",
                        provider_id, capability, symbol, delay, retries, backoff.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                ProviderOutcome::RateLimited => {
                    // Retry cap reached: treat as empty and move on
                    warn!(
                        "'{}' still rate limited after {} retries for {}, moving on",
                        provider_id, retries, symbol
                    );
                    diagnostics.record_failure(provider_id.clone(), "rate limited", None, retries);
                    return AttemptEnd::Advance;
                }
                ProviderOutcome::TransientError(message) => {
                    warn!("'{}' failed for {}: {}", provider_id, symbol, message);
                    diagnostics.record_failure(
                        provider_id.clone(),
                        "transient error",
                        Some(message),
                        retries,
                    );
                    return AttemptEnd::Advance;
                }
                other => {
                    debug!("'{}' {} for {}", provider_id, other.label(), symbol);
                    diagnostics.record_failure(provider_id.clone(), other.label(), None, retries);
                    return AttemptEnd::Advance;
                }
            }
        }
    }

    fn skip_remaining(diagnostics: &mut FetchDiagnostics, rest: &[Arc<dyn SourceProvider>]) {
        for provider in rest {
            diagnostics.record_skip(Cow::Borrowed(provider.id()), SkipReason::DeadlineExceeded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderShape, RateLimit};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Mock provider
    // ------------------------------------------------------------------

    struct MockProvider {
        id: &'static str,
        priority: u8,
        daily: bool,
        cap: bool,
        /// Played back in order; the last one repeats.
        series: Mutex<VecDeque<ProviderOutcome<Vec<DailyObservation>>>>,
        caps: Mutex<VecDeque<ProviderOutcome<Decimal>>>,
        delay: Duration,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MockProvider {
        fn new(id: &'static str, priority: u8, calls: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                id,
                priority,
                daily: true,
                cap: true,
                series: Mutex::new(VecDeque::new()),
                caps: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
                calls,
            }
        }

        fn with_series(self, outcomes: Vec<ProviderOutcome<Vec<DailyObservation>>>) -> Self {
            *self.series.lock().unwrap() = outcomes.into();
            self
        }

        fn with_caps(self, outcomes: Vec<ProviderOutcome<Decimal>>) -> Self {
            *self.caps.lock().unwrap() = outcomes.into();
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn market_cap_only(mut self) -> Self {
            self.daily = false;
            self
        }

        fn next<T: Clone>(queue: &Mutex<VecDeque<ProviderOutcome<T>>>) -> ProviderOutcome<T> {
            let mut q = queue.lock().unwrap();
            if q.len() > 1 {
                q.pop_front().unwrap()
            } else {
                q.front().cloned().unwrap_or(ProviderOutcome::Empty)
            }
        }
    }

    #[async_trait]
    impl SourceProvider for MockProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self, _capability: Capability) -> u8 {
            self.priority
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                daily_series: self.daily,
                market_cap: self.cap,
                shape: ProviderShape::StructuredApi,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit::from_secs(0)
        }

        async fn daily_series(
            &self,
            _symbol: &Symbol,
            _range: &DateRange,
        ) -> ProviderOutcome<Vec<DailyObservation>> {
            self.calls.lock().unwrap().push(self.id);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Self::next(&self.series)
        }

        async fn market_cap(&self, _symbol: &Symbol) -> ProviderOutcome<Decimal> {
            self.calls.lock().unwrap().push(self.id);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Self::next(&self.caps)
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn rows(source: &'static str, days: &[u32]) -> Vec<DailyObservation> {
        days.iter()
            .map(|day| DailyObservation::new(d(*day), Symbol::new("AAPL"), dec!(100), dec!(10), source))
            .collect()
    }

    fn range() -> DateRange {
        DateRange::new(d(2), d(5)).unwrap()
    }

    fn chain(providers: Vec<MockProvider>) -> ProviderChain {
        ProviderChain::new(
            providers
                .into_iter()
                .map(|p| Arc::new(p) as Arc<dyn SourceProvider>)
                .collect(),
        )
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_first_success_short_circuits() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("FIRST", 1, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("FIRST", &[2, 3]))]),
            MockProvider::new("SECOND", 2, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("SECOND", &[2, 3]))]),
        ]);

        let result = chain.fetch_daily_series(&Symbol::new("AAPL"), &range()).await;

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|r| r.source == "FIRST"));
        assert_eq!(*calls.lock().unwrap(), vec!["FIRST"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_through_empty_blocked_and_transient() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone()).with_series(vec![ProviderOutcome::Empty]),
            MockProvider::new("B", 2, calls.clone()).with_series(vec![ProviderOutcome::Blocked]),
            MockProvider::new("C", 3, calls.clone())
                .with_series(vec![ProviderOutcome::TransientError("boom".into())]),
            MockProvider::new("D", 4, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("D", &[4]))]),
        ]);

        let (result, diagnostics) = chain
            .fetch_daily_series_with_diagnostics(&Symbol::new("AAPL"), &range())
            .await;

        assert_eq!(result.len(), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["A", "B", "C", "D"]);
        assert_eq!(
            diagnostics.summary(),
            "A: empty -> B: blocked -> C: transient error (boom) -> D: SUCCESS"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_with_empty_payload_advances() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone())
                .with_series(vec![ProviderOutcome::Success(vec![])]),
            MockProvider::new("B", 2, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("B", &[3]))]),
        ]);

        let result = chain.fetch_daily_series(&Symbol::new("AAPL"), &range()).await;
        assert_eq!(result[0].source, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_dates_stay_inside_range() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![MockProvider::new("A", 1, calls.clone())
            .with_series(vec![ProviderOutcome::Success(rows("A", &[1, 2, 5, 6, 9]))])]);

        let r = range();
        let result = chain.fetch_daily_series(&Symbol::new("AAPL"), &r).await;

        assert_eq!(result.iter().map(|o| o.date).collect::<Vec<_>>(), vec![d(2), d(5)]);
        assert!(result.iter().all(|o| r.contains(o.date)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_only_outside_range_advance() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("A", &[20, 21]))]),
            MockProvider::new("B", 2, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("B", &[3]))]),
        ]);

        let result = chain.fetch_daily_series(&Symbol::new("AAPL"), &range()).await;
        assert_eq!(result.len(), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_then_succeeds() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone()).with_series(vec![
                ProviderOutcome::RateLimited,
                ProviderOutcome::Success(rows("A", &[2])),
            ]),
            MockProvider::new("B", 2, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("B", &[2]))]),
        ]);

        let start = Instant::now();
        let (result, diagnostics) = chain
            .fetch_daily_series_with_diagnostics(&Symbol::new("AAPL"), &range())
            .await;

        assert_eq!(result[0].source, "A");
        assert_eq!(*calls.lock().unwrap(), vec!["A", "A"]);
        assert_eq!(diagnostics.attempts[0].retries, 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_cap_converts_to_empty() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone()).with_series(vec![ProviderOutcome::RateLimited]),
            MockProvider::new("B", 2, calls.clone())
                .with_series(vec![ProviderOutcome::Success(rows("B", &[2]))]),
        ]);

        let start = Instant::now();
        let (result, diagnostics) = chain
            .fetch_daily_series_with_diagnostics(&Symbol::new("AAPL"), &range())
            .await;

        // One initial call plus three retries, then the chain advances
        assert_eq!(*calls.lock().unwrap(), vec!["A", "A", "A", "A", "B"]);
        assert_eq!(result[0].source, "B");
        assert_eq!(diagnostics.attempts[0].retries, 3);
        // 2s + 4s + 8s of backoff
        assert!(start.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batch_falls_back_past_rate_limited_primary() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(
                MockProvider::new("LIMITED", 1, calls.clone())
                    .with_series(vec![ProviderOutcome::RateLimited]),
            ),
            Arc::new(
                MockProvider::new("FALLBACK", 2, calls.clone())
                    .with_series(vec![ProviderOutcome::Success(rows("FALLBACK", &[2]))]),
            ),
        ];
        let chain = Arc::new(ProviderChain::with_config(
            providers,
            ChainConfig {
                per_symbol_timeout: Duration::from_secs(30),
                spacing_overrides: HashMap::from([(
                    "LIMITED".to_string(),
                    Duration::from_secs(12),
                )]),
                ..ChainConfig::default()
            },
        ));

        let start = Instant::now();
        let handles: Vec<_> = ["AAPL", "MSFT", "NVDA", "AMZN"]
            .into_iter()
            .map(|ticker| {
                let chain = chain.clone();
                tokio::spawn(async move {
                    chain
                        .fetch_daily_series_with_diagnostics(&Symbol::new(ticker), &range())
                        .await
                })
            })
            .collect();

        for handle in handles {
            let (result, diagnostics) = handle.await.unwrap();
            assert_eq!(result.len(), 1, "{}", diagnostics.summary());
            assert_eq!(result[0].source, "FALLBACK");
            assert_eq!(diagnostics.attempts[0].provider_id, "LIMITED");
            assert_eq!(
                diagnostics.attempts[0].outcome.as_deref(),
                Some("rate limited")
            );
            assert!(diagnostics.attempts[1].success);
        }
        // Nobody waited on a slot that could not be used
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_chain_returns_empty() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone()).with_series(vec![ProviderOutcome::Blocked]),
            MockProvider::new("B", 2, calls.clone()).with_series(vec![ProviderOutcome::Empty]),
        ]);

        let (result, diagnostics) = chain
            .fetch_daily_series_with_diagnostics(&Symbol::new("ZZZZ"), &range())
            .await;

        assert!(result.is_empty());
        assert!(!diagnostics.has_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_remaining_providers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let providers: Vec<Arc<dyn SourceProvider>> = vec![
            Arc::new(
                MockProvider::new("SLOW", 1, calls.clone())
                    .with_series(vec![ProviderOutcome::Success(rows("SLOW", &[2]))])
                    .with_delay(Duration::from_secs(300)),
            ),
            Arc::new(
                MockProvider::new("FAST", 2, calls.clone())
                    .with_series(vec![ProviderOutcome::Success(rows("FAST", &[2]))]),
            ),
        ];
        let chain = ProviderChain::with_config(
            providers,
            ChainConfig {
                per_symbol_timeout: Duration::from_secs(30),
                ..ChainConfig::default()
            },
        );

        let start = Instant::now();
        let (result, diagnostics) = chain
            .fetch_daily_series_with_diagnostics(&Symbol::new("AAPL"), &range())
            .await;

        assert!(result.is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["SLOW"]);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(300));
        assert_eq!(
            diagnostics.attempts[1].skipped,
            Some(SkipReason::DeadlineExceeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_cap_chain_skips_series_only_ordering() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("SERIES", 1, calls.clone()).with_caps(vec![ProviderOutcome::Empty]),
            MockProvider::new("PAGE", 2, calls.clone())
                .market_cap_only()
                .with_caps(vec![ProviderOutcome::Success(dec!(2000000000000))]),
        ]);

        let (quote, _) = chain
            .fetch_market_cap_with_diagnostics(&Symbol::new("AAPL"))
            .await;

        let quote = quote.unwrap();
        assert_eq!(quote.value, dec!(2000000000000));
        assert_eq!(quote.source, "PAGE");
        assert_eq!(chain.ids(Capability::DailySeries), vec!["SERIES"]);
        assert_eq!(chain.ids(Capability::MarketCap), vec!["SERIES", "PAGE"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_bounds_market_cap_is_not_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("A", 1, calls.clone()).with_caps(vec![ProviderOutcome::Success(dec!(5))]),
            MockProvider::new("B", 2, calls.clone())
                .with_caps(vec![ProviderOutcome::Success(dec!(500000000000))]),
        ]);

        assert_eq!(
            chain.fetch_market_cap(&Symbol::new("AAPL")).await,
            Some(dec!(500000000000))
        );
    }

    #[test]
    fn test_priority_ranking() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(vec![
            MockProvider::new("LATE", 5, calls.clone()),
            MockProvider::new("EARLY", 1, calls.clone()),
        ]);
        let ranking = chain.priority_ranking(Capability::DailySeries);
        assert_eq!(ranking["EARLY"], 0);
        assert_eq!(ranking["LATE"], 1);
    }

    #[test]
    fn test_spacing_override_applies() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut overrides = HashMap::new();
        overrides.insert("A".to_string(), Duration::from_secs(12));
        let chain = ProviderChain::with_config(
            vec![Arc::new(MockProvider::new("A", 1, calls)) as Arc<dyn SourceProvider>],
            ChainConfig {
                spacing_overrides: overrides,
                ..ChainConfig::default()
            },
        );
        assert_eq!(chain.summaries()[0].spacing_seconds, 12);

        chain.reconfigure(ChainConfig::default());
        assert_eq!(chain.summaries()[0].spacing_seconds, 0);
    }
}
