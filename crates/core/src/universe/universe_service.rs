use std::sync::Arc;

use async_trait::async_trait;
use capindex_market_data::Symbol;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::reference::ReferenceListSource;
use super::universe_model::{RankedSymbol, SelectionMethod, UniverseSnapshot};
use crate::cache::{CacheRead, UniverseCache};
use crate::errors::Result;
use crate::market_data::MarketCapServiceTrait;
use crate::settings::{FetcherSettings, SettingsServiceTrait};

#[async_trait]
pub trait UniverseServiceTrait: Send + Sync {
    /// Cached universe while fresh, otherwise a new selection.
    async fn select(&self, force_refresh: bool) -> Result<UniverseSnapshot>;

    /// Last committed universe regardless of age.
    fn current(&self) -> Option<UniverseSnapshot>;
}

pub struct UniverseService {
    reference: Arc<dyn ReferenceListSource>,
    market_caps: Arc<dyn MarketCapServiceTrait>,
    cache: Arc<UniverseCache>,
    settings: Arc<dyn SettingsServiceTrait>,
    selecting: Mutex<()>,
}

impl UniverseService {
    pub fn new(
        reference: Arc<dyn ReferenceListSource>,
        market_caps: Arc<dyn MarketCapServiceTrait>,
        cache: Arc<UniverseCache>,
        settings: Arc<dyn SettingsServiceTrait>,
    ) -> Self {
        Self {
            reference,
            market_caps,
            cache,
            settings,
            selecting: Mutex::new(()),
        }
    }

    pub async fn select_at(&self, force_refresh: bool, now: DateTime<Utc>) -> Result<UniverseSnapshot> {
        let settings = self.settings.get_settings();

        if !force_refresh {
            if let CacheRead::Fresh(snapshot) = self.cache.get_at(settings.universe_cache_ttl, now) {
                debug!("Using cached universe from {}", snapshot.observed_at);
                return Ok(snapshot);
            }
        }

        let _guard = self.selecting.lock().await;
        if !force_refresh {
            // A selection that finished while we waited is good enough.
            if let CacheRead::Fresh(snapshot) = self.cache.get_at(settings.universe_cache_ttl, now) {
                return Ok(snapshot);
            }
        }

        // Stage 1a: candidate pool
        let candidates = match self.reference.fetch_symbols().await {
            Ok(mut symbols) => {
                symbols.truncate(settings.candidate_pool_size);
                symbols
            }
            Err(e) => {
                warn!("Reference list '{}' unavailable: {}", self.reference.name(), e);
                if let Some(previous) = self.cache.latest() {
                    info!(
                        "Reusing last known universe of {} symbols from {}",
                        previous.symbols.len(),
                        previous.observed_at
                    );
                    return Ok(previous);
                }
                return Ok(Self::curated_fallback(&settings, now, 0, Vec::new()));
            }
        };

        // Stage 1b: market caps in bounded concurrent batches
        let looked_up = self.lookup_in_batches(&candidates, &settings).await;
        let (ranked, failed) = rank_by_market_cap(looked_up);

        if ranked.is_empty() {
            warn!(
                "No market caps for any of {} candidates, using curated fallback",
                candidates.len()
            );
            return Ok(Self::curated_fallback(&settings, now, candidates.len(), failed));
        }

        // Stage 2: top N, never padded
        let symbols: Vec<Symbol> = ranked
            .into_iter()
            .take(settings.final_pool_size)
            .map(|r| r.symbol)
            .collect();

        let snapshot = UniverseSnapshot {
            symbols,
            observed_at: now,
            candidate_pool_size: settings.candidate_pool_size,
            final_pool_size: settings.final_pool_size,
            selection_method: SelectionMethod::MarketCapRanked,
            candidates_evaluated: candidates.len(),
            failed_symbols: failed,
        };

        info!(
            "Selected universe of {} symbols from {} candidates ({} lookups failed)",
            snapshot.symbols.len(),
            snapshot.candidates_evaluated,
            snapshot.failed_symbols.len()
        );

        if let Err(e) = self.cache.put(snapshot.clone()).await {
            warn!("Failed to persist universe snapshot: {}", e);
        }
        Ok(snapshot)
    }

    async fn lookup_in_batches(
        &self,
        candidates: &[Symbol],
        settings: &FetcherSettings,
    ) -> Vec<(Symbol, Option<Decimal>)> {
        let mut results = Vec::with_capacity(candidates.len());

        for (i, batch) in candidates.chunks(settings.batch_size).enumerate() {
            if i > 0 && !settings.inter_batch_pause.is_zero() {
                tokio::time::sleep(settings.inter_batch_pause).await;
            }

            let caps = join_all(batch.iter().map(|symbol| self.market_caps.lookup(symbol))).await;
            results.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(caps.into_iter().map(|lookup| lookup.map(|l| l.value))),
            );
            debug!(
                "Market cap batch {} done ({}/{})",
                i + 1,
                results.len(),
                candidates.len()
            );
        }

        results
    }

    /// Degraded selection. Not written to the cache so the next call retries.
    fn curated_fallback(
        settings: &FetcherSettings,
        now: DateTime<Utc>,
        candidates_evaluated: usize,
        failed_symbols: Vec<Symbol>,
    ) -> UniverseSnapshot {
        let symbols: Vec<Symbol> = settings
            .fallback_symbols
            .iter()
            .take(settings.final_pool_size)
            .map(|s| Symbol::new(s))
            .collect();

        warn!("Using curated fallback universe of {} symbols", symbols.len());

        UniverseSnapshot {
            symbols,
            observed_at: now,
            candidate_pool_size: settings.candidate_pool_size,
            final_pool_size: settings.final_pool_size,
            selection_method: SelectionMethod::CuratedFallback,
            candidates_evaluated,
            failed_symbols,
        }
    }
}

#[async_trait]
impl UniverseServiceTrait for UniverseService {
    async fn select(&self, force_refresh: bool) -> Result<UniverseSnapshot> {
        self.select_at(force_refresh, Utc::now()).await
    }

    fn current(&self) -> Option<UniverseSnapshot> {
        self.cache.latest()
    }
}

/// Orders successful lookups by market cap, largest first.
///
/// Failed lookups are returned separately and never ranked. Equal caps keep
/// reference-list order, so identical inputs always give identical output.
pub fn rank_by_market_cap(
    looked_up: Vec<(Symbol, Option<Decimal>)>,
) -> (Vec<RankedSymbol>, Vec<Symbol>) {
    let mut ranked = Vec::new();
    let mut failed = Vec::new();

    for (symbol, cap) in looked_up {
        match cap {
            Some(market_cap) if market_cap > Decimal::ZERO => {
                ranked.push(RankedSymbol { symbol, market_cap })
            }
            _ => failed.push(symbol),
        }
    }

    // sort_by is stable
    ranked.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
    (ranked, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::market_data::MarketCapService;
    use crate::cache::MarketCapCache;
    use crate::testing::{settings_service_with, CapProvider};
    use capindex_market_data::ProviderChain;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedList {
        symbols: Option<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl FixedList {
        fn new(symbols: &[&'static str]) -> Self {
            Self {
                symbols: Some(symbols.to_vec()),
                calls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                symbols: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReferenceListSource for FixedList {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_symbols(&self) -> Result<Vec<Symbol>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.symbols {
                Some(symbols) => Ok(symbols.iter().map(|s| Symbol::new(s)).collect()),
                None => Err(Error::ReferenceList("offline".to_string())),
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn small_settings(final_pool_size: usize) -> FetcherSettings {
        FetcherSettings {
            candidate_pool_size: 4,
            final_pool_size,
            batch_size: 2,
            ..FetcherSettings::default()
        }
    }

    fn selector(
        list: Arc<FixedList>,
        provider: CapProvider,
        settings: FetcherSettings,
        dir: &std::path::Path,
    ) -> UniverseService {
        let chain = Arc::new(ProviderChain::new(vec![Arc::new(provider)]));
        let settings = settings_service_with(chain.clone(), settings);
        let market_caps = Arc::new(MarketCapService::new(
            chain,
            Arc::new(MarketCapCache::open(dir)),
            settings.clone(),
        ));
        UniverseService::new(list, market_caps, Arc::new(UniverseCache::open(dir)), settings)
    }

    fn names(snapshot: &UniverseSnapshot) -> Vec<&str> {
        snapshot.symbols.iter().map(|s| s.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_excluded_and_pool_cut() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CapProvider::new(&[
            ("A", dec!(500000000000)),
            ("B", dec!(2000000000000)),
            ("D", dec!(10000000000)),
        ]);
        let service = selector(
            Arc::new(FixedList::new(&["A", "B", "C", "D"])),
            provider,
            small_settings(2),
            dir.path(),
        );

        let snapshot = service.select_at(false, t0()).await.unwrap();

        assert_eq!(names(&snapshot), vec!["B", "A"]);
        assert_eq!(snapshot.selection_method, SelectionMethod::MarketCapRanked);
        assert_eq!(snapshot.failed_symbols, vec![Symbol::new("C")]);
        assert_eq!(snapshot.candidates_evaluated, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fewer_successes_than_n_are_not_padded() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CapProvider::new(&[("A", dec!(500000000000))]);
        let service = selector(
            Arc::new(FixedList::new(&["A", "B", "C", "D"])),
            provider,
            small_settings(3),
            dir.path(),
        );

        let snapshot = service.select_at(false, t0()).await.unwrap();
        assert_eq!(names(&snapshot), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cached_universe_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let list = Arc::new(FixedList::new(&["A", "B", "C", "D"]));
        let provider = CapProvider::new(&[("A", dec!(500000000000)), ("B", dec!(2000000000000))]);
        let service = selector(list.clone(), provider, small_settings(2), dir.path());

        let first = service.select_at(false, t0()).await.unwrap();
        let second = service
            .select_at(false, t0() + chrono::Duration::days(6))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(list.calls.load(Ordering::SeqCst), 1);

        service
            .select_at(true, t0() + chrono::Duration::days(6))
            .await
            .unwrap();
        assert_eq!(list.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_list_uses_curated_fallback_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let list = Arc::new(FixedList::unavailable());
        let service = selector(list.clone(), CapProvider::new(&[]), small_settings(3), dir.path());

        let snapshot = service.select_at(false, t0()).await.unwrap();

        assert_eq!(snapshot.selection_method, SelectionMethod::CuratedFallback);
        assert_eq!(names(&snapshot), vec!["AAPL", "MSFT", "NVDA"]);
        assert!(service.current().is_none());

        service.select_at(false, t0()).await.unwrap();
        assert_eq!(list.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_list_prefers_stale_universe() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CapProvider::new(&[("A", dec!(500000000000)), ("B", dec!(2000000000000))]);
        let ranked = selector(
            Arc::new(FixedList::new(&["A", "B", "C", "D"])),
            provider,
            small_settings(2),
            dir.path(),
        );
        let original = ranked.select_at(false, t0()).await.unwrap();

        let offline = selector(
            Arc::new(FixedList::unavailable()),
            CapProvider::new(&[]),
            small_settings(2),
            dir.path(),
        );
        let reused = offline
            .select_at(false, t0() + chrono::Duration::days(30))
            .await
            .unwrap();

        assert_eq!(reused, original);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_lookups_failing_uses_curated_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let service = selector(
            Arc::new(FixedList::new(&["A", "B", "C", "D"])),
            CapProvider::new(&[]),
            small_settings(2),
            dir.path(),
        );

        let snapshot = service.select_at(false, t0()).await.unwrap();
        assert_eq!(snapshot.selection_method, SelectionMethod::CuratedFallback);
        assert_eq!(snapshot.failed_symbols.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_pause_between_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CapProvider::new(&[("A", dec!(500000000000))]);
        let service = selector(
            Arc::new(FixedList::new(&["A", "B", "C", "D"])),
            provider,
            small_settings(2),
            dir.path(),
        );

        let start = tokio::time::Instant::now();
        service.select_at(false, t0()).await.unwrap();

        // Two batches of two, one pause of the default 2s in between
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_ranking_is_deterministic_with_ties() {
        let input = || {
            vec![
                (Symbol::new("X"), Some(dec!(100000000))),
                (Symbol::new("Y"), Some(dec!(300000000))),
                (Symbol::new("Z"), Some(dec!(100000000))),
                (Symbol::new("W"), None),
            ]
        };

        let (first, failed) = rank_by_market_cap(input());
        let (second, _) = rank_by_market_cap(input());

        let order: Vec<&str> = first.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["Y", "X", "Z"]);
        assert_eq!(first, second);
        assert_eq!(failed, vec![Symbol::new("W")]);
    }
}
