//! Read-through market-cap lookups backed by the market-cap cache.

use std::sync::Arc;

use async_trait::async_trait;
use capindex_market_data::{ProviderChain, Symbol};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::cache::{CacheRead, MarketCapCache, MarketCapEntry};
use crate::settings::SettingsServiceTrait;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCapLookup {
    pub symbol: Symbol,
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub source: String,
    /// Served from an expired cache entry because no provider had a value.
    pub stale: bool,
}

impl MarketCapLookup {
    fn from_entry(symbol: &Symbol, entry: MarketCapEntry, stale: bool) -> Self {
        Self {
            symbol: symbol.clone(),
            value: entry.value,
            observed_at: entry.observed_at,
            source: entry.source,
            stale,
        }
    }
}

#[async_trait]
pub trait MarketCapServiceTrait: Send + Sync {
    async fn lookup(&self, symbol: &Symbol) -> Option<MarketCapLookup>;
}

pub struct MarketCapService {
    chain: Arc<ProviderChain>,
    cache: Arc<MarketCapCache>,
    settings: Arc<dyn SettingsServiceTrait>,
    inflight: DashMap<Symbol, Arc<Mutex<()>>>,
}

impl MarketCapService {
    pub fn new(
        chain: Arc<ProviderChain>,
        cache: Arc<MarketCapCache>,
        settings: Arc<dyn SettingsServiceTrait>,
    ) -> Self {
        Self {
            chain,
            cache,
            settings,
            inflight: DashMap::new(),
        }
    }

    /// Lookup as of `now`.
    ///
    /// Fresh cache hits never touch a provider. Otherwise one lookup per symbol
    /// is in flight at a time; callers queued behind it reuse its result.
    pub async fn lookup_at(&self, symbol: &Symbol, now: DateTime<Utc>) -> Option<MarketCapLookup> {
        let ttl = self.settings.get_settings().market_cap_cache_ttl;

        if let CacheRead::Fresh(entry) = self.cache.get_at(symbol, ttl, now) {
            return Some(MarketCapLookup::from_entry(symbol, entry, false));
        }

        let gate = self
            .inflight
            .entry(symbol.clone())
            .or_default()
            .value()
            .clone();
        let lookup = {
            let _guard = gate.lock().await;
            self.refresh(symbol, ttl, now).await
        };

        // Drop the gate once nobody else holds or waits on it
        drop(gate);
        self.inflight
            .remove_if(symbol, |_, gate| Arc::strong_count(gate) == 1);

        lookup
    }

    /// Cache re-check plus provider lookup. Runs under the symbol's gate.
    async fn refresh(
        &self,
        symbol: &Symbol,
        ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Option<MarketCapLookup> {
        // Another caller may have refreshed the entry while we waited
        let cached = match self.cache.get_at(symbol, ttl, now) {
            CacheRead::Fresh(entry) => return Some(MarketCapLookup::from_entry(symbol, entry, false)),
            other => other,
        };

        debug!("Market cap cache miss for {}", symbol);
        let (quote, diagnostics) = self.chain.fetch_market_cap_with_diagnostics(symbol).await;

        match quote {
            Some(quote) => {
                let entry = MarketCapEntry {
                    value: quote.value,
                    observed_at: now,
                    source: quote.source.to_string(),
                };
                if let Err(e) = self.cache.put(symbol, entry.clone()).await {
                    warn!("Failed to persist market cap for {}: {}", symbol, e);
                }
                Some(MarketCapLookup::from_entry(symbol, entry, false))
            }
            None => match cached {
                CacheRead::Stale(entry) => {
                    info!(
                        "Serving stale market cap for {} observed at {} ({})",
                        symbol,
                        entry.observed_at,
                        diagnostics.summary()
                    );
                    Some(MarketCapLookup::from_entry(symbol, entry, true))
                }
                _ => None,
            },
        }
    }
}

#[async_trait]
impl MarketCapServiceTrait for MarketCapService {
    async fn lookup(&self, symbol: &Symbol) -> Option<MarketCapLookup> {
        self.lookup_at(symbol, Utc::now()).await
    }
}
