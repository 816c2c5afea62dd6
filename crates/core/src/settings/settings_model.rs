//! Fetcher settings: every tunable of the acquisition engine.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use capindex_market_data::{BackoffPolicy, ChainConfig};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::errors::{Error, Result};
use crate::universe::FALLBACK_SYMBOLS;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherSettings {
    /// Reference-list symbols evaluated by market cap (M).
    pub candidate_pool_size: usize,
    /// Symbols kept in the final universe (N < M).
    pub final_pool_size: usize,
    /// Concurrent lookups per batch.
    pub batch_size: usize,
    /// Minimum request spacing per provider id.
    pub per_provider_delay_seconds: BTreeMap<String, u64>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(alias = "universeCacheTTL")]
    pub universe_cache_ttl: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(alias = "marketCapCacheTTL")]
    pub market_cap_cache_ttl: Duration,
    pub max_retries_per_provider: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub per_symbol_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub inter_batch_pause: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub backoff_base_delay: Duration,
    pub fallback_symbols: Vec<String>,
    pub cache_dir: PathBuf,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        let per_provider_delay_seconds = [
            ("ALPHA_VANTAGE", 12),
            ("YAHOO", 2),
            ("YAHOO_PAGE", 2),
            ("POLYGON", 12),
            ("FINNHUB", 2),
        ]
        .into_iter()
        .map(|(id, secs)| (id.to_string(), secs))
        .collect();

        Self {
            candidate_pool_size: 500,
            final_pool_size: 100,
            batch_size: 10,
            per_provider_delay_seconds,
            universe_cache_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            market_cap_cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_retries_per_provider: 3,
            per_symbol_timeout: Duration::from_secs(120),
            inter_batch_pause: Duration::from_secs(2),
            backoff_base_delay: Duration::from_secs(2),
            fallback_symbols: FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            cache_dir: PathBuf::from("data"),
        }
    }
}

impl FetcherSettings {
    /// Rejects combinations the selector cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.final_pool_size == 0 {
            return Err(Error::Config("finalPoolSize must be positive".to_string()));
        }
        if self.final_pool_size >= self.candidate_pool_size {
            return Err(Error::Config(format!(
                "finalPoolSize ({}) must be smaller than candidatePoolSize ({})",
                self.final_pool_size, self.candidate_pool_size
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batchSize must be positive".to_string()));
        }
        if self.fallback_symbols.is_empty() {
            return Err(Error::Config(
                "no fallback symbol list configured".to_string(),
            ));
        }
        if self.fallback_symbols.len() < self.final_pool_size {
            return Err(Error::Config(format!(
                "fallback list has {} symbols, finalPoolSize needs {}",
                self.fallback_symbols.len(),
                self.final_pool_size
            )));
        }
        Ok(())
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            backoff: BackoffPolicy::new(self.backoff_base_delay, self.max_retries_per_provider),
            per_symbol_timeout: self.per_symbol_timeout,
            spacing_overrides: self
                .per_provider_delay_seconds
                .iter()
                .map(|(id, secs)| (id.clone(), Duration::from_secs(*secs)))
                .collect::<HashMap<_, _>>(),
        }
    }

    /// Applies every field present in `update`. Does not validate.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.candidate_pool_size {
            self.candidate_pool_size = v;
        }
        if let Some(v) = update.final_pool_size {
            self.final_pool_size = v;
        }
        if let Some(v) = update.batch_size {
            self.batch_size = v;
        }
        if let Some(delays) = &update.per_provider_delay_seconds {
            for (id, secs) in delays {
                self.per_provider_delay_seconds
                    .insert(id.to_ascii_uppercase(), *secs);
            }
        }
        if let Some(v) = update.universe_cache_ttl {
            self.universe_cache_ttl = v;
        }
        if let Some(v) = update.market_cap_cache_ttl {
            self.market_cap_cache_ttl = v;
        }
        if let Some(v) = update.max_retries_per_provider {
            self.max_retries_per_provider = v;
        }
        if let Some(v) = update.per_symbol_timeout {
            self.per_symbol_timeout = v;
        }
        if let Some(v) = update.inter_batch_pause {
            self.inter_batch_pause = v;
        }
        if let Some(v) = update.backoff_base_delay {
            self.backoff_base_delay = v;
        }
        if let Some(v) = &update.fallback_symbols {
            self.fallback_symbols = v.clone();
        }
    }
}

/// Partial settings update. Absent fields keep their current value.
///
/// The cache directory is fixed at startup and cannot be changed here.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub candidate_pool_size: Option<usize>,
    #[serde(default)]
    pub final_pool_size: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub per_provider_delay_seconds: Option<BTreeMap<String, u64>>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default, alias = "universeCacheTTL")]
    pub universe_cache_ttl: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default, alias = "marketCapCacheTTL")]
    pub market_cap_cache_ttl: Option<Duration>,
    #[serde(default)]
    pub max_retries_per_provider: Option<u32>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub per_symbol_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub inter_batch_pause: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub backoff_base_delay: Option<Duration>,
    #[serde(default)]
    pub fallback_symbols: Option<Vec<String>>,
}
