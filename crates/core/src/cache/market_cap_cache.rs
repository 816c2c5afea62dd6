//! Market-cap cache: `symbol -> {value, observedAt}`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use capindex_market_data::Symbol;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::snapshot::{is_fresh, CacheRead, Envelope, SnapshotFile};
use crate::constants::MARKET_CAP_CACHE_FILE;
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCapEntry {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

pub struct MarketCapCache {
    file: SnapshotFile,
    entries: RwLock<HashMap<String, MarketCapEntry>>,
    // Serializes snapshot writes; readers never take it.
    writer: Mutex<()>,
}

impl MarketCapCache {
    /// Opens the cache in `dir`, loading whatever snapshot is there.
    pub fn open(dir: &Path) -> Self {
        let file = SnapshotFile::new(dir.join(MARKET_CAP_CACHE_FILE));
        let entries = file
            .load::<HashMap<String, MarketCapEntry>>()
            .map(|envelope| envelope.data)
            .unwrap_or_default();
        debug!("Market cap cache loaded with {} entries", entries.len());

        Self {
            file,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MarketCapEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Market cap cache lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    pub fn get_at(&self, symbol: &Symbol, ttl: Duration, now: DateTime<Utc>) -> CacheRead<MarketCapEntry> {
        match self.read_entries().get(symbol.as_str()) {
            Some(entry) if is_fresh(entry.observed_at, ttl, now) => CacheRead::Fresh(entry.clone()),
            Some(entry) => CacheRead::Stale(entry.clone()),
            None => CacheRead::Missing,
        }
    }

    /// Replaces the entry and persists the whole snapshot. The in-memory view
    /// changes only after the file is committed.
    pub async fn put(&self, symbol: &Symbol, entry: MarketCapEntry) -> Result<()> {
        let _guard = self.writer.lock().await;

        let mut next = self.read_entries().clone();
        let timestamp = entry.observed_at;
        next.insert(symbol.as_str().to_string(), entry);

        self.file
            .store(&Envelope {
                timestamp,
                data: &next,
            })
            .await?;

        *self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Market cap cache lock was poisoned. Recovering.");
            poisoned.into_inner()
        }) = next;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn entry(value: Decimal) -> MarketCapEntry {
        MarketCapEntry {
            value,
            observed_at: t0(),
            source: "YAHOO".to_string(),
        }
    }

    #[tokio::test]
    async fn test_entry_served_within_window_and_missed_after() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MarketCapCache::open(dir.path());
        let aapl = Symbol::new("AAPL");
        cache.put(&aapl, entry(dec!(3000000000000))).await.unwrap();

        let just_before = t0() + chrono::Duration::hours(23) + chrono::Duration::minutes(59);
        let just_after = t0() + chrono::Duration::hours(24) + chrono::Duration::minutes(1);

        assert_eq!(
            cache.get_at(&aapl, DAY, just_before),
            CacheRead::Fresh(entry(dec!(3000000000000)))
        );
        // Expired entries are retained as stale, not erased
        assert_eq!(
            cache.get_at(&aapl, DAY, just_after),
            CacheRead::Stale(entry(dec!(3000000000000)))
        );
        assert_eq!(cache.get_at(&Symbol::new("MSFT"), DAY, t0()), CacheRead::Missing);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = MarketCapCache::open(dir.path());
            cache
                .put(&Symbol::new("AAPL"), entry(dec!(3000000000000)))
                .await
                .unwrap();
            cache
                .put(&Symbol::new("MSFT"), entry(dec!(2800000000000)))
                .await
                .unwrap();
        }

        let reopened = MarketCapCache::open(dir.path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened
                .get_at(&Symbol::new("MSFT"), DAY, t0())
                .fresh()
                .map(|e| e.value),
            Some(dec!(2800000000000))
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MARKET_CAP_CACHE_FILE), b"not json").unwrap();

        let cache = MarketCapCache::open(dir.path());
        assert!(cache.is_empty());
    }
}
