//! Universe cache: a single snapshot of the last selected universe.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::Mutex;

use super::snapshot::{is_fresh, CacheRead, Envelope, SnapshotFile};
use crate::constants::UNIVERSE_CACHE_FILE;
use crate::errors::Result;
use crate::universe::UniverseSnapshot;

pub struct UniverseCache {
    file: SnapshotFile,
    current: RwLock<Option<UniverseSnapshot>>,
    writer: Mutex<()>,
}

impl UniverseCache {
    pub fn open(dir: &Path) -> Self {
        let file = SnapshotFile::new(dir.join(UNIVERSE_CACHE_FILE));
        let current = file
            .load::<UniverseSnapshot>()
            .map(|envelope| envelope.data);
        if let Some(snapshot) = &current {
            debug!(
                "Universe cache loaded: {} symbols observed at {}",
                snapshot.symbols.len(),
                snapshot.observed_at
            );
        }

        Self {
            file,
            current: RwLock::new(current),
            writer: Mutex::new(()),
        }
    }

    /// Last committed snapshot regardless of age.
    pub fn latest(&self) -> Option<UniverseSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| {
                warn!("Universe cache lock was poisoned. Recovering.");
                poisoned.into_inner()
            })
            .clone()
    }

    pub fn get_at(&self, ttl: Duration, now: DateTime<Utc>) -> CacheRead<UniverseSnapshot> {
        match self.latest() {
            Some(s) if is_fresh(s.observed_at, ttl, now) => CacheRead::Fresh(s),
            Some(s) => CacheRead::Stale(s),
            None => CacheRead::Missing,
        }
    }

    pub async fn put(&self, snapshot: UniverseSnapshot) -> Result<()> {
        let _guard = self.writer.lock().await;

        self.file
            .store(&Envelope {
                timestamp: snapshot.observed_at,
                data: &snapshot,
            })
            .await?;

        *self.current.write().unwrap_or_else(|poisoned| {
            warn!("Universe cache lock was poisoned. Recovering.");
            poisoned.into_inner()
        }) = Some(snapshot);
        Ok(())
    }
}
