//! File-backed snapshot envelopes.
//!
//! A snapshot is a `{timestamp, data}` JSON document. Writes go to a sibling
//! `.tmp` file that is renamed into place, so a reader sees either the old or
//! the new snapshot and never a partial one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

/// Result of a freshness-checked read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead<T> {
    Fresh(T),
    /// Past its window; usable only as a last resort.
    Stale(T),
    Missing,
}

impl<T> CacheRead<T> {
    pub fn fresh(self) -> Option<T> {
        match self {
            CacheRead::Fresh(v) => Some(v),
            _ => None,
        }
    }

    /// Fresh or stale value, whichever exists.
    pub fn any(self) -> Option<T> {
        match self {
            CacheRead::Fresh(v) | CacheRead::Stale(v) => Some(v),
            CacheRead::Missing => None,
        }
    }
}

/// `observed_at` is within `ttl` of `now`. Timestamps in the future count as fresh.
pub fn is_fresh(observed_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match (now - observed_at).to_std() {
        Ok(age) => age <= ttl,
        Err(_) => true,
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot. Missing or unreadable files are an empty cache.
    pub fn load<T: DeserializeOwned>(&self) -> Option<Envelope<T>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No snapshot at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(
                    "Ignoring corrupt snapshot {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persists the full snapshot atomically.
    pub async fn store<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let bytes = serde_json::to_vec_pretty(envelope)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::Cache(format!(
                "atomic rename into {} failed: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }
}
