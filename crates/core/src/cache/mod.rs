//! TTL caches for market caps and the selected universe.
//!
//! Expired entries are reported as misses but kept, so callers can fall back
//! to the last known good value when a refresh fails.

mod market_cap_cache;
mod snapshot;
mod universe_cache;

pub use market_cap_cache::{MarketCapCache, MarketCapEntry};
pub use snapshot::{is_fresh, CacheRead, Envelope, SnapshotFile};
pub use universe_cache::UniverseCache;
