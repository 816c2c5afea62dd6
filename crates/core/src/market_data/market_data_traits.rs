use async_trait::async_trait;
use capindex_market_data::DateRange;
use chrono::NaiveDate;

use super::market_data_model::MarketDataRecord;
use crate::errors::Result;
use crate::index::IndexPerformanceRecord;

/// Persistent store for observations and derived index records.
///
/// Writes are idempotent overwrites by key and commit all-or-nothing per call.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    async fn upsert_observations(&self, records: Vec<MarketDataRecord>) -> Result<usize>;

    /// Rows in `range`, ordered by date then symbol.
    fn observations_in_range(
        &self,
        range: &DateRange,
        symbols: Option<&[String]>,
    ) -> Result<Vec<MarketDataRecord>>;

    /// Largest companies by market cap on `date`.
    fn top_companies(&self, date: NaiveDate, limit: i64) -> Result<Vec<MarketDataRecord>>;

    /// Most recent date with stored observations.
    fn latest_date(&self) -> Result<Option<NaiveDate>>;

    async fn save_index_performance(&self, records: Vec<IndexPerformanceRecord>) -> Result<usize>;

    fn index_performance(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>>;
}
