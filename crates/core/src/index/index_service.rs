use std::sync::Arc;

use async_trait::async_trait;
use capindex_market_data::DateRange;
use log::info;

use super::index_calculator::IndexCalculator;
use super::index_model::IndexPerformanceRecord;
use crate::errors::Result;
use crate::market_data::MarketDataStore;

#[async_trait]
pub trait IndexServiceTrait: Send + Sync {
    /// Recomputes the range from stored observations and replaces stored records.
    async fn rebuild(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>>;

    /// Stored records for the range, built on demand when none exist.
    async fn performance(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>>;
}

pub struct IndexService {
    store: Arc<dyn MarketDataStore>,
    calculator: Arc<dyn IndexCalculator>,
}

impl IndexService {
    pub fn new(store: Arc<dyn MarketDataStore>, calculator: Arc<dyn IndexCalculator>) -> Self {
        Self { store, calculator }
    }
}

#[async_trait]
impl IndexServiceTrait for IndexService {
    async fn rebuild(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>> {
        let rows = self.store.observations_in_range(range, None)?;
        let records = self.calculator.calculate(&rows);

        if !records.is_empty() {
            self.store.save_index_performance(records.clone()).await?;
        }
        info!(
            "Index rebuilt for {}..{}: {} dates from {} observations",
            range.start,
            range.end,
            records.len(),
            rows.len()
        );
        Ok(records)
    }

    async fn performance(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>> {
        let stored = self.store.index_performance(range)?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        self.rebuild(range).await
    }
}
