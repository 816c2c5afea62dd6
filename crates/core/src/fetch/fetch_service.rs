//! One acquisition cycle over the selected universe.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use capindex_market_data::{Capability, DailyObservation, DateRange, ProviderChain, Symbol};
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::watch;

use super::fetch_model::FetchReport;
use crate::errors::Result;
use crate::index::IndexServiceTrait;
use crate::market_data::{MarketCapServiceTrait, MarketDataRecord, MarketDataStore};
use crate::normalize::Normalizer;
use crate::settings::SettingsServiceTrait;
use crate::universe::UniverseServiceTrait;

#[async_trait]
pub trait FetchServiceTrait: Send + Sync {
    /// Runs a full cycle for `range`. Setting `shutdown` to true stops the
    /// cycle between batches.
    async fn run(&self, range: DateRange, shutdown: watch::Receiver<bool>) -> Result<FetchReport>;
}

pub struct FetchService {
    chain: Arc<ProviderChain>,
    universe: Arc<dyn UniverseServiceTrait>,
    market_caps: Arc<dyn MarketCapServiceTrait>,
    store: Arc<dyn MarketDataStore>,
    index: Arc<dyn IndexServiceTrait>,
    settings: Arc<dyn SettingsServiceTrait>,
}

impl FetchService {
    pub fn new(
        chain: Arc<ProviderChain>,
        universe: Arc<dyn UniverseServiceTrait>,
        market_caps: Arc<dyn MarketCapServiceTrait>,
        store: Arc<dyn MarketDataStore>,
        index: Arc<dyn IndexServiceTrait>,
        settings: Arc<dyn SettingsServiceTrait>,
    ) -> Self {
        Self {
            chain,
            universe,
            market_caps,
            store,
            index,
            settings,
        }
    }

    /// Daily series for one symbol with the current market cap attached.
    ///
    /// A current cap applied to historical dates is an estimate, so every row
    /// that receives one is marked `estimated`.
    async fn fetch_symbol(&self, symbol: &Symbol, range: &DateRange) -> Vec<DailyObservation> {
        let mut rows = self.chain.fetch_daily_series(symbol, range).await;
        if rows.is_empty() {
            return rows;
        }

        match self.market_caps.lookup(symbol).await {
            Some(cap) => {
                for row in &mut rows {
                    row.market_cap = cap.value;
                    row.estimated = true;
                }
            }
            None => debug!("No market cap for {}; rows keep a zero cap", symbol),
        }
        rows
    }
}

#[async_trait]
impl FetchServiceTrait for FetchService {
    async fn run(&self, range: DateRange, mut shutdown: watch::Receiver<bool>) -> Result<FetchReport> {
        let settings = self.settings.get_settings();
        let universe = self.universe.select(false).await?;
        let normalizer = Normalizer::new(self.chain.priority_ranking(Capability::DailySeries));

        let mut report = FetchReport {
            universe: universe.symbols.len(),
            selection_method: Some(universe.selection_method),
            ..FetchReport::default()
        };

        info!(
            "Fetch cycle for {}..{} over {} symbols in batches of {}",
            range.start,
            range.end,
            universe.symbols.len(),
            settings.batch_size
        );

        let batches: Vec<&[Symbol]> = universe.symbols.chunks(settings.batch_size).collect();
        for (i, batch) in batches.iter().enumerate() {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }

            let fetched = join_all(batch.iter().map(|symbol| self.fetch_symbol(symbol, &range))).await;

            let raw: Vec<DailyObservation> = fetched.into_iter().flatten().collect();
            let (clean, normalized) = normalizer.normalize(raw);
            report.anomalies_discarded += normalized.anomalies.len();
            report.duplicates_dropped += normalized.duplicates_dropped;

            let kept: HashSet<&Symbol> = clean.iter().map(|row| &row.symbol).collect();
            for symbol in batch.iter() {
                if kept.contains(symbol) {
                    report.succeeded.push(symbol.clone());
                } else {
                    report.failed.push(symbol.clone());
                }
            }

            if !clean.is_empty() {
                let records: Vec<MarketDataRecord> = clean.iter().map(MarketDataRecord::from).collect();
                report.observations_written += self.store.upsert_observations(records).await?;
            }

            debug!(
                "Batch {}/{} committed: {} symbols, {} rows",
                i + 1,
                batches.len(),
                batch.len(),
                clean.len()
            );

            if i + 1 < batches.len() && !settings.inter_batch_pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(settings.inter_batch_pause) => {}
                    Ok(()) = shutdown.changed() => {}
                }
            }
        }

        if report.cancelled {
            warn!("Fetch cycle cancelled: {}", report.summary());
            return Ok(report);
        }

        report.index_records = self.index.rebuild(&range).await?.len();
        info!("Fetch cycle complete: {}", report.summary());
        Ok(report)
    }
}
