//! Test doubles shared by the service tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capindex_market_data::{
    Capability, DailyObservation, DateRange, ProviderCapabilities, ProviderChain, ProviderOutcome,
    ProviderShape, RateLimit, SourceProvider, Symbol,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::index::IndexPerformanceRecord;
use crate::market_data::{MarketDataRecord, MarketDataStore};
use crate::settings::{FetcherSettings, SettingsService, SettingsServiceTrait};

/// Provider answering from fixed tables and recording every call.
pub(crate) struct CapProvider {
    caps: HashMap<String, Decimal>,
    series: HashMap<String, Vec<(NaiveDate, Decimal, Decimal)>>,
    delay: Duration,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl CapProvider {
    pub fn new(caps: &[(&str, Decimal)]) -> Self {
        Self {
            caps: caps.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
            series: HashMap::new(),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_series(mut self, symbol: &str, rows: &[(NaiveDate, Decimal, Decimal)]) -> Self {
        self.series.insert(symbol.to_string(), rows.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SourceProvider for CapProvider {
    fn id(&self) -> &'static str {
        "MOCK"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            daily_series: true,
            market_cap: true,
            shape: ProviderShape::StructuredApi,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::from_secs(0)
    }

    fn priority(&self, _capability: Capability) -> u8 {
        1
    }

    async fn daily_series(
        &self,
        symbol: &Symbol,
        _range: &DateRange,
    ) -> ProviderOutcome<Vec<DailyObservation>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("series:{}", symbol));
        let rows: Vec<DailyObservation> = self
            .series
            .get(symbol.as_str())
            .map(|rows| {
                rows.iter()
                    .map(|(date, price, volume)| {
                        DailyObservation::new(*date, symbol.clone(), *price, *volume, "MOCK")
                    })
                    .collect()
            })
            .unwrap_or_default();
        ProviderOutcome::from_series(Ok(rows))
    }

    async fn market_cap(&self, symbol: &Symbol) -> ProviderOutcome<Decimal> {
        self.calls.lock().unwrap().push(format!("cap:{}", symbol));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.caps.get(symbol.as_str()) {
            Some(value) => ProviderOutcome::Success(*value),
            None => ProviderOutcome::Empty,
        }
    }
}

pub(crate) fn settings_service(chain: Arc<ProviderChain>) -> Arc<dyn SettingsServiceTrait> {
    settings_service_with(chain, FetcherSettings::default())
}

pub(crate) fn settings_service_with(
    chain: Arc<ProviderChain>,
    settings: FetcherSettings,
) -> Arc<dyn SettingsServiceTrait> {
    Arc::new(SettingsService::new(settings, chain).unwrap())
}

/// In-memory store keyed like the SQLite tables.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub observations: Mutex<BTreeMap<(NaiveDate, String), MarketDataRecord>>,
    pub index: Mutex<BTreeMap<NaiveDate, IndexPerformanceRecord>>,
}

#[async_trait]
impl MarketDataStore for MemoryStore {
    async fn upsert_observations(
        &self,
        records: Vec<MarketDataRecord>,
    ) -> Result<usize> {
        let mut map = self.observations.lock().unwrap();
        let count = records.len();
        for record in records {
            map.insert((record.date, record.symbol.clone()), record);
        }
        Ok(count)
    }

    fn observations_in_range(
        &self,
        range: &DateRange,
        symbols: Option<&[String]>,
    ) -> Result<Vec<MarketDataRecord>> {
        Ok(self
            .observations
            .lock()
            .unwrap()
            .values()
            .filter(|r| range.contains(r.date))
            .filter(|r| symbols.map_or(true, |s| s.contains(&r.symbol)))
            .cloned()
            .collect())
    }

    fn top_companies(
        &self,
        date: NaiveDate,
        limit: i64,
    ) -> Result<Vec<MarketDataRecord>> {
        let mut rows: Vec<_> = self
            .observations
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.date == date)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self.observations.lock().unwrap().keys().map(|(d, _)| *d).max())
    }

    async fn save_index_performance(
        &self,
        records: Vec<IndexPerformanceRecord>,
    ) -> Result<usize> {
        let mut map = self.index.lock().unwrap();
        let count = records.len();
        for record in records {
            map.insert(record.date, record);
        }
        Ok(count)
    }

    fn index_performance(
        &self,
        range: &DateRange,
    ) -> Result<Vec<IndexPerformanceRecord>> {
        Ok(self
            .index
            .lock()
            .unwrap()
            .values()
            .filter(|r| range.contains(r.date))
            .cloned()
            .collect())
    }
}
