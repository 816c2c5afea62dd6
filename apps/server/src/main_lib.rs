use std::sync::Arc;

use crate::config::Config;
use capindex_core::{
    cache::{MarketCapCache, UniverseCache},
    fetch::{FetchService, FetchServiceTrait},
    index::{CapWeightedIndex, IndexService, IndexServiceTrait},
    market_data::{MarketCapService, MarketCapServiceTrait, MarketDataStore},
    settings::{SettingsService, SettingsServiceTrait},
    universe::{ReferenceListSource, UniverseService, UniverseServiceTrait, WikipediaSp500Source},
};
use capindex_market_data::{default_providers, ProviderChain, SourceProvider};
use capindex_storage_sqlite::{db, market_data::MarketDataRepository};
use tokio::sync::{watch, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub chain: Arc<ProviderChain>,
    pub settings_service: Arc<dyn SettingsServiceTrait>,
    pub market_cap_service: Arc<dyn MarketCapServiceTrait>,
    pub universe_service: Arc<dyn UniverseServiceTrait>,
    pub index_service: Arc<dyn IndexServiceTrait>,
    pub fetch_service: Arc<dyn FetchServiceTrait>,
    pub market_data_store: Arc<dyn MarketDataStore>,
    /// Held for the duration of a fetch cycle; one cycle at a time.
    pub fetch_lock: Mutex<()>,
    /// Flipped to true on process shutdown so running cycles stop between batches.
    pub shutdown: watch::Sender<bool>,
    pub db_path: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("CAPINDEX_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Wires the production providers and reference list.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let providers = default_providers(&config.provider_keys);
    let reference: Arc<dyn ReferenceListSource> = Arc::new(WikipediaSp500Source::new());
    build_state_with(config, providers, reference).await
}

/// Wires every service around the given providers and reference list.
pub async fn build_state_with(
    config: &Config,
    providers: Vec<Arc<dyn SourceProvider>>,
    reference: Arc<dyn ReferenceListSource>,
) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.data_dir_str())?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let market_data_repository = Arc::new(MarketDataRepository::new(pool.clone(), writer.clone()));
    let market_data_store: Arc<dyn MarketDataStore> = market_data_repository;

    let chain = Arc::new(ProviderChain::with_config(
        providers,
        config.settings.chain_config(),
    ));
    for summary in chain.summaries() {
        tracing::info!(
            "Provider {} registered (daily series rank {:?}, market cap rank {:?}, spacing {}s)",
            summary.id,
            summary.daily_series_rank,
            summary.market_cap_rank,
            summary.spacing_seconds
        );
    }

    // An invalid configuration stops startup here.
    let settings_service: Arc<dyn SettingsServiceTrait> = Arc::new(SettingsService::new(
        config.settings.clone(),
        chain.clone(),
    )?);

    let cache_dir = config.settings.cache_dir.clone();
    let market_cap_cache = Arc::new(MarketCapCache::open(&cache_dir));
    let universe_cache = Arc::new(UniverseCache::open(&cache_dir));
    tracing::info!(
        "Cache directory {} ({} market caps loaded)",
        cache_dir.display(),
        market_cap_cache.len()
    );

    let market_cap_service: Arc<dyn MarketCapServiceTrait> = Arc::new(MarketCapService::new(
        chain.clone(),
        market_cap_cache,
        settings_service.clone(),
    ));

    let universe_service: Arc<dyn UniverseServiceTrait> = Arc::new(UniverseService::new(
        reference,
        market_cap_service.clone(),
        universe_cache,
        settings_service.clone(),
    ));

    let index_service: Arc<dyn IndexServiceTrait> = Arc::new(IndexService::new(
        market_data_store.clone(),
        Arc::new(CapWeightedIndex),
    ));

    let fetch_service: Arc<dyn FetchServiceTrait> = Arc::new(FetchService::new(
        chain.clone(),
        universe_service.clone(),
        market_cap_service.clone(),
        market_data_store.clone(),
        index_service.clone(),
        settings_service.clone(),
    ));

    let (shutdown, _) = watch::channel(false);

    Ok(Arc::new(AppState {
        chain,
        settings_service,
        market_cap_service,
        universe_service,
        index_service,
        fetch_service,
        market_data_store,
        fetch_lock: Mutex::new(()),
        shutdown,
        db_path,
    }))
}
