use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use capindex_market_data::ProviderChain;
use log::{info, warn};

use crate::errors::Result;
use crate::settings::{FetcherSettings, SettingsUpdate};

#[async_trait]
pub trait SettingsServiceTrait: Send + Sync {
    fn get_settings(&self) -> FetcherSettings;

    /// Validates and applies a partial update, returning the new settings.
    async fn update_settings(&self, update: &SettingsUpdate) -> Result<FetcherSettings>;
}

/// In-memory settings holder. Updates take effect for the next selection or
/// fetch cycle; the provider chain is reconfigured immediately.
pub struct SettingsService {
    settings: RwLock<FetcherSettings>,
    chain: Arc<ProviderChain>,
}

impl SettingsService {
    /// Fails when the initial settings are invalid; there is no usable
    /// default to fall back to at startup.
    pub fn new(settings: FetcherSettings, chain: Arc<ProviderChain>) -> Result<Self> {
        settings.validate()?;
        chain.reconfigure(settings.chain_config());
        Ok(SettingsService {
            settings: RwLock::new(settings),
            chain,
        })
    }
}

#[async_trait]
impl SettingsServiceTrait for SettingsService {
    fn get_settings(&self) -> FetcherSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| {
                warn!("Settings lock was poisoned. Recovering.");
                poisoned.into_inner()
            })
            .clone()
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<FetcherSettings> {
        let mut next = self.get_settings();
        next.apply(update);
        next.validate()?;

        self.chain.reconfigure(next.chain_config());
        *self.settings.write().unwrap_or_else(|poisoned| {
            warn!("Settings lock was poisoned. Recovering.");
            poisoned.into_inner()
        }) = next.clone();

        info!(
            "Fetcher settings updated: candidates={}, final={}, batch={}",
            next.candidate_pool_size, next.final_pool_size, next.batch_size
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    fn service() -> SettingsService {
        SettingsService::new(FetcherSettings::default(), Arc::new(ProviderChain::new(vec![])))
            .unwrap()
    }

    #[test]
    fn test_invalid_initial_settings_are_fatal() {
        let settings = FetcherSettings {
            final_pool_size: 0,
            ..FetcherSettings::default()
        };
        let result = SettingsService::new(settings, Arc::new(ProviderChain::new(vec![])));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_previous_settings() {
        let service = service();
        let update = SettingsUpdate {
            final_pool_size: Some(1000),
            ..SettingsUpdate::default()
        };

        assert!(service.update_settings(&update).await.is_err());
        assert_eq!(service.get_settings().final_pool_size, 100);
    }

    #[tokio::test]
    async fn test_accepted_update_is_visible() {
        let service = service();
        let update = SettingsUpdate {
            final_pool_size: Some(50),
            ..SettingsUpdate::default()
        };

        let updated = service.update_settings(&update).await.unwrap();
        assert_eq!(updated.final_pool_size, 50);
        assert_eq!(service.get_settings().final_pool_size, 50);
    }
}
