use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use capindex_core::settings::{FetcherSettings, SettingsUpdate};
use capindex_market_data::ProviderKeys;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Holds the database file and the cache snapshots.
    pub data_dir: PathBuf,
    /// Empty means any origin.
    pub cors_allow_origins: Vec<String>,
    pub provider_keys: ProviderKeys,
    /// Startup settings. Validated when the settings service is built.
    pub settings: FetcherSettings,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("CAPINDEX_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("CAPINDEX_LISTEN_ADDR is not a valid socket address")?;

        let data_dir = PathBuf::from(
            var("CAPINDEX_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );

        let cors_allow_origins = var("CAPINDEX_CORS_ALLOW_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let provider_keys = ProviderKeys {
            alpha_vantage: var("ALPHA_VANTAGE_API_KEY"),
            polygon: var("POLYGON_API_KEY"),
            finnhub: var("FINNHUB_API_KEY"),
        };

        let mut settings = FetcherSettings {
            cache_dir: data_dir.clone(),
            ..FetcherSettings::default()
        };
        settings.apply(&settings_overrides(&var)?);

        Ok(Self {
            listen_addr,
            data_dir,
            cors_allow_origins,
            provider_keys,
            settings,
        })
    }

    pub fn data_dir_str(&self) -> String {
        self.data_dir.to_string_lossy().into_owned()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_var<T, F>(var: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value: {raw}"))
        })
        .transpose()
}

fn parse_secs<F>(var: &F, key: &str) -> anyhow::Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, F>(var, key)?.map(Duration::from_secs))
}

/// `YAHOO=3,POLYGON=15` style provider spacing overrides.
fn parse_delays(raw: &str) -> anyhow::Result<BTreeMap<String, u64>> {
    split_list(raw)
        .into_iter()
        .map(|pair| -> anyhow::Result<(String, u64)> {
            let (id, secs) = pair
                .split_once('=')
                .with_context(|| format!("expected PROVIDER=SECONDS, got {pair}"))?;
            let secs = secs
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid delay for {}", id.trim()))?;
            Ok((id.trim().to_ascii_uppercase(), secs))
        })
        .collect()
}

fn settings_overrides<F>(var: &F) -> anyhow::Result<SettingsUpdate>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(SettingsUpdate {
        candidate_pool_size: parse_var(var, "CAPINDEX_CANDIDATE_POOL_SIZE")?,
        final_pool_size: parse_var(var, "CAPINDEX_FINAL_POOL_SIZE")?,
        batch_size: parse_var(var, "CAPINDEX_BATCH_SIZE")?,
        per_provider_delay_seconds: var("CAPINDEX_PROVIDER_DELAYS")
            .map(|raw| parse_delays(&raw))
            .transpose()
            .context("CAPINDEX_PROVIDER_DELAYS")?,
        universe_cache_ttl: parse_secs(var, "CAPINDEX_UNIVERSE_CACHE_TTL_SECS")?,
        market_cap_cache_ttl: parse_secs(var, "CAPINDEX_MARKET_CAP_CACHE_TTL_SECS")?,
        max_retries_per_provider: parse_var(var, "CAPINDEX_MAX_RETRIES_PER_PROVIDER")?,
        per_symbol_timeout: parse_secs(var, "CAPINDEX_PER_SYMBOL_TIMEOUT_SECS")?,
        inter_batch_pause: parse_secs(var, "CAPINDEX_INTER_BATCH_PAUSE_SECS")?,
        backoff_base_delay: parse_secs(var, "CAPINDEX_BACKOFF_BASE_DELAY_SECS")?,
        fallback_symbols: var("CAPINDEX_FALLBACK_SYMBOLS").map(|raw| {
            split_list(&raw)
                .into_iter()
                .map(|s| s.to_ascii_uppercase())
                .collect()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert!(config.cors_allow_origins.is_empty());
        assert!(config.provider_keys.alpha_vantage.is_none());
        assert_eq!(config.settings.cache_dir, PathBuf::from("./data"));
        assert_eq!(config.settings.final_pool_size, 100);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = config_from(&[
            ("CAPINDEX_LISTEN_ADDR", "127.0.0.1:9000"),
            ("CAPINDEX_DATA_DIR", "/var/lib/capindex"),
            ("CAPINDEX_CORS_ALLOW_ORIGINS", "http://a.test, http://b.test"),
            ("POLYGON_API_KEY", "pk"),
            ("FINNHUB_API_KEY", "  "),
            ("CAPINDEX_FINAL_POOL_SIZE", "25"),
            ("CAPINDEX_PROVIDER_DELAYS", "yahoo=5,POLYGON=20"),
            ("CAPINDEX_MARKET_CAP_CACHE_TTL_SECS", "3600"),
            ("CAPINDEX_FALLBACK_SYMBOLS", "aapl,msft"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.settings.cache_dir, PathBuf::from("/var/lib/capindex"));
        assert_eq!(config.cors_allow_origins.len(), 2);
        assert_eq!(config.provider_keys.polygon.as_deref(), Some("pk"));
        assert!(config.provider_keys.finnhub.is_none());
        assert_eq!(config.settings.final_pool_size, 25);
        assert_eq!(config.settings.per_provider_delay_seconds["YAHOO"], 5);
        assert_eq!(config.settings.per_provider_delay_seconds["POLYGON"], 20);
        assert_eq!(config.settings.per_provider_delay_seconds["ALPHA_VANTAGE"], 12);
        assert_eq!(
            config.settings.market_cap_cache_ttl,
            Duration::from_secs(3600)
        );
        assert_eq!(config.settings.fallback_symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_malformed_values_are_reported() {
        assert!(config_from(&[("CAPINDEX_BATCH_SIZE", "ten")]).is_err());
        assert!(config_from(&[("CAPINDEX_PROVIDER_DELAYS", "YAHOO")]).is_err());
        assert!(config_from(&[("CAPINDEX_LISTEN_ADDR", "nowhere")]).is_err());
    }
}
