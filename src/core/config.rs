use crate::core::price::ProviderKind;
use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use reqwest::Url;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CURRENCIES: &str = "BTC,ETH,BNB,SOL,TON,TRX,DOGE,ADA,AVAX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Disk,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disk" => Ok(StoreBackend::Disk),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(anyhow!("Invalid store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub binance_base_url: String,
    pub coingecko_base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub quoted_currency: String,
    pub port: u16,
    pub currencies: Vec<String>,
    pub update_interval: Duration,
    pub provider: ProviderKind,
    pub providers: ProvidersConfig,
    pub fetch_concurrency: usize,
    pub store_backend: StoreBackend,
    pub data_path: Option<PathBuf>,
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// Loads configuration from the process environment, after seeding it from
    /// `env_file` (or `.env` in the working directory) when present.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("Failed to load env file: {}", path.display()))?;
            }
            None => {
                if let Err(e) = dotenvy::dotenv() {
                    debug!(error = %e, "No .env file loaded");
                }
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value,
                None => {
                    warn!("{key} not set, using default: {default}");
                    default.to_string()
                }
            }
        };

        let quoted_currency = get("QUOTED_CURRENCY", "USDT").trim().to_uppercase();
        let port = parse_value("PORT", &get("PORT", "8080"))?;
        let currencies = parse_currencies(&get("CURRENCIES", DEFAULT_CURRENCIES))?;

        let interval_secs: u64 =
            parse_value("UPDATE_INTERVAL_SECS", &get("UPDATE_INTERVAL_SECS", "3600"))?;
        if interval_secs == 0 {
            bail!("UPDATE_INTERVAL_SECS must be greater than zero");
        }

        let provider = parse_value("PRICE_PROVIDER", &get("PRICE_PROVIDER", "binance"))?;
        let timeout_secs: u64 =
            parse_value("PROVIDER_TIMEOUT_SECS", &get("PROVIDER_TIMEOUT_SECS", "10"))?;
        if timeout_secs == 0 {
            bail!("PROVIDER_TIMEOUT_SECS must be greater than zero");
        }
        let providers = ProvidersConfig {
            binance_base_url: parse_base_url(
                "BINANCE_BASE_URL",
                get("BINANCE_BASE_URL", "https://api.binance.com"),
            )?,
            coingecko_base_url: parse_base_url(
                "COINGECKO_BASE_URL",
                get("COINGECKO_BASE_URL", "https://api.coingecko.com"),
            )?,
            timeout: Duration::from_secs(timeout_secs),
        };

        let fetch_concurrency: usize =
            parse_value("FETCH_CONCURRENCY", &get("FETCH_CONCURRENCY", "1"))?;
        if fetch_concurrency == 0 {
            bail!("FETCH_CONCURRENCY must be greater than zero");
        }

        let store_backend = parse_value("STORE_BACKEND", &get("STORE_BACKEND", "disk"))?;
        let data_path = lookup("DATA_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let shutdown_secs: u64 =
            parse_value("SHUTDOWN_TIMEOUT_SECS", &get("SHUTDOWN_TIMEOUT_SECS", "30"))?;

        let config = AppConfig {
            quoted_currency,
            port,
            currencies,
            update_interval: Duration::from_secs(interval_secs),
            provider,
            providers,
            fetch_concurrency,
            store_backend,
            data_path,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        };
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(custom_path.clone());
        }
        let proj_dirs = ProjectDirs::from("dev", "spotfeed", "spotfeed")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid value for {key}: {raw:?} ({e})"))
}

fn parse_base_url(key: &str, raw: String) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| anyhow!("Invalid value for {key}: {raw:?} ({e})"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Invalid value for {key}: {raw:?} (expected an http or https URL)");
    }
    Ok(raw.trim().to_string())
}

fn parse_currencies(raw: &str) -> Result<Vec<String>> {
    let mut currencies: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !currencies.contains(&symbol) {
            currencies.push(symbol);
        }
    }
    if currencies.is_empty() {
        bail!("CURRENCIES must name at least one instrument");
    }
    Ok(currencies)
}
