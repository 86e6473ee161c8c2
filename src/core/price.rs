//! Pricing abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// The upstream price APIs this service knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Binance,
    CoinGecko,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ProviderKind::Binance => "binance",
                ProviderKind::CoinGecko => "coingecko",
            }
        )
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(ProviderKind::Binance),
            "coingecko" => Ok(ProviderKind::CoinGecko),
            _ => Err(anyhow::anyhow!("Invalid price provider: {}", s)),
        }
    }
}

/// Failure of a single price fetch.
///
/// Every variant carries the provider name so a log line is enough to tell
/// which upstream misbehaved.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// DNS, connect or timeout failure talking to the upstream.
    #[error("{provider}: request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("{provider}: upstream returned status {status}")]
    Status {
        provider: &'static str,
        status: StatusCode,
    },

    /// The body did not have the expected shape.
    #[error("{provider}: unexpected response: {message}")]
    Schema {
        provider: &'static str,
        message: String,
    },

    /// The price field was present but not a positive finite number.
    #[error("{provider}: invalid price {raw:?}")]
    InvalidPrice { provider: &'static str, raw: String },
}

impl ProviderError {
    /// True for failures caused by the response content rather than the exchange
    /// with the upstream.
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            ProviderError::Schema { .. } | ProviderError::InvalidPrice { .. }
        )
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Schema { provider, .. }
            | ProviderError::InvalidPrice { provider, .. } => provider,
        }
    }
}

/// A source of spot prices for a single `base`/`quoted` pair.
///
/// Implementations perform exactly one outbound request per call and normalize
/// whatever the upstream returns into a plain `f64`.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable lowercase name used in logs and routes.
    fn name(&self) -> &'static str;

    async fn fetch_price(&self, base: &str, quoted: &str) -> Result<f64, ProviderError>;
}
