pub mod binance;
pub mod coingecko;
pub mod util;

use crate::core::config::ProvidersConfig;
use crate::core::price::{PriceProvider, ProviderKind};
use anyhow::Result;
use std::sync::Arc;

pub use binance::BinanceProvider;
pub use coingecko::CoinGeckoProvider;

/// Instantiates the configured provider behind the common contract.
pub fn build_provider(
    kind: ProviderKind,
    config: &ProvidersConfig,
) -> Result<Arc<dyn PriceProvider>> {
    let provider: Arc<dyn PriceProvider> = match kind {
        ProviderKind::Binance => Arc::new(BinanceProvider::new(
            &config.binance_base_url,
            config.timeout,
        )?),
        ProviderKind::CoinGecko => Arc::new(CoinGeckoProvider::new(
            &config.coingecko_base_url,
            config.timeout,
        )?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn providers_config(timeout: Duration) -> ProvidersConfig {
        ProvidersConfig {
            binance_base_url: "http://localhost:1".to_string(),
            coingecko_base_url: "http://localhost:2".to_string(),
            timeout,
        }
    }

    #[test]
    fn test_build_provider_by_kind() {
        let config = providers_config(Duration::from_secs(1));

        let provider = build_provider(ProviderKind::Binance, &config).unwrap();
        assert_eq!(provider.name(), "binance");
        let provider = build_provider(ProviderKind::CoinGecko, &config).unwrap();
        assert_eq!(provider.name(), "coingecko");
    }

    #[test]
    fn test_build_provider_fails_without_http_client() {
        let config = providers_config(Duration::ZERO);

        for kind in [ProviderKind::Binance, ProviderKind::CoinGecko] {
            let err = build_provider(kind, &config).err().unwrap();
            assert!(err.to_string().contains("HTTP client"), "{kind}: {err}");
        }
    }
}
