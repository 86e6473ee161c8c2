use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{build_client, endpoint_url, get_json, parse_price};
use crate::core::price::{PriceProvider, ProviderError};

const NAME: &str = "binance";

/// Spot price lookup against the Binance ticker endpoint.
pub struct BinanceProvider {
    base_url: String,
    client: Client,
}

impl BinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(BinanceProvider {
            base_url: base_url.to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct TickerPriceResponse {
    symbol: String,
    price: String,
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(
        name = "BinancePriceFetch",
        skip(self),
        fields(base = %base, quoted = %quoted)
    )]
    async fn fetch_price(&self, base: &str, quoted: &str) -> Result<f64, ProviderError> {
        let symbol = format!("{base}{quoted}");
        let url = endpoint_url(
            NAME,
            &self.base_url,
            "/api/v3/ticker/price",
            &[("symbol", symbol.as_str())],
        )?;

        let data: TickerPriceResponse = get_json(NAME, &self.client, url).await?;
        debug!(symbol = %data.symbol, price = %data.price, "Received Binance ticker");

        parse_price(NAME, &data.price)
    }
}
