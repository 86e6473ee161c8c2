use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use super::util::{build_client, endpoint_url, get_json, parse_price};
use crate::core::price::{PriceProvider, ProviderError};

const NAME: &str = "coingecko";

/// Spot price lookup against the CoinGecko `simple/price` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    client: Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(CoinGeckoProvider {
            base_url: base_url.to_string(),
            client: build_client(timeout)?,
        })
    }
}

// Leaves are documented as strings but the public API answers with numbers.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PriceLeaf {
    Text(String),
    Number(f64),
}

type SimplePriceResponse = HashMap<String, HashMap<String, PriceLeaf>>;

/// Looks up `key` exactly, then ignoring case.
fn lookup<'a, V>(map: &'a HashMap<String, V>, key: &str) -> Option<&'a V> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn extract_price(
    data: &SimplePriceResponse,
    base: &str,
    quoted: &str,
) -> Result<f64, ProviderError> {
    let quotes = lookup(data, base).ok_or_else(|| ProviderError::Schema {
        provider: NAME,
        message: format!("no entry for {base}"),
    })?;
    let leaf = lookup(quotes, quoted).ok_or_else(|| ProviderError::Schema {
        provider: NAME,
        message: format!("no {quoted} quote for {base}"),
    })?;

    match leaf {
        PriceLeaf::Text(raw) => parse_price(NAME, raw),
        PriceLeaf::Number(value) => parse_price(NAME, &value.to_string()),
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(
        name = "CoinGeckoPriceFetch",
        skip(self),
        fields(base = %base, quoted = %quoted)
    )]
    async fn fetch_price(&self, base: &str, quoted: &str) -> Result<f64, ProviderError> {
        let url = endpoint_url(
            NAME,
            &self.base_url,
            "/api/v3/simple/price",
            &[("ids", base), ("vs_currencies", quoted)],
        )?;

        let data: SimplePriceResponse = get_json(NAME, &self.client, url).await?;
        debug!(entries = data.len(), "Received CoinGecko prices");

        extract_price(&data, base, quoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(
        base: &str,
        quoted: &str,
        response: ResponseTemplate,
    ) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", base))
            .and(query_param("vs_currencies", quoted))
            .respond_with(response)
            .expect(1)
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn provider(uri: &str) -> CoinGeckoProvider {
        CoinGeckoProvider::new(uri, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let mock_response = r#"{"BTC":{"USDT":"65000.50"}}"#;
        let mock_server = create_mock_server(
            "BTC",
            "USDT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;

        let price = provider(&mock_server.uri())
            .fetch_price("BTC", "USDT")
            .await
            .unwrap();
        assert_eq!(price, 65000.50);
    }

    #[tokio::test]
    async fn test_numeric_leaf_and_lowercase_keys() {
        let mock_response = r#"{"eth":{"usdt":3120.25}}"#;
        let mock_server = create_mock_server(
            "ETH",
            "USDT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;

        let price = provider(&mock_server.uri())
            .fetch_price("ETH", "USDT")
            .await
            .unwrap();
        assert_eq!(price, 3120.25);
    }

    #[tokio::test]
    async fn test_unparsable_price_is_schema_error() {
        let mock_response = r#"{"BTC":{"USDT":"N/A"}}"#;
        let mock_server = create_mock_server(
            "BTC",
            "USDT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;

        let err = provider(&mock_server.uri())
            .fetch_price("BTC", "USDT")
            .await
            .unwrap_err();
        assert!(err.is_schema());
        assert!(matches!(err, ProviderError::InvalidPrice { .. }));
    }

    #[tokio::test]
    async fn test_missing_pair_is_schema_error() {
        let mock_response = r#"{}"#;
        let mock_server = create_mock_server(
            "FOO",
            "USDT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;

        let err = provider(&mock_server.uri())
            .fetch_price("FOO", "USDT")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "coingecko: unexpected response: no entry for FOO");
    }

    #[tokio::test]
    async fn test_missing_quote_is_schema_error() {
        let mock_response = r#"{"BTC":{"EUR":"60000.00"}}"#;
        let mock_server = create_mock_server(
            "BTC",
            "USDT",
            ResponseTemplate::new(200).set_body_string(mock_response),
        )
        .await;

        let err = provider(&mock_server.uri())
            .fetch_price("BTC", "USDT")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "coingecko: unexpected response: no USDT quote for BTC"
        );
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let mock_server = create_mock_server("BTC", "USDT", ResponseTemplate::new(429)).await;

        let err = provider(&mock_server.uri())
            .fetch_price("BTC", "USDT")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Status { status, .. } if status.as_u16() == 429
        ));
    }

    #[test]
    fn test_both_shapes_normalize_to_same_value() {
        let data: SimplePriceResponse =
            serde_json::from_str(r#"{"BTC":{"USDT":"65000.50"}}"#).unwrap();
        let nested = extract_price(&data, "BTC", "USDT").unwrap();
        let flat = parse_price("binance", "65000.50").unwrap();
        assert_eq!(nested, flat);
    }
}
