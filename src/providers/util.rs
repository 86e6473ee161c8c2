use crate::core::price::ProviderError;
use anyhow::{Context, Result, bail};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("spotfeed/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by all requests of one provider.
///
/// The timeout covers the whole request, so a stalled upstream surfaces as a
/// transport error instead of hanging the ingestion cycle.
pub fn build_client(timeout: Duration) -> Result<Client> {
    if timeout.is_zero() {
        bail!("HTTP client timeout must be greater than zero");
    }
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Joins `endpoint` onto `base_url` and appends the query pairs.
pub fn endpoint_url(
    provider: &'static str,
    base_url: &str,
    endpoint: &str,
    query: &[(&str, &str)],
) -> Result<Url, ProviderError> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), endpoint);
    let mut url = Url::parse(&raw).map_err(|e| ProviderError::Schema {
        provider,
        message: format!("invalid endpoint URL {raw}: {e}"),
    })?;
    url.query_pairs_mut().extend_pairs(query);
    Ok(url)
}

/// Sends a GET request and decodes a JSON body of type `T`.
pub async fn get_json<T: DeserializeOwned>(
    provider: &'static str,
    client: &Client,
    url: Url,
) -> Result<T, ProviderError> {
    debug!("Requesting price data from {}", url);

    let response = client
        .get(url)
        .header("accept", "application/json")
        .send()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status { provider, status });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;

    serde_json::from_slice(&body).map_err(|e| ProviderError::Schema {
        provider,
        message: e.to_string(),
    })
}

/// Parses a wire price, accepting only positive finite values.
pub fn parse_price(provider: &'static str, raw: &str) -> Result<f64, ProviderError> {
    match raw.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        _ => Err(ProviderError::InvalidPrice {
            provider,
            raw: raw.to_string(),
        }),
    }
}
