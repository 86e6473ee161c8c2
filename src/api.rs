//! Read endpoint serving the latest stored price per instrument.
//!
//! The quoted currency is fixed per process, clients only name the instrument:
//! `GET /price/<provider>?currency=BTC`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::observation::ObservationStore;
use crate::error::{ApiError, ApiResult};

pub struct AppState {
    pub store: Arc<dyn ObservationStore>,
    pub quoted_currency: String,
}

#[derive(Deserialize)]
struct PriceQuery {
    currency: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct PriceResponse {
    pub base_currency: String,
    pub quoted_currency: String,
    pub price: f64,
    pub update_time: DateTime<Utc>,
}

/// Latest price of `currency` in the process-wide quoted currency.
async fn get_price(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PriceQuery>, QueryRejection>,
) -> ApiResult<Json<PriceResponse>> {
    let currency = match query {
        Ok(Query(PriceQuery {
            currency: Some(currency),
        })) if !currency.trim().is_empty() => currency.trim().to_uppercase(),
        _ => return Err(ApiError::BadRequest),
    };

    let observation = state
        .store
        .latest(&currency, &state.quoted_currency)
        .await
        .inspect_err(|e| warn!(currency = %currency, error = %e, "Price lookup failed"))?
        .ok_or_else(|| ApiError::NoData {
            instrument: currency.clone(),
            quoted_instrument: state.quoted_currency.clone(),
        })?;
    debug!(currency = %currency, id = observation.id, "Serving price");

    Ok(Json(PriceResponse {
        base_currency: observation.instrument,
        quoted_currency: observation.quoted_instrument,
        price: observation.price,
        update_time: observation.observed_at,
    }))
}

/// Builds the router. The route is named after the provider feeding the store,
/// e.g. `/price/binance`.
pub fn app_router(state: Arc<AppState>, provider_name: &str) -> Router {
    Router::new()
        .route(&format!("/price/{provider_name}"), get(get_price))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::{NewObservation, Observation, StoreError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Wraps a store, counting lookups and optionally failing them.
    struct CountingStore {
        inner: MemoryStore,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new(fail: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                lookups: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ObservationStore for CountingStore {
        async fn save(&self, observation: NewObservation) -> Result<Observation, StoreError> {
            self.inner.save(observation).await
        }

        async fn latest(
            &self,
            instrument: &str,
            quoted_instrument: &str,
        ) -> Result<Option<Observation>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            self.inner.latest(instrument, quoted_instrument).await
        }
    }

    fn router(store: Arc<CountingStore>) -> Router {
        let state = Arc::new(AppState {
            store,
            quoted_currency: "USDT".to_string(),
        });
        app_router(state, "binance")
    }

    async fn send(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_returns_latest_price() {
        let store = Arc::new(CountingStore::new(false));
        let observed_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store
            .save(NewObservation {
                instrument: "BTC".to_string(),
                quoted_instrument: "USDT".to_string(),
                price: 65000.5,
                observed_at,
            })
            .await
            .unwrap();

        let (status, body) = send(router(store), "/price/binance?currency=BTC").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "base_currency": "BTC",
                "quoted_currency": "USDT",
                "price": 65000.5,
                "update_time": "2024-05-01T12:00:00Z",
            })
        );
    }

    #[tokio::test]
    async fn test_lowercase_currency_is_normalized() {
        let store = Arc::new(CountingStore::new(false));
        store
            .save(NewObservation {
                instrument: "ETH".to_string(),
                quoted_instrument: "USDT".to_string(),
                price: 3120.25,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();

        let (status, body) = send(router(store), "/price/binance?currency=eth").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["base_currency"], "ETH");
    }

    #[tokio::test]
    async fn test_missing_currency_is_client_error() {
        let store = Arc::new(CountingStore::new(false));

        for uri in ["/price/binance", "/price/binance?currency=", "/price/binance?in=USDT"] {
            let (status, body) = send(router(store.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body, json!({"error": "wrong query parameters"}));
        }
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_pair_is_server_error() {
        let store = Arc::new(CountingStore::new(false));

        let (status, body) = send(router(store.clone()), "/price/binance?currency=DOGE").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "no price recorded for DOGE/USDT"}));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let store = Arc::new(CountingStore::new(true));

        let (status, body) = send(router(store), "/price/binance?currency=BTC").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "store backend error: connection reset"})
        );
    }
}
