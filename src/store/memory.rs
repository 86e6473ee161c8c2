use crate::core::observation::{NewObservation, Observation, ObservationStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Inner {
    next_id: u64,
    pairs: HashMap<(String, String), Vec<Observation>>,
}

/// In-memory observation store, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn save(&self, observation: NewObservation) -> Result<Observation, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let stored = observation.into_stored(inner.next_id);
        debug!(id = stored.id, instrument = %stored.instrument, "Store PUT");

        inner
            .pairs
            .entry((stored.instrument.clone(), stored.quoted_instrument.clone()))
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn latest(
        &self,
        instrument: &str,
        quoted_instrument: &str,
    ) -> Result<Option<Observation>, StoreError> {
        let inner = self.inner.lock().await;
        let latest = inner
            .pairs
            .get(&(instrument.to_string(), quoted_instrument.to_string()))
            .and_then(|observations| {
                observations
                    .iter()
                    .max_by_key(|o| (o.observed_at, o.id))
                    .cloned()
            });
        Ok(latest)
    }
}
