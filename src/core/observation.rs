//! Observations and the storage contract the ingestion core writes to

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored price sample for an `(instrument, quoted_instrument)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: u64,
    pub instrument: String,
    pub quoted_instrument: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// An observation that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub instrument: String,
    pub quoted_instrument: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl NewObservation {
    pub fn into_stored(self, id: u64) -> Observation {
        Observation {
            id,
            instrument: self.instrument,
            quoted_instrument: self.quoted_instrument,
            price: self.price,
            observed_at: self.observed_at,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to encode or decode observation: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Append-only store of observations.
///
/// Implementations must tolerate concurrent callers. `latest` returns `Ok(None)`
/// when nothing was ever saved for the pair, which is not an error.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn save(&self, observation: NewObservation) -> Result<Observation, StoreError>;

    async fn latest(
        &self,
        instrument: &str,
        quoted_instrument: &str,
    ) -> Result<Option<Observation>, StoreError>;

    /// Makes previous writes durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
