use crate::core::observation::{NewObservation, Observation, ObservationStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

const PRICES_PARTITION: &str = "prices";
const META_PARTITION: &str = "meta";
const NEXT_ID_KEY: &[u8] = b"next_id";

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Observation store persisted in a fjall keyspace.
///
/// Records live in the `prices` partition under
/// `instrument \0 quoted \0 observed_at id`, with the timestamp and id encoded
/// big-endian. Keys of one pair therefore sort by observation time and the
/// newest record is the last one under the pair prefix.
pub struct DiskStore {
    keyspace: Keyspace,
    prices: PartitionHandle,
    meta: PartitionHandle,
    // Serializes writers and holds the id sequence.
    next_id: Mutex<u64>,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Open(format!("{}: {e}", path.display())))?;

        let keyspace = Config::new(path)
            .open()
            .map_err(|e| StoreError::Open(format!("{}: {e}", path.display())))?;
        let prices = keyspace
            .open_partition(PRICES_PARTITION, PartitionCreateOptions::default())
            .map_err(|e| StoreError::Open(e.to_string()))?;
        let meta = keyspace
            .open_partition(META_PARTITION, PartitionCreateOptions::default())
            .map_err(|e| StoreError::Open(e.to_string()))?;

        let next_id = match meta.get(NEXT_ID_KEY)? {
            Some(raw) => decode_u64(&raw)?,
            None => 0,
        };
        debug!(path = %path.display(), next_id, "Opened observation store");

        Ok(Self {
            keyspace,
            prices,
            meta,
            next_id: Mutex::new(next_id),
        })
    }
}

fn pair_prefix(instrument: &str, quoted_instrument: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(instrument.len() + quoted_instrument.len() + 2);
    prefix.extend_from_slice(instrument.as_bytes());
    prefix.push(0);
    prefix.extend_from_slice(quoted_instrument.as_bytes());
    prefix.push(0);
    prefix
}

// Flipping the sign bit keeps pre-epoch timestamps ordered before later ones.
fn encode_timestamp(at: &DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_micros() as u64) ^ (1 << 63)).to_be_bytes()
}

fn record_key(observation: &Observation) -> Vec<u8> {
    let mut key = pair_prefix(&observation.instrument, &observation.quoted_instrument);
    key.extend_from_slice(&encode_timestamp(&observation.observed_at));
    key.extend_from_slice(&observation.id.to_be_bytes());
    key
}

fn decode_u64(raw: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Backend(format!("corrupt id sequence ({} bytes)", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[async_trait]
impl ObservationStore for DiskStore {
    async fn save(&self, observation: NewObservation) -> Result<Observation, StoreError> {
        let mut next_id = self.next_id.lock().await;
        let id = *next_id + 1;
        let stored = observation.into_stored(id);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.prices, record_key(&stored), serde_json::to_vec(&stored)?);
        batch.insert(&self.meta, NEXT_ID_KEY, id.to_be_bytes().to_vec());
        batch.commit()?;

        *next_id = id;
        debug!(id, instrument = %stored.instrument, "Store PUT");
        Ok(stored)
    }

    async fn latest(
        &self,
        instrument: &str,
        quoted_instrument: &str,
    ) -> Result<Option<Observation>, StoreError> {
        let prefix = pair_prefix(instrument, quoted_instrument);
        match self.prices.prefix(prefix).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => {
                debug!(instrument, quoted_instrument, "Store MISS");
                Ok(None)
            }
        }
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}
