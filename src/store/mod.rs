pub mod disk;
pub mod memory;

use crate::core::config::{AppConfig, StoreBackend};
use crate::core::observation::ObservationStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Opens the store selected by the configuration.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn ObservationStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory observation store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Disk => {
            let path = config.default_data_path()?.join("prices");
            let store = DiskStore::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?;
            info!(path = %path.display(), "Using on-disk observation store");
            Ok(Arc::new(store))
        }
    }
}
