//! Core business logic abstractions

pub mod config;
pub mod log;
pub mod observation;
pub mod price;

// Re-export main types for cleaner imports
pub use observation::{NewObservation, Observation, ObservationStore, StoreError};
pub use price::{PriceProvider, ProviderError, ProviderKind};
