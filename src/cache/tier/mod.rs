//! Cache tier implementations
//!
//! Three tiers with one conceptual contract and very different backing
//! stores: `hot` is in-process memory, `shared` fronts a remote key-value
//! store, `durable` fronts a long-lived object store with transparent
//! compression.

pub mod durable;
pub mod hot;
pub mod shared;

pub use durable::{DurableTier, InMemoryObjectStore, ObjectStoreClient};
pub use hot::{HotTier, HotTierStats};
pub use shared::{InMemoryKvClient, RemoteKvClient, SharedTier};
