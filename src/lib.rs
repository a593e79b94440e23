//! stratacache - multi-tier caching engine
//!
//! A caching engine that sits in front of expensive computations and slow
//! backing stores, coordinating three heterogeneous tiers behind one
//! consistent async API.
//!
//! # Features
//!
//! - **Multi-tier architecture**: in-process hot tier (L1), shared remote
//!   key-value tier (L2), durable object-store tier (L3)
//! - **Content-type placement**: a closed policy table decides which tiers
//!   hold a value and for how long
//! - **Single-flight fallback**: at most one computation per missing key,
//!   even under concurrent misses
//! - **Backfill on read**: slower-tier hits repopulate the faster tiers
//! - **Transparent compression**: LZ4 framing for large durable payloads
//! - **Graceful degradation**: a tier outage is a miss, never a caller error
//! - **Telemetry**: per-tier hit/miss counters, efficiency, latency

// Public API modules
pub mod multi_layer;
pub mod prelude;

// Cache implementation modules - tier client traits are public so embedders
// can inject their own backing stores
pub mod cache;
pub mod telemetry;

// Re-export the public API at the crate root for convenience
pub use cache::config::CacheConfig;
pub use cache::error::CacheError;
pub use cache::policy::{ContentType, PlacementPolicy, TierLocation, TierSet};
pub use multi_layer::{Memoized, MultiLayerCache, MultiLayerCacheBuilder, WarmEntry};
pub use prelude::*;

// Client traits and in-memory backends that embedders and tests implement
// or reuse directly
pub mod clients {
    pub use crate::cache::tier::durable::{InMemoryObjectStore, ObjectStoreClient};
    pub use crate::cache::tier::shared::{InMemoryKvClient, RemoteKvClient};
}
