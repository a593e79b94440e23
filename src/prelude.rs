//! Convenience re-exports for common usage

pub use crate::cache::config::CacheConfig;
pub use crate::cache::error::CacheError;
pub use crate::cache::policy::ContentType;
pub use crate::cache::tier::hot::HotTierStats;
pub use crate::multi_layer::{Memoized, MultiLayerCache, MultiLayerCacheBuilder, WarmEntry};
pub use crate::telemetry::MetricsSnapshot;
