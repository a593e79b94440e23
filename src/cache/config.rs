//! Cache configuration types
//!
//! `CacheConfig` is created once, validated at construction of the
//! orchestrator, and read-only thereafter. All sizes are explicit; there is
//! no auto-detection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::error::CacheError;

/// Full engine configuration.
///
/// Per-tier `*_ttl_seconds` values cap the effective TTL for that tier: a
/// content-type policy asking for a longer TTL is clamped down to the tier
/// limit, so an operator can tighten freshness without editing the policy
/// table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Instance identifier used in log lines (defaults to a UUID).
    pub cache_id: String,
    /// Enable the in-process hot tier.
    pub l1_enabled: bool,
    /// Hot tier resident-size bound in megabytes.
    pub l1_max_size_mb: u64,
    /// Hot tier entry-count bound.
    pub l1_max_items: usize,
    /// Hot tier TTL ceiling in seconds.
    pub l1_ttl_seconds: u64,
    /// Enable the shared remote tier.
    pub l2_enabled: bool,
    /// Endpoint of the shared tier backend (informational; the client is
    /// injected already connected).
    pub l2_endpoint: String,
    /// Shared tier TTL ceiling in seconds.
    pub l2_ttl_seconds: u64,
    /// Enable the durable object-store tier.
    pub l3_enabled: bool,
    /// Durable tier TTL ceiling in seconds.
    pub l3_ttl_seconds: u64,
    /// Compress durable-tier payloads at or above the threshold.
    pub compression_enabled: bool,
    /// Minimum payload size in bytes before compression kicks in.
    pub compression_threshold_bytes: usize,
    /// Run remote write-through and backfill on spawned tasks instead of
    /// inline with the caller.
    pub async_write_enabled: bool,
    /// Allow `warm_cache` bulk population.
    pub cache_warming_enabled: bool,
    /// Record hit/miss/latency counters.
    pub metrics_enabled: bool,
    /// Upper bound on a single remote tier call, in milliseconds.
    pub tier_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_id: Uuid::new_v4().to_string(),
            l1_enabled: true,
            l1_max_size_mb: 64,
            l1_max_items: 10_000,
            l1_ttl_seconds: 3600,
            l2_enabled: true,
            l2_endpoint: String::new(),
            l2_ttl_seconds: 86_400,
            l3_enabled: true,
            l3_ttl_seconds: 7 * 86_400,
            compression_enabled: true,
            compression_threshold_bytes: 4096,
            async_write_enabled: false,
            cache_warming_enabled: true,
            metrics_enabled: true,
            tier_timeout_ms: 2_000,
        }
    }
}

impl CacheConfig {
    /// Validate invariants that would otherwise surface as runtime bugs.
    /// Called once at orchestrator construction; failures are fatal.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.l1_enabled {
            if self.l1_max_size_mb == 0 {
                return Err(CacheError::InvalidConfiguration(
                    "l1_max_size_mb must be > 0 when L1 is enabled".to_string(),
                ));
            }
            if self.l1_max_items == 0 {
                return Err(CacheError::InvalidConfiguration(
                    "l1_max_items must be > 0 when L1 is enabled".to_string(),
                ));
            }
            if self.l1_ttl_seconds == 0 {
                return Err(CacheError::InvalidConfiguration(
                    "l1_ttl_seconds must be > 0 when L1 is enabled".to_string(),
                ));
            }
        }
        if self.l2_enabled && self.l2_ttl_seconds == 0 {
            return Err(CacheError::InvalidConfiguration(
                "l2_ttl_seconds must be > 0 when L2 is enabled".to_string(),
            ));
        }
        if self.l3_enabled && self.l3_ttl_seconds == 0 {
            return Err(CacheError::InvalidConfiguration(
                "l3_ttl_seconds must be > 0 when L3 is enabled".to_string(),
            ));
        }
        if self.compression_enabled && self.compression_threshold_bytes == 0 {
            return Err(CacheError::InvalidConfiguration(
                "compression_threshold_bytes must be > 0 when compression is enabled".to_string(),
            ));
        }
        if self.tier_timeout_ms == 0 {
            return Err(CacheError::InvalidConfiguration(
                "tier_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Hot tier byte bound.
    pub fn l1_max_size_bytes(&self) -> u64 {
        self.l1_max_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_l1_items_rejected() {
        let config = CacheConfig {
            l1_max_items: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_l1_items_allowed_when_l1_disabled() {
        let config = CacheConfig {
            l1_enabled: false,
            l1_max_items: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_compression_threshold_rejected() {
        let config = CacheConfig {
            compression_threshold_bytes: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
