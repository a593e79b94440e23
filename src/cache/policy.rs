//! Content-type placement policy
//!
//! Every cached value carries a `ContentType` tag. The tag selects which
//! tiers hold the value and for how long. The mapping is a closed, static
//! table, not runtime string matching, so the set of placement behaviors
//! stays exhaustive and testable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::config::CacheConfig;

/// Tier identifiers in probe-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierLocation {
    /// In-process hot tier.
    L1,
    /// Shared remote key-value tier.
    L2,
    /// Durable object-store tier.
    L3,
}

/// Small bitset over the three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierSet(u8);

impl TierSet {
    pub const EMPTY: TierSet = TierSet(0);

    const fn bit(tier: TierLocation) -> u8 {
        match tier {
            TierLocation::L1 => 0b001,
            TierLocation::L2 => 0b010,
            TierLocation::L3 => 0b100,
        }
    }

    pub const fn of(tiers: &[TierLocation]) -> TierSet {
        let mut bits = 0u8;
        let mut i = 0;
        while i < tiers.len() {
            bits |= Self::bit(tiers[i]);
            i += 1;
        }
        TierSet(bits)
    }

    pub const fn contains(self, tier: TierLocation) -> bool {
        self.0 & Self::bit(tier) != 0
    }

    pub const fn without(self, tier: TierLocation) -> TierSet {
        TierSet(self.0 & !Self::bit(tier))
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Member tiers in probe-priority order (L1 first).
    pub fn iter(self) -> impl Iterator<Item = TierLocation> {
        [TierLocation::L1, TierLocation::L2, TierLocation::L3]
            .into_iter()
            .filter(move |tier| self.contains(*tier))
    }
}

/// Content classifications recognized by the engine.
///
/// Closed set: adding a classification means adding a policy row, which
/// keeps routing decisions exhaustive at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Generated model responses: small, re-read often, shared.
    AiResponse,
    /// Application configuration: small, rarely changes, worth durability.
    Configuration,
    /// Session state: must stay fresh, never served long-lived.
    UserSession,
    /// Per-message emotion classification results.
    EmotionAnalysis,
    /// Large static assets: kept out of the hot tier.
    StaticAsset,
    /// Bulk model data: large, never placed in L1.
    ModelWeights,
}

impl ContentType {
    /// Static placement row: tier subset plus TTL, before any per-tier
    /// config clamping.
    pub const fn base_policy(self) -> PlacementPolicy {
        use TierLocation::*;
        match self {
            ContentType::AiResponse => PlacementPolicy::new(TierSet::of(&[L1, L2]), 3600),
            ContentType::EmotionAnalysis => PlacementPolicy::new(TierSet::of(&[L1, L2]), 1800),
            ContentType::Configuration => {
                PlacementPolicy::new(TierSet::of(&[L1, L2, L3]), 86_400)
            }
            ContentType::UserSession => PlacementPolicy::new(TierSet::of(&[L1, L2]), 900),
            ContentType::StaticAsset => PlacementPolicy::new(TierSet::of(&[L2, L3]), 604_800),
            ContentType::ModelWeights => PlacementPolicy::new(TierSet::of(&[L2, L3]), 604_800),
        }
    }
}

/// Resolved placement for one content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Tiers this content type occupies.
    pub tiers: TierSet,
    /// Time-to-live applied when writing to those tiers, in seconds.
    pub ttl_seconds: u64,
}

impl PlacementPolicy {
    pub const fn new(tiers: TierSet, ttl_seconds: u64) -> Self {
        Self { tiers, ttl_seconds }
    }

    /// TTL for a specific tier, clamped to that tier's configured ceiling.
    pub fn ttl_for(&self, tier: TierLocation, config: &CacheConfig) -> Duration {
        let ceiling = match tier {
            TierLocation::L1 => config.l1_ttl_seconds,
            TierLocation::L2 => config.l2_ttl_seconds,
            TierLocation::L3 => config.l3_ttl_seconds,
        };
        Duration::from_secs(self.ttl_seconds.min(ceiling))
    }
}

/// Policy table resolved against a config: tiers disabled in the config are
/// filtered out of every row at construction, so routing never consults the
/// enable flags again.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    enabled: TierSet,
}

impl PolicyTable {
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut enabled = TierSet::of(&[TierLocation::L1, TierLocation::L2, TierLocation::L3]);
        if !config.l1_enabled {
            enabled = enabled.without(TierLocation::L1);
        }
        if !config.l2_enabled {
            enabled = enabled.without(TierLocation::L2);
        }
        if !config.l3_enabled {
            enabled = enabled.without(TierLocation::L3);
        }
        Self { enabled }
    }

    /// Placement for a content type with disabled tiers masked off.
    pub fn policy_for(&self, content_type: ContentType) -> PlacementPolicy {
        let base = content_type.base_policy();
        PlacementPolicy {
            tiers: TierSet(base.tiers.0 & self.enabled.0),
            ttl_seconds: base.ttl_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_assets_skip_the_hot_tier() {
        let policy = ContentType::StaticAsset.base_policy();
        assert!(!policy.tiers.contains(TierLocation::L1));
        assert!(policy.tiers.contains(TierLocation::L2));
        assert!(policy.tiers.contains(TierLocation::L3));
    }

    #[test]
    fn model_weights_never_touch_l1() {
        let policy = ContentType::ModelWeights.base_policy();
        assert!(!policy.tiers.contains(TierLocation::L1));
    }

    #[test]
    fn configuration_spans_all_tiers() {
        let policy = ContentType::Configuration.base_policy();
        for tier in [TierLocation::L1, TierLocation::L2, TierLocation::L3] {
            assert!(policy.tiers.contains(tier));
        }
    }

    #[test]
    fn disabled_tiers_are_masked_from_policies() {
        let config = CacheConfig {
            l3_enabled: false,
            ..CacheConfig::default()
        };
        let table = PolicyTable::from_config(&config);
        let policy = table.policy_for(ContentType::Configuration);
        assert!(policy.tiers.contains(TierLocation::L1));
        assert!(policy.tiers.contains(TierLocation::L2));
        assert!(!policy.tiers.contains(TierLocation::L3));
    }

    #[test]
    fn policy_ttl_is_clamped_by_tier_ceiling() {
        let config = CacheConfig {
            l1_ttl_seconds: 60,
            ..CacheConfig::default()
        };
        let policy = ContentType::AiResponse.base_policy();
        assert_eq!(
            policy.ttl_for(TierLocation::L1, &config),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.ttl_for(TierLocation::L2, &config),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn tier_set_iterates_in_priority_order() {
        let set = TierSet::of(&[TierLocation::L3, TierLocation::L1]);
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, vec![TierLocation::L1, TierLocation::L3]);
    }
}
