//! Public API for the multi-tier cache engine
//!
//! `MultiLayerCache` coordinates the three tiers behind one async surface:
//! policy-ordered probes with backfill, single-flight fallback computation,
//! write-through placement, unconditional invalidation cascades, bulk
//! warming, and a memoizing wrapper for arbitrary computations.
//!
//! Values are typed at this boundary (`serde` in, `serde` out) and opaque
//! bytes below it; the tiers never learn what they hold.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::config::CacheConfig;
use crate::cache::error::CacheError;
use crate::cache::policy::{ContentType, PlacementPolicy, PolicyTable, TierLocation};
use crate::cache::singleflight::FlightGroup;
use crate::cache::tier::durable::{DurableTier, InMemoryObjectStore, ObjectStoreClient};
use crate::cache::tier::hot::{HotTier, HotTierStats};
use crate::cache::tier::shared::{InMemoryKvClient, RemoteKvClient, SharedTier};
use crate::telemetry::{CacheMetrics, MetricsSnapshot};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| CacheError::Deserialization(e.to_string()))
}

/// One pre-serialized entry for bulk cache warming.
#[derive(Debug, Clone)]
pub struct WarmEntry {
    pub key: String,
    pub payload: Vec<u8>,
    pub content_type: ContentType,
}

impl WarmEntry {
    /// Serialize a typed value into a warm entry.
    pub fn new<T: Serialize>(
        key: impl Into<String>,
        value: &T,
        content_type: ContentType,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            key: key.into(),
            payload: encode(value)?,
            content_type,
        })
    }
}

struct CacheCore {
    config: CacheConfig,
    policies: PolicyTable,
    hot: Option<HotTier>,
    shared: Option<SharedTier>,
    durable: Option<DurableTier>,
    metrics: Arc<CacheMetrics>,
    flights: FlightGroup,
}

impl CacheCore {
    /// Probe the policy-selected tiers in priority order. Tier errors are
    /// logged and counted here; hit/miss accounting is the caller's job so
    /// each request produces exactly one terminal event.
    async fn probe(&self, key: &str, policy: &PlacementPolicy) -> Option<(Vec<u8>, TierLocation)> {
        if policy.tiers.contains(TierLocation::L1) {
            if let Some(hot) = &self.hot {
                if let Some(payload) = hot.get(key) {
                    return Some((payload.as_ref().clone(), TierLocation::L1));
                }
            }
        }
        if policy.tiers.contains(TierLocation::L2) {
            if let Some(shared) = &self.shared {
                match shared.get(key).await {
                    Ok(Some(payload)) => return Some((payload, TierLocation::L2)),
                    Ok(None) => {}
                    Err(e) => self.note_tier_error("L2 get", key, &e),
                }
            }
        }
        if policy.tiers.contains(TierLocation::L3) {
            if let Some(durable) = &self.durable {
                match durable.get(key).await {
                    Ok(Some(payload)) => return Some((payload, TierLocation::L3)),
                    Ok(None) => {}
                    Err(e) => self.note_tier_error("L3 get", key, &e),
                }
            }
        }
        None
    }

    /// Populate the policy tiers faster than `hit_tier` with a payload found
    /// in a slower tier. Runs after the slower tier's hit is observed.
    async fn backfill(
        &self,
        key: &str,
        payload: &[u8],
        policy: &PlacementPolicy,
        hit_tier: TierLocation,
    ) {
        if hit_tier != TierLocation::L1 && policy.tiers.contains(TierLocation::L1) {
            if let Some(hot) = &self.hot {
                hot.set(
                    key,
                    payload.to_vec(),
                    policy.ttl_for(TierLocation::L1, &self.config),
                );
            }
        }
        if hit_tier == TierLocation::L3 && policy.tiers.contains(TierLocation::L2) {
            if let Some(shared) = &self.shared {
                let ttl = policy.ttl_for(TierLocation::L2, &self.config);
                if self.config.async_write_enabled {
                    self.spawn_remote_set(TierLocation::L2, key, payload.to_vec(), ttl);
                } else if let Err(e) = shared.set(key, payload.to_vec(), ttl).await {
                    self.note_tier_error("L2 backfill", key, &e);
                }
            }
        }
    }

    /// Write a payload into every policy-selected tier. Returns true only if
    /// the highest-priority available tier accepted it.
    async fn write_through(&self, key: &str, payload: &[u8], policy: &PlacementPolicy) -> bool {
        let mut primary_done = false;
        let mut primary_ok = false;

        for tier in policy.tiers.iter() {
            let accepted = match tier {
                TierLocation::L1 => match &self.hot {
                    Some(hot) => {
                        hot.set(key, payload.to_vec(), policy.ttl_for(tier, &self.config));
                        true
                    }
                    None => continue,
                },
                TierLocation::L2 => {
                    if self.shared.is_none() {
                        continue;
                    }
                    // The primary tier's write is always awaited so the
                    // return value means something even in async-write mode.
                    let must_await = !primary_done || !self.config.async_write_enabled;
                    self.remote_set_awaitable(tier, key, payload.to_vec(), policy, must_await)
                        .await
                }
                TierLocation::L3 => {
                    if self.durable.is_none() {
                        continue;
                    }
                    let must_await = !primary_done || !self.config.async_write_enabled;
                    self.remote_set_awaitable(tier, key, payload.to_vec(), policy, must_await)
                        .await
                }
            };
            if !primary_done {
                primary_done = true;
                primary_ok = accepted;
            }
        }
        primary_ok
    }

    /// Remote write that either awaits the result or detaches onto a task.
    /// Detached writes report acceptance optimistically; failures are still
    /// logged and counted when they settle.
    async fn remote_set_awaitable(
        &self,
        tier: TierLocation,
        key: &str,
        payload: Vec<u8>,
        policy: &PlacementPolicy,
        await_result: bool,
    ) -> bool {
        if await_result {
            let result = match tier {
                TierLocation::L2 => match &self.shared {
                    Some(shared) => {
                        shared
                            .set(key, payload, policy.ttl_for(tier, &self.config))
                            .await
                    }
                    None => return false,
                },
                TierLocation::L3 => match &self.durable {
                    Some(durable) => {
                        durable
                            .set(key, payload, policy.ttl_for(tier, &self.config), true)
                            .await
                    }
                    None => return false,
                },
                TierLocation::L1 => return false,
            };
            match result {
                Ok(()) => true,
                Err(e) => {
                    self.note_tier_error("write", key, &e);
                    false
                }
            }
        } else {
            let ttl = policy.ttl_for(tier, &self.config);
            self.spawn_remote_set(tier, key, payload, ttl);
            true
        }
    }

    /// Detached remote write. Failures are logged and counted when the task
    /// settles; the caller never waits on it.
    fn spawn_remote_set(
        &self,
        tier: TierLocation,
        key: &str,
        payload: Vec<u8>,
        ttl: std::time::Duration,
    ) {
        let metrics = Arc::clone(&self.metrics);
        let metrics_enabled = self.config.metrics_enabled;
        let key = key.to_string();
        match tier {
            TierLocation::L2 => {
                let Some(shared) = self.shared.clone() else {
                    return;
                };
                tokio::task::spawn(async move {
                    if let Err(e) = shared.set(&key, payload, ttl).await {
                        if metrics_enabled {
                            metrics.record_error();
                        }
                        warn!("L2 write for {} degraded: {}", key, e);
                    }
                });
            }
            TierLocation::L3 => {
                let Some(durable) = self.durable.clone() else {
                    return;
                };
                tokio::task::spawn(async move {
                    if let Err(e) = durable.set(&key, payload, ttl, true).await {
                        if metrics_enabled {
                            metrics.record_error();
                        }
                        warn!("L3 write for {} degraded: {}", key, e);
                    }
                });
            }
            TierLocation::L1 => {}
        }
    }

    fn note_tier_error(&self, op: &str, key: &str, error: &CacheError) {
        if self.config.metrics_enabled {
            self.metrics.record_error();
        }
        warn!("{} for {} degraded: {}", op, key, error);
    }

    fn record_terminal_hit(&self, tier: TierLocation) {
        if self.config.metrics_enabled {
            self.metrics.record_hit(tier);
        }
    }

    /// A total miss is attributed to the slowest policy tier probed, so each
    /// request contributes exactly one hit or one miss.
    fn record_terminal_miss(&self, policy: &PlacementPolicy) {
        if self.config.metrics_enabled {
            let tier = policy.tiers.iter().last().unwrap_or(TierLocation::L1);
            self.metrics.record_miss(tier);
        }
    }

    fn record_request(&self) {
        if self.config.metrics_enabled {
            self.metrics.record_request();
        }
    }

    fn record_latency(&self, started: Instant) {
        if self.config.metrics_enabled {
            self.metrics.record_latency(started.elapsed());
        }
    }
}

/// Multi-tier cache orchestrator.
///
/// Cheap to clone (the core is Arc-wrapped); construct one per process and
/// pass it to consumers explicitly instead of going through a global.
#[derive(Clone)]
pub struct MultiLayerCache {
    core: Arc<CacheCore>,
}

impl MultiLayerCache {
    /// Fluent builder; `build()` validates the config and is the explicit
    /// initialization point.
    pub fn builder() -> MultiLayerCacheBuilder {
        MultiLayerCacheBuilder::new()
    }

    /// Probe L1→L2→L3 per the content type's policy; on the first hit,
    /// backfill the faster policy tiers that were skipped and return. On a
    /// total miss, run `compute` under a per-key single-flight lock, store
    /// the result into every policy tier with the policy TTL, and return it.
    ///
    /// A resident unexpired value never re-invokes `compute`. Tier outages
    /// degrade silently (worst case: a miss with timeout latency); compute
    /// errors propagate unmodified and are never cached.
    pub async fn get_with_fallback<T, F, Fut>(
        &self,
        key: &str,
        content_type: ContentType,
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let core = &self.core;
        let started = Instant::now();
        core.record_request();
        let policy = core.policies.policy_for(content_type);

        if let Some((payload, tier)) = core.probe(key, &policy).await {
            core.backfill(key, &payload, &policy, tier).await;
            core.record_terminal_hit(tier);
            core.record_latency(started);
            return decode(&payload);
        }

        // Total miss: serialize computation per key. Waiters re-probe under
        // the lock and find the winner's value instead of recomputing.
        let permit = core.flights.acquire(key).await;
        if let Some((payload, tier)) = core.probe(key, &policy).await {
            core.backfill(key, &payload, &policy, tier).await;
            core.record_terminal_hit(tier);
            core.record_latency(started);
            return decode(&payload);
        }

        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                core.record_terminal_miss(&policy);
                if core.config.metrics_enabled {
                    core.metrics.record_error();
                }
                core.record_latency(started);
                return Err(e);
            }
        };

        // Encode failures count like any other terminal miss; the request
        // still has to show up as exactly one hit or miss in the snapshot.
        let payload = match encode(&value) {
            Ok(payload) => payload,
            Err(e) => {
                core.record_terminal_miss(&policy);
                if core.config.metrics_enabled {
                    core.metrics.record_error();
                }
                core.record_latency(started);
                return Err(e);
            }
        };
        core.write_through(key, &payload, &policy).await;
        drop(permit);

        core.record_terminal_miss(&policy);
        core.record_latency(started);
        Ok(value)
    }

    /// Write a value into every tier selected by the content type's policy.
    /// Returns true only if the highest-priority available policy tier
    /// accepted the write.
    pub async fn set_multi_layer<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        content_type: ContentType,
    ) -> Result<bool, CacheError> {
        let payload = encode(value)?;
        let policy = self.core.policies.policy_for(content_type);
        Ok(self.core.write_through(key, &payload, &policy).await)
    }

    /// Read a value without a fallback computation. Policy-ordered probe
    /// with backfill, counted like any other request.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        content_type: ContentType,
    ) -> Result<Option<T>, CacheError> {
        let core = &self.core;
        let started = Instant::now();
        core.record_request();
        let policy = core.policies.policy_for(content_type);
        let result = match core.probe(key, &policy).await {
            Some((payload, tier)) => {
                core.backfill(key, &payload, &policy, tier).await;
                core.record_terminal_hit(tier);
                decode(&payload).map(Some)
            }
            None => {
                core.record_terminal_miss(&policy);
                Ok(None)
            }
        };
        core.record_latency(started);
        result
    }

    /// Delete a key from all tiers, unconditionally (invalidation is not
    /// policy-scoped). Returns true if at least one tier held it; a failure
    /// on one tier never stops the cascade.
    pub async fn invalidate(&self, key: &str) -> bool {
        let core = &self.core;
        let mut removed = false;
        if let Some(hot) = &core.hot {
            removed |= hot.delete(key);
        }
        if let Some(shared) = &core.shared {
            match shared.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(e) => core.note_tier_error("L2 delete", key, &e),
            }
        }
        if let Some(durable) = &core.durable {
            match durable.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(e) => core.note_tier_error("L3 delete", key, &e),
            }
        }
        debug!("invalidated {} (removed={})", key, removed);
        removed
    }

    /// Bulk write-through. Returns the number of entries whose write
    /// succeeded; one entry's failure never aborts the rest. A no-op when
    /// cache warming is disabled.
    pub async fn warm_cache(&self, entries: Vec<WarmEntry>) -> usize {
        if !self.core.config.cache_warming_enabled {
            warn!("cache warming requested but disabled in config");
            return 0;
        }
        let mut succeeded = 0;
        for entry in entries {
            let policy = self.core.policies.policy_for(entry.content_type);
            if self
                .core
                .write_through(&entry.key, &entry.payload, &policy)
                .await
            {
                succeeded += 1;
            }
        }
        info!("cache warming populated {} entries", succeeded);
        succeeded
    }

    /// Memoizing wrapper for an arbitrary computation. The cache key is
    /// derived deterministically from `key_prefix` plus the canonical JSON
    /// form of the call's arguments.
    pub fn cached(&self, content_type: ContentType, key_prefix: impl Into<String>) -> Memoized {
        Memoized {
            cache: self.clone(),
            content_type,
            prefix: key_prefix.into(),
        }
    }

    /// Point-in-time metrics snapshot for external monitoring.
    pub fn get_performance_metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Zero the metrics counters.
    pub fn reset_metrics(&self) {
        self.core.metrics.reset();
    }

    /// Hot tier occupancy, if L1 is enabled.
    pub fn l1_stats(&self) -> Option<HotTierStats> {
        self.core.hot.as_ref().map(|hot| hot.stats())
    }

    /// The immutable configuration this instance was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.core.config
    }

    /// Explicit lifecycle teardown: drops every hot-tier entry and any
    /// registered in-flight markers. Remote tiers are left untouched; they
    /// outlive the process by design.
    pub fn cleanup(&self) {
        if let Some(hot) = &self.core.hot {
            hot.clear();
        }
        self.core.flights.clear();
        info!("cache {} cleaned up", self.core.config.cache_id);
    }
}

impl std::fmt::Debug for MultiLayerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLayerCache")
            .field("cache_id", &self.core.config.cache_id)
            .finish()
    }
}

/// Memoizing handle returned by [`MultiLayerCache::cached`]. Two calls with
/// the same prefix and arguments hit the cache; different arguments compute
/// independently.
#[derive(Debug, Clone)]
pub struct Memoized {
    cache: MultiLayerCache,
    content_type: ContentType,
    prefix: String,
}

impl Memoized {
    /// The derived cache key for a set of arguments. Stable across calls and
    /// processes: prefix plus canonical JSON of the arguments.
    pub fn key_for<A: Serialize + ?Sized>(&self, args: &A) -> Result<String, CacheError> {
        let canonical =
            serde_json::to_string(args).map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(format!("{}:{}", self.prefix, canonical))
    }

    /// Run (or skip) the wrapped computation for these arguments.
    pub async fn call<A, T, F, Fut>(&self, args: &A, compute: F) -> Result<T, CacheError>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let key = self.key_for(args)?;
        self.cache
            .get_with_fallback(&key, self.content_type, compute)
            .await
    }
}

/// Fluent builder for [`MultiLayerCache`].
///
/// Remote clients are injected here; tiers left enabled without a client
/// fall back to the in-memory implementations, which is what tests and
/// single-process deployments want.
pub struct MultiLayerCacheBuilder {
    config: CacheConfig,
    kv_client: Option<Arc<dyn RemoteKvClient>>,
    object_client: Option<Arc<dyn ObjectStoreClient>>,
}

impl MultiLayerCacheBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            kv_client: None,
            object_client: None,
        }
    }

    /// Replace the whole config in one move.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.config.cache_id = id.into();
        self
    }

    pub fn l1_enabled(mut self, enabled: bool) -> Self {
        self.config.l1_enabled = enabled;
        self
    }

    pub fn l1_max_size_mb(mut self, megabytes: u64) -> Self {
        self.config.l1_max_size_mb = megabytes;
        self
    }

    pub fn l1_max_items(mut self, items: usize) -> Self {
        self.config.l1_max_items = items;
        self
    }

    pub fn l1_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.l1_ttl_seconds = seconds;
        self
    }

    pub fn l2_enabled(mut self, enabled: bool) -> Self {
        self.config.l2_enabled = enabled;
        self
    }

    pub fn l2_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.l2_endpoint = endpoint.into();
        self
    }

    pub fn l2_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.l2_ttl_seconds = seconds;
        self
    }

    pub fn l3_enabled(mut self, enabled: bool) -> Self {
        self.config.l3_enabled = enabled;
        self
    }

    pub fn l3_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.l3_ttl_seconds = seconds;
        self
    }

    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.config.compression_enabled = enabled;
        self
    }

    pub fn compression_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.compression_threshold_bytes = bytes;
        self
    }

    pub fn async_write_enabled(mut self, enabled: bool) -> Self {
        self.config.async_write_enabled = enabled;
        self
    }

    pub fn cache_warming_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_warming_enabled = enabled;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics_enabled = enabled;
        self
    }

    pub fn tier_timeout_ms(mut self, millis: u64) -> Self {
        self.config.tier_timeout_ms = millis;
        self
    }

    /// Inject the shared-tier backing client.
    pub fn kv_client(mut self, client: Arc<dyn RemoteKvClient>) -> Self {
        self.kv_client = Some(client);
        self
    }

    /// Inject the durable-tier backing client.
    pub fn object_store(mut self, client: Arc<dyn ObjectStoreClient>) -> Self {
        self.object_client = Some(client);
        self
    }

    /// Validate the configuration and assemble the tiers. Invalid config is
    /// fatal here, before any caller can observe a half-built cache.
    pub fn build(self) -> Result<MultiLayerCache, CacheError> {
        self.config.validate()?;
        let config = self.config;
        let timeout = std::time::Duration::from_millis(config.tier_timeout_ms);

        let hot = config.l1_enabled.then(|| {
            HotTier::new(
                config.l1_max_items,
                config.l1_max_size_bytes(),
                std::time::Duration::from_secs(config.l1_ttl_seconds),
            )
        });
        let shared = config.l2_enabled.then(|| {
            let client = self
                .kv_client
                .unwrap_or_else(|| Arc::new(InMemoryKvClient::new()));
            SharedTier::new(client, timeout)
        });
        let durable = config.l3_enabled.then(|| {
            let client = self
                .object_client
                .unwrap_or_else(|| Arc::new(InMemoryObjectStore::new()));
            DurableTier::new(
                client,
                timeout,
                config.compression_enabled,
                config.compression_threshold_bytes,
            )
        });

        info!(
            "cache {} initialized (l1={}, l2={}, l3={})",
            config.cache_id, config.l1_enabled, config.l2_enabled, config.l3_enabled
        );
        let policies = PolicyTable::from_config(&config);
        Ok(MultiLayerCache {
            core: Arc::new(CacheCore {
                policies,
                hot,
                shared,
                durable,
                metrics: Arc::new(CacheMetrics::new()),
                flights: FlightGroup::new(),
                config,
            }),
        })
    }
}

impl Default for MultiLayerCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
