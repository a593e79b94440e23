//! Cache telemetry
//!
//! Monotone hit/miss/error counters and a latency accumulator, padded to
//! avoid false sharing between hot counters. A `MetricsSnapshot` is the
//! serializable view handed to monitoring systems.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};

use crate::cache::policy::TierLocation;

/// Lock-free counters for the orchestrator's lifetime.
///
/// All counters are monotone; `reset` is the only thing that zeroes them.
/// When metrics are disabled at config time the orchestrator simply never
/// calls the recording methods.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    total_requests: CachePadded<AtomicU64>,
    l1_hits: CachePadded<AtomicU64>,
    l1_misses: CachePadded<AtomicU64>,
    l2_hits: CachePadded<AtomicU64>,
    l2_misses: CachePadded<AtomicU64>,
    l3_hits: CachePadded<AtomicU64>,
    l3_misses: CachePadded<AtomicU64>,
    errors: CachePadded<AtomicU64>,
    total_latency_ns: CachePadded<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self, tier: TierLocation) {
        let counter = match tier {
            TierLocation::L1 => &self.l1_hits,
            TierLocation::L2 => &self.l2_hits,
            TierLocation::L3 => &self.l3_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tier: TierLocation) {
        let counter = match tier {
            TierLocation::L1 => &self.l1_misses,
            TierLocation::L2 => &self.l2_misses,
            TierLocation::L3 => &self.l3_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.total_latency_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Zero every counter. Used by explicit lifecycle resets; normal
    /// operation never calls this.
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.l1_hits,
            &self.l1_misses,
            &self.l2_hits,
            &self.l2_misses,
            &self.l3_hits,
            &self.l3_misses,
            &self.errors,
            &self.total_latency_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Point-in-time view. Individual loads are relaxed; derived rates are
    /// computed from the loaded values, not re-read.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l1_misses = self.l1_misses.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let l2_misses = self.l2_misses.load(Ordering::Relaxed);
        let l3_hits = self.l3_hits.load(Ordering::Relaxed);
        let l3_misses = self.l3_misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total_latency_ns = self.total_latency_ns.load(Ordering::Relaxed);

        let total_hits = l1_hits + l2_hits + l3_hits;
        let rate = |hits: u64, misses: u64| {
            let attempts = hits + misses;
            if attempts > 0 {
                hits as f64 / attempts as f64
            } else {
                0.0
            }
        };

        MetricsSnapshot {
            total_requests,
            l1_hits,
            l1_misses,
            l2_hits,
            l2_misses,
            l3_hits,
            l3_misses,
            errors,
            hit_rate_by_layer: HitRateByLayer {
                l1: rate(l1_hits, l1_misses),
                l2: rate(l2_hits, l2_misses),
                l3: rate(l3_hits, l3_misses),
            },
            cache_efficiency: if total_requests > 0 {
                total_hits as f64 / total_requests as f64
            } else {
                0.0
            },
            average_latency_ms: if total_requests > 0 {
                (total_latency_ns as f64 / total_requests as f64) / 1_000_000.0
            } else {
                0.0
            },
        }
    }
}

/// Per-tier hit rates (0.0 to 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitRateByLayer {
    pub l1: f64,
    pub l2: f64,
    pub l3: f64,
}

/// Serializable point-in-time metrics view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l3_hits: u64,
    pub l3_misses: u64,
    pub errors: u64,
    pub hit_rate_by_layer: HitRateByLayer,
    /// Total hits across all tiers divided by total requests.
    pub cache_efficiency: f64,
    pub average_latency_ms: f64,
}

impl MetricsSnapshot {
    pub fn total_hits(&self) -> u64 {
        self.l1_hits + self.l2_hits + self.l3_hits
    }

    pub fn total_misses(&self) -> u64 {
        self.l1_misses + self.l2_misses + self.l3_misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_stays_in_unit_interval() {
        let metrics = CacheMetrics::new();
        for _ in 0..4 {
            metrics.record_request();
        }
        metrics.record_hit(TierLocation::L1);
        metrics.record_miss(TierLocation::L1);
        metrics.record_hit(TierLocation::L2);
        metrics.record_miss(TierLocation::L3);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert!(snap.cache_efficiency >= 0.0 && snap.cache_efficiency <= 1.0);
        assert_eq!(snap.cache_efficiency, 0.5);
        assert_eq!(snap.hit_rate_by_layer.l1, 0.5);
    }

    #[test]
    fn empty_metrics_report_zero_rates() {
        let snap = CacheMetrics::new().snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.cache_efficiency, 0.0);
        assert_eq!(snap.average_latency_ms, 0.0);
    }

    #[test]
    fn reset_zeroes_counters() {
        let metrics = CacheMetrics::new();
        metrics.record_request();
        metrics.record_hit(TierLocation::L2);
        metrics.record_latency(Duration::from_millis(5));
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.l2_hits, 0);
        assert_eq!(snap.average_latency_ms, 0.0);
    }

    #[test]
    fn snapshot_serializes_for_monitoring() {
        let metrics = CacheMetrics::new();
        metrics.record_request();
        metrics.record_hit(TierLocation::L1);
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"cache_efficiency\""));
        assert!(json.contains("\"hit_rate_by_layer\""));
    }
}
