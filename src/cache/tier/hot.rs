//! L1 hot tier: in-process, bounded, LRU + TTL
//!
//! The only mutable shared state in the engine that needs explicit locking.
//! A hash map holds the entries; recency is a stamped queue, so get/set/evict
//! stay O(1) amortized without an intrusive linked list. Expiry is checked
//! lazily on access and swept opportunistically on writes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

/// One resident entry. Byte accounting is deterministic: the key length plus
/// the serialized payload length.
#[derive(Debug)]
struct CacheEntry {
    payload: Arc<Vec<u8>>,
    size_bytes: u64,
    expires_at: Instant,
    last_accessed: Instant,
    /// Stamp of this entry's newest position in the recency queue. Queue
    /// items with older stamps are stale and skipped during eviction.
    stamp: u64,
}

#[derive(Debug, Default)]
struct HotState {
    entries: HashMap<String, CacheEntry>,
    /// Recency order, least-recent at the front. Re-accessing a key pushes a
    /// fresh stamped position instead of moving the old one.
    recency: VecDeque<(u64, String)>,
    next_stamp: u64,
    total_bytes: u64,
}

impl HotState {
    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn touch(&mut self, key: &str, now: Instant) {
        let stamp = self.stamp();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.stamp = stamp;
            entry.last_accessed = now;
        }
        self.recency.push_back((stamp, key.to_string()));
        // Reads outnumber writes in steady state; reclaim stale positions
        // here too, not just on the eviction path.
        self.compact();
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.total_bytes -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    /// Evict from the least-recent end until both bounds hold. Stale queue
    /// positions and already-expired entries are dropped along the way.
    fn evict_to_bounds(&mut self, max_items: usize, max_bytes: u64, now: Instant) {
        while self.entries.len() > max_items || self.total_bytes > max_bytes {
            match self.recency.pop_front() {
                Some((stamp, key)) => {
                    let current = match self.entries.get(&key) {
                        Some(entry) => entry.stamp,
                        None => continue,
                    };
                    if current != stamp {
                        continue;
                    }
                    self.remove(&key);
                }
                // Bounds violated with an empty queue cannot happen unless
                // accounting broke; bail instead of spinning.
                None => break,
            }
        }
        self.sweep_front(now);
        self.compact();
    }

    /// Drop expired or stale positions sitting at the front of the queue.
    fn sweep_front(&mut self, now: Instant) {
        while let Some((stamp, key)) = self.recency.front() {
            match self.entries.get(key) {
                Some(entry) if entry.stamp == *stamp => {
                    if entry.expires_at <= now {
                        let key = key.clone();
                        self.recency.pop_front();
                        self.remove(&key);
                    } else {
                        break;
                    }
                }
                _ => {
                    self.recency.pop_front();
                }
            }
        }
    }

    /// Rebuild the queue when stale positions dominate, keeping the
    /// amortized O(1) bound on queue growth.
    fn compact(&mut self) {
        if self.recency.len() <= self.entries.len() * 2 + 16 {
            return;
        }
        let entries = &self.entries;
        self.recency
            .retain(|(stamp, key)| entries.get(key).is_some_and(|entry| entry.stamp == *stamp));
    }
}

/// Snapshot of hot tier occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotTierStats {
    /// Resident entry count.
    pub size: usize,
    /// Resident bytes (keys + payloads).
    pub size_bytes: u64,
    /// Configured entry-count bound.
    pub max_items: usize,
}

/// In-process bounded LRU+TTL store over opaque payloads.
#[derive(Debug)]
pub struct HotTier {
    state: Mutex<HotState>,
    max_items: usize,
    max_bytes: u64,
    default_ttl: Duration,
}

impl HotTier {
    pub fn new(max_items: usize, max_bytes: u64, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(HotState::default()),
            max_items,
            max_bytes,
            default_ttl,
        }
    }

    /// Fetch a payload if present and unexpired, refreshing its recency.
    /// An expired entry is removed on the spot and reported as absent.
    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.entries.get(key) {
            Some(entry) if entry.expires_at <= now => {
                state.remove(key);
                None
            }
            Some(entry) => {
                let payload = Arc::clone(&entry.payload);
                state.touch(key, now);
                Some(payload)
            }
            None => None,
        }
    }

    /// Insert or overwrite, then evict least-recently-used entries until the
    /// byte and item bounds both hold. A payload that alone exceeds the byte
    /// bound is not admitted.
    pub fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) {
        let size_bytes = (key.len() + payload.len()) as u64;
        if size_bytes > self.max_bytes {
            debug!(
                "hot tier: rejecting oversized entry {} ({} bytes > {} max)",
                key, size_bytes, self.max_bytes
            );
            return;
        }
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let now = Instant::now();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(key);
        let stamp = state.stamp();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                payload: Arc::new(payload),
                size_bytes,
                expires_at: now + ttl,
                last_accessed: now,
                stamp,
            },
        );
        state.total_bytes += size_bytes;
        state.recency.push_back((stamp, key.to_string()));
        state.evict_to_bounds(self.max_items, self.max_bytes, now);
    }

    /// Remove a key; true if it was resident.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = HotState::default();
    }

    pub fn stats(&self) -> HotTierStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        HotTierStats {
            size: state.entries.len(),
            size_bytes: state.total_bytes,
            max_items: self.max_items,
        }
    }

    /// Age of the last access for a resident key. Introspection hook used by
    /// tests; returns None for absent keys.
    pub fn idle_time(&self, key: &str) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .get(key)
            .map(|entry| entry.last_accessed.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(max_items: usize) -> HotTier {
        HotTier::new(max_items, 1024 * 1024, Duration::from_secs(60))
    }

    #[test]
    fn lru_evicts_least_recently_used_first() {
        let tier = tier(2);
        tier.set("key1", b"v1".to_vec(), Duration::from_secs(60));
        tier.set("key2", b"v2".to_vec(), Duration::from_secs(60));
        tier.set("key3", b"v3".to_vec(), Duration::from_secs(60));

        assert!(tier.get("key1").is_none());
        assert!(tier.get("key2").is_some());
        assert!(tier.get("key3").is_some());
        assert_eq!(tier.stats().size, 2);
    }

    #[test]
    fn get_refreshes_recency_order() {
        let tier = tier(2);
        tier.set("a", b"1".to_vec(), Duration::from_secs(60));
        tier.set("b", b"2".to_vec(), Duration::from_secs(60));
        // Touch "a" so "b" becomes the LRU victim.
        assert!(tier.get("a").is_some());
        tier.set("c", b"3".to_vec(), Duration::from_secs(60));

        assert!(tier.get("a").is_some());
        assert!(tier.get("b").is_none());
        assert!(tier.get("c").is_some());
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let tier = tier(8);
        tier.set("soon", b"x".to_vec(), Duration::from_millis(20));
        assert!(tier.get("soon").is_some());
        std::thread::sleep(Duration::from_millis(40));
        assert!(tier.get("soon").is_none());
        assert_eq!(tier.stats().size, 0);
    }

    #[test]
    fn byte_bound_evicts_even_under_item_limit() {
        let tier = HotTier::new(100, 64, Duration::from_secs(60));
        tier.set("a", vec![0u8; 30], Duration::from_secs(60));
        tier.set("b", vec![0u8; 30], Duration::from_secs(60));
        // 31 + 31 bytes resident; a third 31-byte entry must push one out.
        tier.set("c", vec![0u8; 30], Duration::from_secs(60));

        let stats = tier.stats();
        assert!(stats.size_bytes <= 64);
        assert!(tier.get("a").is_none());
    }

    #[test]
    fn oversized_payload_is_not_admitted() {
        let tier = HotTier::new(10, 16, Duration::from_secs(60));
        tier.set("big", vec![0u8; 64], Duration::from_secs(60));
        assert!(tier.get("big").is_none());
        assert_eq!(tier.stats().size, 0);
    }

    #[test]
    fn overwrite_replaces_accounted_bytes() {
        let tier = tier(8);
        tier.set("k", vec![0u8; 100], Duration::from_secs(60));
        tier.set("k", vec![0u8; 10], Duration::from_secs(60));
        assert_eq!(tier.stats().size, 1);
        assert_eq!(tier.stats().size_bytes, 11);
    }

    #[test]
    fn delete_reports_residency() {
        let tier = tier(8);
        tier.set("k", b"v".to_vec(), Duration::from_secs(60));
        assert!(tier.delete("k"));
        assert!(!tier.delete("k"));
        assert!(tier.get("k").is_none());
    }

    #[test]
    fn repeated_gets_do_not_grow_the_queue_unboundedly() {
        let tier = tier(4);
        tier.set("k", b"v".to_vec(), Duration::from_secs(60));
        for _ in 0..10_000 {
            assert!(tier.get("k").is_some());
        }
        let state = tier.state.lock().unwrap();
        assert!(state.recency.len() <= state.entries.len() * 2 + 16 + 1);
    }
}
