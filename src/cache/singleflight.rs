//! Per-key in-flight computation de-duplication
//!
//! Stampede protection for fallback computations: concurrent callers missing
//! on the same key serialize on one keyed async mutex, and every caller
//! re-probes the tiers after acquiring it. The winner computes once; the
//! waiters find the freshly stored value instead of recomputing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key flight locks.
///
/// The marker is removed when the flight settles, success or failure, so a
/// failed computation never blocks future attempts on the key.
#[derive(Debug, Default)]
pub struct FlightGroup {
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the flight lock for `key`, creating it if absent. The
    /// returned permit holds the lock until dropped.
    pub async fn acquire(&self, key: &str) -> FlightPermit<'_> {
        let lock = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.clone().lock_owned().await;
        FlightPermit {
            group: self,
            key: key.to_string(),
            lock,
            _guard: guard,
        }
    }

    /// Number of keys with a registered flight. Test and introspection hook.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Drop every registered marker. Called from lifecycle cleanup; any
    /// caller still holding a permit keeps its guard alive through the Arc.
    pub fn clear(&self) {
        self.inflight.clear();
    }

    /// Unregister a settled flight, but only if the registered lock is still
    /// the one this flight used; a later caller may already have re-keyed
    /// the slot with a fresh lock.
    fn settle(&self, key: &str, lock: &Arc<Mutex<()>>) {
        self.inflight
            .remove_if(key, |_, registered| Arc::ptr_eq(registered, lock));
    }
}

/// Exclusive right to compute for one key. Dropping it settles the flight
/// and unregisters the marker; waiters already holding the Arc proceed in
/// turn and re-probe before computing.
pub struct FlightPermit<'a> {
    group: &'a FlightGroup,
    key: String,
    lock: Arc<Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.group.settle(&self.key, &self.lock);
    }
}
