//! L2 shared tier: remote key-value adapter
//!
//! The shared tier is reachable by every process and survives restarts. The
//! backing store is injected through the `RemoteKvClient` trait so the engine
//! never couples to a concrete wire protocol. Every call is bounded by the
//! configured tier timeout; a failed or timed-out call degrades to a miss on
//! reads and a logged no-op on writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use log::warn;
use tokio::time::timeout;

use crate::cache::error::CacheError;

/// Client over a remote key-value store (get/set/delete with TTL).
///
/// Implementations are expected to be internally thread-safe connection
/// pools; the adapter never serializes calls.
#[async_trait]
pub trait RemoteKvClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Shared-tier adapter: timeout enforcement and degraded-mode logging around
/// an injected client.
#[derive(Clone)]
pub struct SharedTier {
    client: Arc<dyn RemoteKvClient>,
    call_timeout: Duration,
}

impl SharedTier {
    pub fn new(client: Arc<dyn RemoteKvClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Fetch a payload. Timeouts and client failures surface as
    /// `Err(CacheError)` for the orchestrator to count and treat as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match timeout(self.call_timeout, self.client.get(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("shared tier: get timed out for {}", key);
                Err(CacheError::Timeout)
            }
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match timeout(self.call_timeout, self.client.set(key, value, ttl)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("shared tier: set timed out for {}", key);
                Err(CacheError::Timeout)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match timeout(self.call_timeout, self.client.delete(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("shared tier: delete timed out for {}", key);
                Err(CacheError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for SharedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTier")
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// In-memory `RemoteKvClient` for tests and single-process deployments.
/// TTLs are honored lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryKvClient {
    entries: DashMap<String, (Vec<u8>, Option<Instant>)>,
}

impl InMemoryKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Residency check that does not consume a get. Test hook.
    pub fn contains(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) => entry.1.is_none_or(|deadline| deadline > Instant::now()),
            None => false,
        }
    }
}

#[async_trait]
impl RemoteKvClient for InMemoryKvClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Ok(Some(entry.0.clone())),
            },
            None => return Ok(None),
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let deadline = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Client wrapper that fails every call. Test double for outage behavior.
#[derive(Debug, Default)]
pub struct FailingKvClient;

#[async_trait]
impl RemoteKvClient for FailingKvClient {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::TierUnavailable("kv backend down".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::TierUnavailable("kv backend down".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::TierUnavailable("kv backend down".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(client: Arc<dyn RemoteKvClient>) -> SharedTier {
        SharedTier::new(client, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn round_trips_payloads() {
        let tier = tier(Arc::new(InMemoryKvClient::new()));
        tier.set("k", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(tier.get("k").await.unwrap(), Some(b"payload".to_vec()));
        assert!(tier.delete("k").await.unwrap());
        assert_eq!(tier.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_expiry_reads_as_absent() {
        let tier = tier(Arc::new(InMemoryKvClient::new()));
        tier.set("k", b"v".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(tier.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_tier_error() {
        let tier = tier(Arc::new(FailingKvClient));
        let err = tier.get("k").await.unwrap_err();
        assert!(err.is_tier_error());
    }

    #[tokio::test]
    async fn stalled_client_times_out() {
        struct StalledClient;

        #[async_trait]
        impl RemoteKvClient for StalledClient {
            async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            }
            async fn set(
                &self,
                _key: &str,
                _value: Vec<u8>,
                _ttl: Duration,
            ) -> Result<(), CacheError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(false)
            }
        }

        let tier = SharedTier::new(Arc::new(StalledClient), Duration::from_millis(10));
        assert_eq!(tier.get("k").await.unwrap_err(), CacheError::Timeout);
    }
}
