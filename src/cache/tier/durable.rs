//! L3 durable tier: object-store adapter with transparent compression
//!
//! Highest latency, largest capacity. Payloads at or above the configured
//! threshold are LZ4-compressed before storage and decompressed on read; the
//! orchestrator only ever sees raw payload bytes. A one-byte frame flag marks
//! whether the stored object is compressed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tokio::time::timeout;

use crate::cache::error::CacheError;

/// Frame flag values prefixed to every stored object.
const FRAME_RAW: u8 = 0;
const FRAME_LZ4: u8 = 1;

/// Client over a durable object store (get/set/delete).
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Durable-tier adapter: compression framing, timeout enforcement, and
/// degraded-mode logging around an injected client.
#[derive(Clone)]
pub struct DurableTier {
    client: Arc<dyn ObjectStoreClient>,
    call_timeout: Duration,
    compression_enabled: bool,
    compression_threshold: usize,
}

impl DurableTier {
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        call_timeout: Duration,
        compression_enabled: bool,
        compression_threshold: usize,
    ) -> Self {
        Self {
            client,
            call_timeout,
            compression_enabled,
            compression_threshold,
        }
    }

    /// Fetch and unframe a payload. A corrupt frame is a deserialization
    /// error for this operation only, not a tier outage.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let framed = match timeout(self.call_timeout, self.client.get(key)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("durable tier: get timed out for {}", key);
                return Err(CacheError::Timeout);
            }
        };
        match framed {
            Some(framed) => Self::unframe(key, framed).map(Some),
            None => Ok(None),
        }
    }

    /// Frame (compressing when `compress` is requested and the payload
    /// clears the threshold) and store a payload.
    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
        compress: bool,
    ) -> Result<(), CacheError> {
        let framed = self.frame(key, value, compress);
        match timeout(self.call_timeout, self.client.set(key, framed, ttl)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("durable tier: set timed out for {}", key);
                Err(CacheError::Timeout)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match timeout(self.call_timeout, self.client.delete(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("durable tier: delete timed out for {}", key);
                Err(CacheError::Timeout)
            }
        }
    }

    fn frame(&self, key: &str, value: Vec<u8>, compress: bool) -> Vec<u8> {
        let should_compress =
            compress && self.compression_enabled && value.len() >= self.compression_threshold;
        if should_compress {
            let compressed = compress_prepend_size(&value);
            debug!(
                "durable tier: compressed {} from {} to {} bytes",
                key,
                value.len(),
                compressed.len()
            );
            let mut framed = Vec::with_capacity(compressed.len() + 1);
            framed.push(FRAME_LZ4);
            framed.extend_from_slice(&compressed);
            framed
        } else {
            let mut framed = Vec::with_capacity(value.len() + 1);
            framed.push(FRAME_RAW);
            framed.extend_from_slice(&value);
            framed
        }
    }

    fn unframe(key: &str, framed: Vec<u8>) -> Result<Vec<u8>, CacheError> {
        match framed.split_first() {
            Some((&FRAME_RAW, payload)) => Ok(payload.to_vec()),
            Some((&FRAME_LZ4, compressed)) => {
                decompress_size_prepended(compressed).map_err(|e| {
                    CacheError::Deserialization(format!("lz4 decompress failed for {}: {}", key, e))
                })
            }
            _ => Err(CacheError::Deserialization(format!(
                "unknown frame flag for {}",
                key
            ))),
        }
    }
}

impl std::fmt::Debug for DurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTier")
            .field("call_timeout", &self.call_timeout)
            .field("compression_enabled", &self.compression_enabled)
            .field("compression_threshold", &self.compression_threshold)
            .finish()
    }
}

/// In-memory `ObjectStoreClient` for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, (Vec<u8>, Option<Instant>)>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Residency check that bypasses framing. Test hook.
    pub fn contains(&self, key: &str) -> bool {
        match self.objects.get(key) {
            Some(entry) => entry.1.is_none_or(|deadline| deadline > Instant::now()),
            None => false,
        }
    }

    /// Stored (framed) object size. Lets tests observe compression without
    /// reaching into the frame format.
    pub fn stored_len(&self, key: &str) -> Option<usize> {
        self.objects.get(key).map(|entry| entry.0.len())
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.objects.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Ok(Some(entry.0.clone())),
            },
            None => return Ok(None),
        };
        if expired {
            self.objects.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let deadline = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        self.objects.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.objects.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(store: Arc<InMemoryObjectStore>, threshold: usize) -> DurableTier {
        DurableTier::new(store, Duration::from_millis(200), true, threshold)
    }

    #[tokio::test]
    async fn small_payloads_are_stored_raw() {
        let store = Arc::new(InMemoryObjectStore::new());
        let durable = tier(store.clone(), 1024);
        durable
            .set("k", b"small".to_vec(), Duration::from_secs(60), true)
            .await
            .unwrap();
        // Flag byte plus the raw payload.
        assert_eq!(store.stored_len("k"), Some(6));
        assert_eq!(durable.get("k").await.unwrap(), Some(b"small".to_vec()));
    }

    #[tokio::test]
    async fn large_payloads_compress_and_read_back_identical() {
        let store = Arc::new(InMemoryObjectStore::new());
        let durable = tier(store.clone(), 64);
        // Highly compressible payload above the threshold.
        let payload = vec![b'a'; 4096];
        durable
            .set("big", payload.clone(), Duration::from_secs(60), true)
            .await
            .unwrap();
        assert!(store.stored_len("big").unwrap() < payload.len());
        assert_eq!(durable.get("big").await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn compress_hint_false_skips_compression() {
        let store = Arc::new(InMemoryObjectStore::new());
        let durable = tier(store.clone(), 64);
        let payload = vec![b'a'; 4096];
        durable
            .set("k", payload.clone(), Duration::from_secs(60), false)
            .await
            .unwrap();
        assert_eq!(store.stored_len("k"), Some(payload.len() + 1));
        assert_eq!(durable.get("k").await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn corrupt_frame_reports_deserialization_error() {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .set("bad", vec![9, 1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let durable = tier(store, 64);
        assert!(matches!(
            durable.get("bad").await,
            Err(CacheError::Deserialization(_))
        ));
    }
}
