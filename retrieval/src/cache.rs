//! Content-addressed cache of hybrid search results.
//!
//! Entries are keyed by a fingerprint of the query embedding: every
//! component is rounded to four decimal places, joined, and hashed with
//! SHA-256. The rounding absorbs floating-point jitter between two
//! embedding calls for effectively-identical text while staying sensitive
//! to real semantic differences.
//!
//! The cache is strictly a performance layer, never a correctness
//! dependency: any backend failure, timeout, or malformed payload turns a
//! lookup into a miss and a store into a no-op. Nothing here ever raises
//! to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use recall_core::{CacheBackend, Candidate};

/// Key namespace for retrieval entries, so invalidation patterns cannot
/// touch other tenants of a shared backend.
const KEY_PREFIX: &str = "retrieval:";

/// Decimal places kept when rounding embedding components.
const FINGERPRINT_DECIMALS: i32 = 4;

/// A cached hybrid search result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the embedding that keyed this entry.
    pub fingerprint: String,

    /// The cached candidates (pre-rerank hybrid output).
    pub candidates: Vec<Candidate>,

    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
}

/// Hit/miss counters for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that returned an entry.
    pub hits: u64,

    /// Lookups that found nothing (including swallowed failures).
    pub misses: u64,

    /// Successful stores.
    pub stores: u64,
}

/// Best-effort retrieval result cache over an injected backend.
pub struct RetrievalCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    call_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl RetrievalCache {
    /// Create a cache with the given entry time-to-live.
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            backend,
            ttl,
            call_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    /// Look up the result set cached for `embedding`, or `None` on miss.
    /// Backend failures and undecodable payloads are misses.
    pub async fn lookup(&self, embedding: &[f32]) -> Option<CacheEntry> {
        let key = entry_key(embedding);

        let bytes = match tokio::time::timeout(self.call_timeout, self.backend.get(&key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Ok(Err(err)) => {
                debug!(error = %err, "cache lookup failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(_) => {
                debug!("cache lookup timed out, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(candidates = entry.candidates.len(), "cache hit");
                Some(entry)
            }
            Err(err) => {
                debug!(error = %err, "cache payload undecodable, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `candidates` under the fingerprint of `embedding`. Failures
    /// are silent no-ops.
    pub async fn store(&self, embedding: &[f32], candidates: &[Candidate]) {
        let fingerprint = fingerprint(embedding);
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            candidates: candidates.to_vec(),
            cached_at: Utc::now(),
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "cache entry unserializable, skipping store");
                return;
            }
        };

        let key = format!("{KEY_PREFIX}{fingerprint}");
        match tokio::time::timeout(self.call_timeout, self.backend.set(&key, bytes, self.ttl))
            .await
        {
            Ok(Ok(())) => {
                self.stores.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => debug!(error = %err, "cache store failed, skipping"),
            Err(_) => debug!("cache store timed out, skipping"),
        }
    }

    /// Delete entries whose fingerprint matches the `*`-wildcard
    /// `pattern`; returns how many were removed (0 on backend failure).
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let scoped = format!("{KEY_PREFIX}{pattern}");
        match tokio::time::timeout(self.call_timeout, self.backend.scan_delete(&scoped)).await {
            Ok(Ok(count)) => count,
            Ok(Err(err)) => {
                debug!(error = %err, "cache invalidation failed");
                0
            }
            Err(_) => {
                debug!("cache invalidation timed out");
                0
            }
        }
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }
}

/// Derive the cache key for an embedding.
fn entry_key(embedding: &[f32]) -> String {
    format!("{KEY_PREFIX}{}", fingerprint(embedding))
}

/// Fingerprint an embedding: round each component to four decimals, join,
/// and hash. Rounding happens before formatting so that values straddling
/// zero normalize away the sign of negative zero.
pub fn fingerprint(embedding: &[f32]) -> String {
    let scale = 10f64.powi(FINGERPRINT_DECIMALS);
    let joined: String = embedding
        .iter()
        .map(|&v| {
            let rounded = (f64::from(v) * scale).round() / scale + 0.0;
            format!("{rounded:.4}")
        })
        .collect::<Vec<_>>()
        .join(",");

    let digest = Sha256::digest(joined.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use recall_core::cache::CacheResult;
    use recall_core::{CacheError, InMemoryCacheBackend, MemoryKind, MemoryRecord};

    const TIMEOUT: Duration = Duration::from_secs(1);
    const TTL: Duration = Duration::from_secs(60);

    fn candidate(id: &str) -> Candidate {
        Candidate::from_vector_hit(MemoryRecord::new(id, MemoryKind::Semantic, "content"), 0.9)
    }

    fn cache() -> RetrievalCache {
        RetrievalCache::new(Arc::new(InMemoryCacheBackend::new()), TTL, TIMEOUT)
    }

    #[tokio::test]
    async fn test_store_then_lookup_roundtrip() {
        let cache = cache();
        let embedding = vec![0.1, -0.5, 0.33];
        let candidates = vec![candidate("m1"), candidate("m2")];

        cache.store(&embedding, &candidates).await;
        let entry = cache.lookup(&embedding).await.expect("expected a hit");

        assert_eq!(entry.candidates.len(), 2);
        assert_eq!(entry.candidates[0].record.id, "m1");
        assert_eq!(entry.fingerprint, fingerprint(&embedding));
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let cache = cache();
        assert!(cache.lookup(&[0.7, 0.7]).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_fingerprint_tolerates_sub_precision_jitter() {
        // Differences beyond the 4th decimal place collapse to one key.
        let a = fingerprint(&[0.123_44, -0.987_63]);
        let b = fingerprint(&[0.123_41, -0.987_59]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_detects_real_differences() {
        let a = fingerprint(&[0.1234, 0.5]);
        let b = fingerprint(&[0.1244, 0.5]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_normalizes_negative_zero() {
        assert_eq!(fingerprint(&[-0.000_01]), fingerprint(&[0.000_01]));
    }

    /// Backend that fails every operation.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
        async fn scan_delete(&self, _pattern: &str) -> CacheResult<u64> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_never_raises() {
        let cache = RetrievalCache::new(Arc::new(BrokenBackend), TTL, TIMEOUT);
        let embedding = vec![0.2, 0.4];

        cache.store(&embedding, &[candidate("m1")]).await;
        assert!(cache.lookup(&embedding).await.is_none());
        assert_eq!(cache.invalidate("*").await, 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_miss() {
        let backend = Arc::new(InMemoryCacheBackend::new());
        let embedding = vec![0.3];
        backend
            .set(&entry_key(&embedding), b"not json".to_vec(), TTL)
            .await
            .unwrap();

        let cache = RetrievalCache::new(backend, TTL, TIMEOUT);
        assert!(cache.lookup(&embedding).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_counts_entries() {
        let cache = cache();
        cache.store(&[0.1], &[candidate("m1")]).await;
        cache.store(&[0.2], &[candidate("m2")]).await;

        assert_eq!(cache.invalidate("*").await, 2);
        assert!(cache.lookup(&[0.1]).await.is_none());
    }
}
