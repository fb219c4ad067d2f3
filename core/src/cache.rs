//! Cache backend boundary and an in-process reference implementation.
//!
//! The pipeline treats the cache as strictly best-effort: implementations
//! may fail at any time and callers convert failures into misses or no-ops.
//! Backends must tolerate concurrent reads and writes to the same key;
//! last-write-wins is acceptable because entries are immutable snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use wildmatch::WildMatch;

use crate::error::CacheError;

/// Result alias for cache backend operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Byte-oriented key-value store with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the value stored under `key`, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete every key matching the `*`-wildcard `pattern`; returns the
    /// number of deleted entries.
    async fn scan_delete(&self, pattern: &str) -> CacheResult<u64>;
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`CacheBackend`] backed by a `HashMap`.
///
/// Suitable for tests and single-process deployments; networked
/// deployments implement the trait over their own transport.
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryCacheBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|v| v.expires_at > now)
            .count()
    }

    /// Whether the backend holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|v| v.expires_at > now)
            .map(|v| v.bytes.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.write().await;

        // Opportunistically drop expired entries so the map does not grow
        // without bound under churn.
        let now = Instant::now();
        entries.retain(|_, v| v.expires_at > now);

        entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn scan_delete(&self, pattern: &str) -> CacheResult<u64> {
        let matcher = WildMatch::new(pattern);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !matcher.matches(k));
        let deleted = (before - entries.len()) as u64;
        debug!(pattern, deleted, "cache scan-delete");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let backend = InMemoryCacheBackend::new();
        backend.set("k1", b"payload".to_vec(), TTL).await.unwrap();

        let value = backend.get("k1").await.unwrap();
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_get_miss() {
        let backend = InMemoryCacheBackend::new();
        assert_eq!(backend.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let backend = InMemoryCacheBackend::new();
        backend
            .set("k1", b"payload".to_vec(), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(backend.get("k1").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let backend = InMemoryCacheBackend::new();
        backend.set("k1", b"old".to_vec(), TTL).await.unwrap();
        backend.set("k1", b"new".to_vec(), TTL).await.unwrap();

        assert_eq!(backend.get("k1").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_scan_delete_wildcard() {
        let backend = InMemoryCacheBackend::new();
        backend.set("retrieval:a", b"1".to_vec(), TTL).await.unwrap();
        backend.set("retrieval:b", b"2".to_vec(), TTL).await.unwrap();
        backend.set("other:c", b"3".to_vec(), TTL).await.unwrap();

        let deleted = backend.scan_delete("retrieval:*").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(backend.len().await, 1);
        assert!(backend.get("other:c").await.unwrap().is_some());
    }
}
