//! In-memory LRU cache for successful service responses.
//!
//! Entries expire lazily on read when an expiry is configured.

use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedResponse {
    body: Bytes,
    inserted_at: Instant,
}

/// Response bodies keyed by request signature.
pub struct ResponseCache {
    cache: RwLock<LruCache<String, CachedResponse>>,
    expiry: Option<Duration>,
}

impl ResponseCache {
    /// `capacity` of zero is raised to one entry.
    pub fn new(capacity: usize, expiry: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            expiry,
        }
    }

    /// Cached body for `key`, if present and not expired.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let mut cache = self.cache.write().await;

        let expired = match cache.get(key) {
            Some(entry) => self
                .expiry
                .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
            None => return None,
        };

        if expired {
            cache.pop(key);
            debug!(key = %key, "Cache entry expired");
            return None;
        }
        cache.get(key).map(|entry| entry.body.clone())
    }

    pub async fn put(&self, key: String, body: Bytes) {
        let mut cache = self.cache.write().await;
        cache.put(
            key,
            CachedResponse {
                body,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        self.cache.write().await.pop(key);
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let cache = ResponseCache::new(4, None);
        cache.put("a".to_string(), Bytes::from_static(b"body")).await;
        assert_eq!(cache.get("a").await, Some(Bytes::from_static(b"body")));
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = ResponseCache::new(2, None);
        cache.put("a".to_string(), Bytes::from_static(b"1")).await;
        cache.put("b".to_string(), Bytes::from_static(b"2")).await;
        // touch "a" so "b" is least recently used
        assert!(cache.get("a").await.is_some());
        cache.put("c".to_string(), Bytes::from_static(b"3")).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = ResponseCache::new(4, Some(Duration::from_millis(10)));
        cache.put("a".to_string(), Bytes::from_static(b"1")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.is_empty().await);
    }
}
