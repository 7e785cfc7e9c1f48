//! TTL cache for provider responses
//!
//! Search and news APIs bill per request, so identical queries within a
//! short window are served from memory.

use cached::{Cached, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Thread-safe TTL cache keyed by provider id and query
pub struct ResponseCache {
    cache: Arc<RwLock<TimedCache<String, serde_json::Value>>>,
}

impl ResponseCache {
    /// Create a new cache with the given entry lifetime
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    fn key(provider: &str, query: &str) -> String {
        format!("{provider}:{query}")
    }

    /// Get a cached response, if still fresh
    pub async fn get(&self, provider: &str, query: &str) -> Option<serde_json::Value> {
        let mut cache = self.cache.write().await;
        cache.cache_get(&Self::key(provider, query)).cloned()
    }

    /// Store a response
    pub async fn insert(&self, provider: &str, query: &str, value: serde_json::Value) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(Self::key(provider, query), value);
    }

    /// Drop all cached entries
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    /// Number of cached entries
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Clone for ResponseCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        // 10 minutes matches how quickly market news queries go stale
        Self::new(Duration::from_secs(600))
    }
}
