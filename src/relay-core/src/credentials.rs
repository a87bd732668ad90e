//! Time-limited credential cache.
//!
//! Entries carry an absolute expiry. Expired entries are purged lazily when
//! read; there is no background sweep.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe map from key to a value with an absolute expiry.
pub struct ExpiringCredentialCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> ExpiringCredentialCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value if present and not yet expired.
    ///
    /// An expired entry is treated as a miss and evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent `set` may have
        // replaced the stale entry in between.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key)
            && !entry.is_live(now)
        {
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .insert(key, Entry { value, expires_at });
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for ExpiringCredentialCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ExpiringCredentialCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCredentialCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_after_ttl() {
        let cache = ExpiringCredentialCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(5));

        assert_eq!(cache.get(&"k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get(&"k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = ExpiringCredentialCache::new();
        cache.set("k", 1u32, Duration::from_millis(10));
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_millis(20)).await;
        // Still stored until someone reads it.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_recomputes_expiry() {
        let cache = ExpiringCredentialCache::new();
        cache.set("k", "old", Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(900)).await;

        cache.set("k", "new", Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(500)).await;

        assert_eq!(cache.get(&"k"), Some("new"));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let cache = ExpiringCredentialCache::new();
        cache.set("k", "v", Duration::ZERO);
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn test_delete() {
        let cache = ExpiringCredentialCache::new();
        cache.set("k", "v", Duration::from_secs(60));

        assert!(cache.delete(&"k"));
        assert!(!cache.delete(&"k"));
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test]
    async fn test_concurrent_readers() {
        let cache = Arc::new(ExpiringCredentialCache::new());
        cache.set("token".to_string(), "abc".to_string(), Duration::from_secs(60));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get(&"token".to_string())
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some("abc".to_string()));
        }
    }
}
