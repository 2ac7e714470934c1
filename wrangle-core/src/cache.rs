// ABOUTME: String-keyed cache with per-cache TTL and lazy expiry
// ABOUTME: Backs the response correlator and the pending auth token store

use moka::sync::Cache;
use std::time::Duration;

/// Default lifetime for correlation ids and pending auth tokens.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A time-expiring key/value map.
///
/// Entries vanish once their TTL elapses; a missing entry means the
/// correlation is lost and callers must handle that gracefully, never as a
/// crash condition. All caches are process-local and intentionally lost on
/// restart.
#[derive(Clone)]
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value);
    }

    /// Look up a live entry. Expired entries read as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    /// Fetch the live entry for `key`, inserting the result of `init` if
    /// there is none. Concurrent callers for the same key get the same
    /// value; `init` runs at most once.
    pub fn get_or_insert_with(&self, key: impl Into<String>, init: impl FnOnce() -> V) -> V {
        self.inner.get_with(key.into(), init)
    }

    pub fn delete(&self, key: &str) {
        self.inner.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        cache.put("id-1", "chat-1".to_string());
        assert_eq!(cache.get("id-1"), Some("chat-1".to_string()));

        cache.delete("id-1");
        assert_eq!(cache.get("id-1"), None);
    }

    #[test]
    fn test_entries_expire() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_millis(30));
        cache.put("id-1", "chat-1".to_string());
        assert!(cache.get("id-1").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("id-1"), None);
    }

    #[test]
    fn test_get_or_insert_with_runs_once() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        let first = cache.get_or_insert_with("chat-1", || "token-a".to_string());
        let second = cache.get_or_insert_with("chat-1", || "token-b".to_string());
        assert_eq!(first, "token-a");
        assert_eq!(second, "token-a");
    }
}
