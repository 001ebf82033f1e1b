//! Three independently capacity-bounded LRU caches keyed by player-file path:
//! preprocessed script, solver pair, and signature-timestamp string. Each
//! mutation republishes its current size to the `cache_size{cache_name}`
//! gauge, matching the size-gauge convention the player file cache also
//! follows.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::solvers::Solvers;

/// Wraps an `LruCache` behind a mutex with a fixed name used as the
/// `cache_name` metrics label. `V` must be cheap to clone: callers get an
/// owned copy back rather than a reference tied to the lock guard.
pub struct NamedLruCache<V: Clone> {
    name: &'static str,
    inner: Mutex<LruCache<String, V>>,
}

impl<V: Clone> NamedLruCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            name,
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner
            .lock()
            .expect("lru cache mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: String, value: V) {
        let len = {
            let mut guard = self.inner.lock().expect("lru cache mutex poisoned");
            guard.put(key, value);
            guard.len()
        };
        crate::metrics::cache_size(self.name, len);
    }

    pub fn delete(&self, key: &str) {
        let len = {
            let mut guard = self.inner.lock().expect("lru cache mutex poisoned");
            guard.pop(key);
            guard.len()
        };
        crate::metrics::cache_size(self.name, len);
    }

    pub fn clear(&self) {
        {
            let mut guard = self.inner.lock().expect("lru cache mutex poisoned");
            guard.clear();
        }
        crate::metrics::cache_size(self.name, 0);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three caches the solver orchestrator reads and writes, grouped so a
/// composition root constructs them once from `AppConfig`'s sizes.
pub struct LruCaches {
    pub preprocessed: NamedLruCache<String>,
    pub solvers: NamedLruCache<Solvers>,
    pub sts: NamedLruCache<String>,
}

impl LruCaches {
    pub fn new(preprocessed_size: usize, solver_size: usize, sts_size: usize) -> Self {
        Self {
            preprocessed: NamedLruCache::new("preprocessed", preprocessed_size),
            solvers: NamedLruCache::new("solvers", solver_size),
            sts: NamedLruCache::new("sts", sts_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_on_miss() {
        let cache: NamedLruCache<String> = NamedLruCache::new("preprocessed", 4);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache: NamedLruCache<String> = NamedLruCache::new("preprocessed", 4);
        cache.set("key".to_string(), "value".to_string());
        assert_eq!(cache.get("key"), Some("value".to_string()));
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache: NamedLruCache<String> = NamedLruCache::new("preprocessed", 1);
        cache.set("a".to_string(), "A".to_string());
        cache.set("b".to_string(), "B".to_string());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("B".to_string()));
    }

    #[test]
    fn delete_removes_entry_and_shrinks_len() {
        let cache: NamedLruCache<String> = NamedLruCache::new("sts", 4);
        cache.set("k".to_string(), "v".to_string());
        assert_eq!(cache.len(), 1);
        cache.delete("k");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn clear_empties_cache() {
        let cache: NamedLruCache<String> = NamedLruCache::new("sts", 4);
        cache.set("a".to_string(), "1".to_string());
        cache.set("b".to_string(), "2".to_string());
        cache.clear();
        assert!(cache.is_empty());
    }
}
