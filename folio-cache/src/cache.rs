use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache as RawLru;

/// Hit/miss counters observed since construction, plus the current entry
/// count (expired entries linger until touched or swept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl<V> Entry<V> {
    fn expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(self.inserted_at) >= ttl)
    }
}

struct TtlInner<K: Hash + Eq, V> {
    map: RawLru<K, Entry<V>>,
    hits: u64,
    misses: u64,
}

/// Capacity- and age-bounded cache.
///
/// Capacity is enforced by the underlying LRU container: inserting into a
/// full cache evicts the least recently used entry, and `get` refreshes
/// recency. Age is enforced lazily: an expired entry is treated as absent
/// and removed when touched, or swept in bulk by [`cleanup_expired`].
///
/// A coarse mutex guards each cache instance; values are cloned out.
///
/// [`cleanup_expired`]: TtlCache::cleanup_expired
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<TtlInner<K, V>>,
    default_ttl: Option<Duration>,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// `default_ttl: None` means entries only age out by LRU pressure.
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(TtlInner {
                map: RawLru::new(capacity),
                hits: 0,
                misses: 0,
            }),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TtlInner<K, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.map.get(key) {
            Some(entry) if !entry.expired(now) => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.map.pop(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with a per-entry TTL overriding the cache default.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        self.lock().map.put(key, entry);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().map.pop(key).map(|entry| entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.lock()
            .map
            .peek(key)
            .is_some_and(|entry| !entry.expired(now))
    }

    /// Sweep every expired entry out, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<K> = inner
            .map
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.map.pop(key);
        }
        expired.len()
    }

    /// Unexpired entries, most recently used first. Used for snapshots.
    pub fn entries(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        self.lock()
            .map
            .iter()
            .filter(|(_, entry)| !entry.expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.map.len(),
        }
    }
}

/// Strict capacity-bounded cache without expiry; eviction order is least
/// recently used, and `get` counts as a use.
pub struct LruCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<RawLru<K, V>>,
}

impl<K: Hash + Eq, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(RawLru::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RawLru<K, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().pop(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache: LruCache<String, u32> = LruCache::new(3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.insert(key.to_string(), i as u32);
        }

        // Four inserts into capacity three: the oldest untouched key is gone.
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(2));
        assert_eq!(cache.get(&"d".to_string()), Some(3));
    }

    #[test]
    fn test_lru_get_refreshes_recency() {
        let cache: LruCache<&str, u32> = LruCache::new(3);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        cache.get(&"a");
        cache.insert("d", 4);

        // "b" was the least recently used once "a" was touched.
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert!(cache.contains(&"d"));
    }

    #[test]
    fn test_ttl_expiry_is_lazy() {
        let cache: TtlCache<&str, u32> = TtlCache::new(10, Some(Duration::from_millis(5)));
        cache.insert("k", 42);
        assert_eq!(cache.get(&"k"), Some(42));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"k"), None);
        // The expired entry was removed on touch.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cleanup_expired_sweeps() {
        let cache: TtlCache<u32, u32> = TtlCache::new(10, Some(Duration::from_millis(5)));
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert_with_ttl(3, 30, None);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&3), Some(30));
    }

    #[test]
    fn test_no_default_ttl_never_expires() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, None);
        cache.insert("k", 7);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"k"), Some(7));
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_ttl_cache_also_bounds_capacity() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, None);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache: TtlCache<&str, u32> = TtlCache::new(4, None);
        cache.insert("present", 1);
        cache.get(&"present");
        cache.get(&"present");
        cache.get(&"absent");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn test_entries_skip_expired() {
        let cache: TtlCache<u32, u32> = TtlCache::new(8, None);
        cache.insert_with_ttl(1, 10, Some(Duration::from_millis(5)));
        cache.insert(2, 20);
        std::thread::sleep(Duration::from_millis(20));

        let entries = cache.entries();
        assert_eq!(entries, vec![(2, 20)]);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let cache: LruCache<u32, u32> = LruCache::new(0);
        cache.insert(1, 1);
        assert_eq!(cache.len(), 1);
    }
}
