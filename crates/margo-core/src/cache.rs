//! TTL cache for source lookups repeated across a batch run

use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Read-through cache used by extraction adapters to avoid fetching the
/// same record (products, mostly) over and over inside one run.
pub trait Cache<K, V> {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn invalidate(&self, key: &K);
}

/// In-memory cache with a per-entry time-to-live.
///
/// Entries past their TTL are treated as absent and dropped on the next
/// lookup. Interior mutability so a single cache can be shared by reference
/// across worker threads.
pub struct MemoryCache<K, V> {
    ttl: Duration,
    entries: Mutex<FxHashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> MemoryCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl<K: Eq + Hash, V: Clone> Cache<K, V> for MemoryCache<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: K, value: V) {
        self.entries
            .lock()
            .unwrap()
            .insert(key, (Instant::now(), value));
    }

    fn invalidate(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_invalidate() {
        let cache: MemoryCache<i64, String> = MemoryCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&1), None);

        cache.put(1, "widget".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("widget"));

        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn expired_entries_drop_on_lookup() {
        let cache: MemoryCache<i64, i64> = MemoryCache::new(Duration::ZERO);
        cache.put(1, 42);
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_refreshes_ttl_clock() {
        let cache: MemoryCache<&str, i64> = MemoryCache::new(Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}
