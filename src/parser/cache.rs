use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// 上限付きLRUキャッシュ
///
/// `set` は同じキーの既存エントリを常に置き換える。容量0の場合はキャッシュしない。
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: Option<Mutex<LruCache<K, V>>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let inner = self.inner.as_ref()?;
        let mut cache = inner.lock().ok()?;
        cache.get(key).cloned()
    }

    pub fn set(&self, key: K, value: V) {
        if let Some(inner) = &self.inner {
            if let Ok(mut cache) = inner.lock() {
                cache.put(key, value);
            }
        }
    }

    pub fn delete(&self, key: &K) -> Option<V> {
        let inner = self.inner.as_ref()?;
        let mut cache = inner.lock().ok()?;
        cache.pop(key)
    }

    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            if let Ok(mut cache) = inner.lock() {
                cache.clear();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|cache| cache.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|cache| cache.cap().get()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = BoundedCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.set("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_set_replaces_entry() {
        let cache = BoundedCache::new(4);
        cache.set("a", 1);
        cache.set("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = BoundedCache::new(0);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = BoundedCache::new(4);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.delete(&"a"), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
