//! `offset -> Arc<[u8]>` bounded LRU page cache (spec.md §9 redesign note:
//! "Page holders / soft references ... replace with an explicit
//! `(offset -> Arc<Page>)` LRU cache"), grounded on the teacher's
//! `cache/core.rs::Cache` (`parking_lot`-guarded `lru::LruCache`, atomic
//! hit/miss counters).
//!
//! Entries are immutable once inserted (a page at a given offset is never
//! rewritten in place under COW), so a lookup needs no further
//! synchronization once the clone is in hand.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub insertions: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
}

/// A bounded LRU cache of raw page bytes, keyed by page offset.
pub struct PageCache {
    store: Mutex<LruCache<i64, Arc<[u8]>>>,
    metrics: CacheMetrics,
}

impl PageCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { store: Mutex::new(LruCache::new(cap)), metrics: CacheMetrics::default() }
    }

    #[must_use]
    pub fn get(&self, offset: i64) -> Option<Arc<[u8]>> {
        let mut guard = self.store.lock();
        let hit = guard.get(&offset).cloned();
        if hit.is_some() {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn insert(&self, offset: i64, bytes: Arc<[u8]>) {
        self.store.lock().put(offset, bytes);
        self.metrics.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops the cached entry for `offset`, if any. Called when a page is
    /// freed so a reused offset can't serve stale bytes from the cache.
    pub fn invalidate(&self, offset: i64) {
        self.store.lock().pop(&offset);
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            insertions: self.metrics.insertions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_hits() {
        let cache = PageCache::new(2);
        cache.insert(10, Arc::from(vec![1u8, 2, 3]));
        assert_eq!(cache.get(10).as_deref(), Some([1u8, 2, 3].as_slice()));
        let snap = cache.metrics_snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.insertions, 1);
    }

    #[test]
    fn miss_on_absent_key() {
        let cache = PageCache::new(2);
        assert!(cache.get(99).is_none());
        assert_eq!(cache.metrics_snapshot().misses, 1);
    }

    #[test]
    fn capacity_evicts_lru() {
        let cache = PageCache::new(1);
        cache.insert(1, Arc::from(vec![1u8]));
        cache.insert(2, Arc::from(vec![2u8]));
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = PageCache::new(2);
        cache.insert(5, Arc::from(vec![9u8]));
        cache.invalidate(5);
        assert!(cache.get(5).is_none());
    }
}
