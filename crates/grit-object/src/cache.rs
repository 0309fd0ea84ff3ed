//! Per-kind bounded LRU caches for parsed objects.
//!
//! Payloads are held behind `Arc`, so eviction only drops the cache's
//! reference; readers that obtained a value keep it alive. `insert` reports
//! hints rather than errors — an id that is already cached or a value over
//! the per-kind weight cap is simply not (re)inserted.

use std::num::NonZeroUsize;
use std::sync::Arc;

use grit_hash::ObjectId;
use lru::LruCache;

use crate::{Commit, ObjectInfo, RawObject, Tag, Tree};

/// Capacity of the object-info cache.
pub const CACHE_CAP_OBJECT: usize = 256;
/// Capacity of the tree cache.
pub const CACHE_CAP_TREE: usize = 256;
/// Capacity of the commit cache.
pub const CACHE_CAP_COMMIT: usize = 64;
/// Capacity of the tag cache.
pub const CACHE_CAP_TAG: usize = 256;
/// Capacity of the raw-object cache.
pub const CACHE_CAP_RAW: usize = 32;
/// Raw objects above this inflated size are not cached.
pub const CACHE_MAX_RAW_BYTES: u64 = 1024 * 1024;

/// Outcome of a cache insert. `Exists` and `TooLarge` are hints, not
/// failures; callers treat them as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHint {
    Added,
    Exists,
    TooLarge,
}

/// A bounded LRU cache keyed by object id.
pub struct ObjectCache<T> {
    cache: LruCache<ObjectId, Arc<T>>,
    /// Entries with a weight above this are rejected with `TooLarge`.
    max_weight: Option<u64>,
    hits: u64,
    misses: u64,
}

impl<T> ObjectCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            ),
            max_weight: None,
            hits: 0,
            misses: 0,
        }
    }

    pub fn with_max_weight(capacity: usize, max_weight: u64) -> Self {
        let mut cache = Self::new(capacity);
        cache.max_weight = Some(max_weight);
        cache
    }

    /// Insert a value, evicting the least-recently-used entry if full.
    pub fn insert(&mut self, id: ObjectId, value: Arc<T>) -> CacheHint {
        self.insert_weighted(id, value, 0)
    }

    /// Insert a value with an explicit weight (inflated byte size).
    pub fn insert_weighted(&mut self, id: ObjectId, value: Arc<T>, weight: u64) -> CacheHint {
        if self.cache.contains(&id) {
            return CacheHint::Exists;
        }
        if let Some(max) = self.max_weight {
            if weight > max {
                return CacheHint::TooLarge;
            }
        }
        self.cache.push(id, value);
        CacheHint::Added
    }

    /// Look up a value, promoting it to most-recently-used.
    pub fn get(&mut self, id: &ObjectId) -> Option<Arc<T>> {
        match self.cache.get(id) {
            Some(v) => {
                self.hits += 1;
                Some(Arc::clone(v))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.cache.contains(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// (hits, misses) counters.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// The repository's five object caches, one per kind.
pub struct ObjectCaches {
    pub objects: ObjectCache<ObjectInfo>,
    pub trees: ObjectCache<Tree>,
    pub commits: ObjectCache<Commit>,
    pub tags: ObjectCache<Tag>,
    pub raw: ObjectCache<RawObject>,
}

impl ObjectCaches {
    pub fn new() -> Self {
        Self {
            objects: ObjectCache::new(CACHE_CAP_OBJECT),
            trees: ObjectCache::new(CACHE_CAP_TREE),
            commits: ObjectCache::new(CACHE_CAP_COMMIT),
            tags: ObjectCache::new(CACHE_CAP_TAG),
            raw: ObjectCache::with_max_weight(CACHE_CAP_RAW, CACHE_MAX_RAW_BYTES),
        }
    }
}

impl Default for ObjectCaches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_id(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn insert_and_get() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(10);
        let id = make_id(1);
        assert_eq!(cache.insert(id, Arc::new(7)), CacheHint::Added);
        assert_eq!(*cache.get(&id).unwrap(), 7);
        assert_eq!(cache.stats(), (1, 0));
    }

    #[test]
    fn duplicate_insert_is_a_hint() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(10);
        let id = make_id(1);
        cache.insert(id, Arc::new(1));
        assert_eq!(cache.insert(id, Arc::new(2)), CacheHint::Exists);
        // The original value stays.
        assert_eq!(*cache.get(&id).unwrap(), 1);
    }

    #[test]
    fn weight_cap() {
        let mut cache: ObjectCache<u32> = ObjectCache::with_max_weight(10, 100);
        assert_eq!(
            cache.insert_weighted(make_id(1), Arc::new(1), 101),
            CacheHint::TooLarge
        );
        assert_eq!(
            cache.insert_weighted(make_id(2), Arc::new(2), 100),
            CacheHint::Added
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bounded_eviction() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(2);
        for n in 1..=5 {
            cache.insert(make_id(n), Arc::new(u32::from(n)));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&make_id(1)).is_none());
        assert!(cache.get(&make_id(5)).is_some());
    }

    #[test]
    fn get_promotes() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(2);
        cache.insert(make_id(1), Arc::new(1));
        cache.insert(make_id(2), Arc::new(2));
        cache.get(&make_id(1));
        cache.insert(make_id(3), Arc::new(3));
        assert!(cache.get(&make_id(1)).is_some());
        assert!(cache.get(&make_id(2)).is_none());
    }

    #[test]
    fn evicted_arc_survives_for_holders() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(1);
        cache.insert(make_id(1), Arc::new(42));
        let held = cache.get(&make_id(1)).unwrap();
        cache.insert(make_id(2), Arc::new(0));
        assert!(cache.get(&make_id(1)).is_none());
        assert_eq!(*held, 42);
    }

    #[test]
    fn distinct_ids_fill_to_capacity() {
        let mut cache: ObjectCache<u32> = ObjectCache::new(4);
        for n in 0..10 {
            cache.insert(make_id(n), Arc::new(0));
        }
        assert_eq!(cache.len(), 4.min(10));
    }
}
