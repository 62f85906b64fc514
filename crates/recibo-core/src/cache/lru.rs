//! Bounded least-recently-used result cache.
//!
//! Entries live in a slot vector threaded by a doubly-linked recency list
//! (head = most recent, tail = least recent) and are indexed by a hash map,
//! so `get` and `put` are O(1). The cache is not synchronized; owners wrap
//! it in a `Mutex` together with its counters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ContentHash;

/// Default maximum number of cached extractions.
pub const DEFAULT_CAPACITY: usize = 256;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Fast-path rule applications.
    pub fast_path_hits: u64,
    /// `hits / max(1, hits + misses)`, rounded to 3 decimals.
    pub hit_rate: f64,
}

struct Node<V> {
    key: ContentHash,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU map from content hash to a previously computed value.
pub struct ResultCache<V> {
    index: HashMap<ContentHash, usize>,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    hits: u64,
    misses: u64,
    fast_path_hits: u64,
}

impl<V> ResultCache<V> {
    /// Create an empty cache.
    ///
    /// # Panics
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be > 0");
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
            hits: 0,
            misses: 0,
            fast_path_hits: 0,
        }
    }

    /// Look up `key`, marking it most recently used. Counts a hit or a miss.
    pub fn get(&mut self, key: &ContentHash) -> Option<&V> {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.unlink(idx);
                self.push_front(idx);
                self.slots[idx].as_ref().map(|node| &node.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite `key`, then evict least recently used entries
    /// until the cache is back within capacity.
    pub fn put(&mut self, key: ContentHash, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.slots[idx].as_mut() {
                node.value = value;
            }
            self.unlink(idx);
            self.push_front(idx);
            return;
        }

        let node = Node {
            key,
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);

        while self.index.len() > self.capacity {
            self.evict_tail();
        }
    }

    /// Whether `key` is cached. Does not affect recency or counters.
    pub fn contains(&self, key: &ContentHash) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count one fast-path application.
    pub fn record_fast_path(&mut self) {
        self.fast_path_hits += 1;
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let lookups = (self.hits + self.misses).max(1);
        let hit_rate = self.hits as f64 / lookups as f64;
        CacheStats {
            size: self.len(),
            max_size: self.capacity,
            hits: self.hits,
            misses: self.misses,
            fast_path_hits: self.fast_path_hits,
            hit_rate: (hit_rate * 1000.0).round() / 1000.0,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<ContentHash> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            match self.slots[idx].as_ref() {
                Some(node) => {
                    keys.push(node.key);
                    cursor = node.next;
                }
                None => break,
            }
        }
        keys
    }

    fn evict_tail(&mut self) {
        let Some(idx) = self.tail else { return };
        self.unlink(idx);
        if let Some(node) = self.slots[idx].take() {
            self.index.remove(&node.key);
        }
        self.free.push(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_mut() {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.slots[h].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(n: u32) -> ContentHash {
        ContentHash::of(&n.to_le_bytes())
    }

    #[test]
    fn test_get_and_put() {
        let mut cache = ResultCache::new(4);
        cache.put(key(1), "one");

        assert_eq!(cache.get(&key(1)), Some(&"one"));
        assert_eq!(cache.get(&key(2)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let mut cache = ResultCache::new(3);
        for n in 1..=4 {
            cache.put(key(n), n);
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(4)));
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let mut cache = ResultCache::new(3);
        for n in 1..=3 {
            cache.put(key(n), n);
        }

        // 1 becomes most recent; 2 is now the eviction candidate.
        assert_eq!(cache.get(&key(1)), Some(&1));
        cache.put(key(4), 4);

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.keys_by_recency(), vec![key(4), key(1), key(3)]);
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let mut cache = ResultCache::new(2);
        cache.put(key(1), "a");
        cache.put(key(2), "b");
        cache.put(key(1), "a2");
        cache.put(key(3), "c");

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.get(&key(1)), Some(&"a2"));
    }

    #[test]
    fn test_slots_are_reused() {
        let mut cache = ResultCache::new(2);
        for n in 0..100 {
            cache.put(key(n), n);
        }

        assert_eq!(cache.slots.len(), 3);
        assert_eq!(cache.keys_by_recency(), vec![key(99), key(98)]);
    }

    #[test]
    fn test_capacity_one() {
        let mut cache = ResultCache::new(1);
        cache.put(key(1), 1);
        cache.put(key(2), 2);

        assert_eq!(cache.keys_by_recency(), vec![key(2)]);
        assert_eq!(cache.get(&key(2)), Some(&2));
    }

    #[test]
    fn test_stats() {
        let mut cache = ResultCache::new(8);
        cache.put(key(1), ());
        cache.get(&key(9));
        cache.get(&key(1));
        cache.get(&key(1));
        cache.record_fast_path();

        assert_eq!(
            cache.stats(),
            CacheStats {
                size: 1,
                max_size: 8,
                hits: 2,
                misses: 1,
                fast_path_hits: 1,
                hit_rate: 0.667,
            }
        );
    }

    #[test]
    fn test_empty_stats_hit_rate() {
        let cache: ResultCache<()> = ResultCache::new(DEFAULT_CAPACITY);
        assert_eq!(cache.stats().hit_rate, 0.0);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 256);
    }

    #[test]
    #[should_panic(expected = "cache capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = ResultCache::<()>::new(0);
    }
}
