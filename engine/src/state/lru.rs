//! Bounded map with least-recently-used eviction
//!
//! Shared by the context store and the validation caches. Recency is a
//! monotonically increasing stamp per entry; an ordered index from stamp to
//! key gives the eviction victim in O(log n).

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    stamp: u64,
}

/// A size-bounded map that evicts the least recently used entry
#[derive(Debug)]
pub struct BoundedLru<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
}

impl<K, V> BoundedLru<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a map holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key` and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.entries.get_mut(key)?;
        if let Some(owned) = self.order.remove(&slot.stamp) {
            self.tick += 1;
            slot.stamp = self.tick;
            self.order.insert(self.tick, owned);
        }
        Some(&slot.value)
    }

    /// Look up `key` without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Insert or replace `key`
    ///
    /// Replacing an existing key never evicts. Inserting a new key into a full
    /// map evicts the least recently used entry and returns it.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.tick += 1;
        let stamp = self.tick;

        if let Some(slot) = self.entries.get_mut(&key) {
            self.order.remove(&slot.stamp);
            slot.stamp = stamp;
            slot.value = value;
            self.order.insert(stamp, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp });
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.stamp);
        Some(slot.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut lru = BoundedLru::new(3);
        lru.insert("a".to_string(), 1);
        lru.insert("b".to_string(), 2);

        assert_eq!(lru.get("a"), Some(&1));
        assert_eq!(lru.peek("b"), Some(&2));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = BoundedLru::new(2);
        lru.insert("a".to_string(), 1);
        lru.insert("b".to_string(), 2);

        // Touch "a" so "b" becomes the oldest
        lru.get("a");
        let evicted = lru.insert("c".to_string(), 3);

        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(lru.contains("a"));
        assert!(lru.contains("c"));
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn test_replacing_existing_key_never_evicts() {
        let mut lru = BoundedLru::new(2);
        lru.insert("a".to_string(), 1);
        lru.insert("b".to_string(), 2);

        assert_eq!(lru.insert("a".to_string(), 10), None);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.peek("a"), Some(&10));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut lru = BoundedLru::new(2);
        lru.insert("a".to_string(), 1);
        lru.insert("b".to_string(), 2);

        lru.peek("a");
        let evicted = lru.insert("c".to_string(), 3);
        assert_eq!(evicted.map(|(k, _)| k), Some("a".to_string()));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut lru = BoundedLru::new(4);
        lru.insert(1u32, "one");
        lru.insert(2u32, "two");

        assert_eq!(lru.remove(&1), Some("one"));
        assert_eq!(lru.remove(&1), None);
        assert_eq!(lru.keys().copied().collect::<Vec<_>>(), vec![2]);

        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.keys().count(), 0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut lru = BoundedLru::new(0);
        assert_eq!(lru.capacity(), 1);
        lru.insert(1u8, ());
        lru.insert(2u8, ());
        assert_eq!(lru.len(), 1);
        assert!(lru.contains(&2));
    }
}
