//! Concurrent clock (second-chance) cache.
//!
//! Lookups are lock-free: a hit only reads the page map and flips an
//! atomic reference bit. Inserts, removals, eviction, resize and clear
//! serialize on the clock-queue monitor, which keeps the population
//! accounting exact while leaving the hot read path uncontended.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{GraphError, Result};

/// One referent holder. A page lives in the clock queue for as long as its
/// key is resident; eviction empties the slot but leaves the page queued
/// for reuse by the next insert of the same key.
#[derive(Debug)]
struct Page<V> {
    referenced: AtomicBool,
    slot: RwLock<Option<V>>,
}

impl<V> Page<V> {
    fn empty() -> Self {
        Self {
            referenced: AtomicBool::new(false),
            slot: RwLock::new(None),
        }
    }
}

impl<V: Clone> Page<V> {
    fn value(&self) -> Option<V> {
        self.slot.read().clone()
    }
}

pub struct ClockCache<K, V> {
    name: String,
    pages: DashMap<K, Arc<Page<V>>>,
    /// Circular queue of pages; its mutex doubles as the put/evict monitor.
    clock: Mutex<VecDeque<Arc<Page<V>>>>,
    capacity: AtomicUsize,
    population: AtomicUsize,
}

impl<K, V> ClockCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "cache name cannot be empty".into(),
            ));
        }
        if capacity == 0 {
            return Err(GraphError::InvalidArgument(format!(
                "{capacity} is not a valid cache capacity"
            )));
        }
        Ok(Self {
            name,
            pages: DashMap::new(),
            clock: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity),
            population: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.population.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock-free on hit: reads the slot and marks the page referenced.
    pub fn get(&self, key: &K) -> Option<V> {
        let page = self.pages.get(key)?;
        let value = page.value().value()?;
        page.referenced.store(true, Ordering::Relaxed);
        Some(value)
    }

    pub fn put(&self, key: K, value: V) {
        let mut clock = self.clock.lock();
        let page = match self.pages.entry(key) {
            Entry::Occupied(entry) => {
                let page = Arc::clone(entry.get());
                // Updating a resident key counts as an access.
                page.referenced.store(true, Ordering::Relaxed);
                page
            }
            Entry::Vacant(entry) => {
                let page = Arc::new(Page::empty());
                entry.insert(Arc::clone(&page));
                clock.push_back(Arc::clone(&page));
                page
            }
        };
        let previous = page.slot.write().replace(value);
        if previous.is_none()
            && self.population.fetch_add(1, Ordering::Relaxed) + 1
                > self.capacity.load(Ordering::Relaxed)
        {
            self.evict_locked(&mut clock);
        }
    }

    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        // Under the monitor so the population accounting cannot race a
        // clear or an eviction walk.
        let _clock = self.clock.lock();
        let (_, page) = self.pages.remove(key)?;
        let value = page.slot.write().take();
        if value.is_some() {
            self.population.fetch_sub(1, Ordering::Relaxed);
        }
        page.referenced.store(false, Ordering::Relaxed);
        // The orphaned page stays queued; the clock walk prunes it.
        value
    }

    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(GraphError::InvalidArgument(format!(
                "{capacity} is not a valid cache capacity"
            )));
        }
        let mut clock = self.clock.lock();
        self.capacity.store(capacity, Ordering::Relaxed);
        self.evict_locked(&mut clock);
        Ok(())
    }

    pub fn clear(&self) {
        let mut clock = self.clock.lock();
        self.pages.clear();
        clock.clear();
        self.population.store(0, Ordering::Relaxed);
    }

    /// Internal-state diagnostic: population within capacity and in
    /// agreement with the queue's resident pages.
    pub fn assert_consistent(&self) -> Result<()> {
        let clock = self.clock.lock();
        let population = self.population.load(Ordering::Relaxed);
        let capacity = self.capacity.load(Ordering::Relaxed);
        if population > capacity {
            return Err(GraphError::CacheState(format!(
                "{}: population {population} exceeds capacity {capacity}",
                self.name
            )));
        }
        let resident = clock
            .iter()
            .filter(|page| page.slot.read().is_some())
            .count();
        if resident != population {
            return Err(GraphError::CacheState(format!(
                "{}: queue holds {resident} residents but population is {population}",
                self.name
            )));
        }
        Ok(())
    }

    /// Walks the queue until population fits the capacity. Pages with the
    /// reference bit set get a second chance; pages whose key was removed
    /// are pruned when the queue holds the only reference to them.
    ///
    /// Concurrent `get`s can re-set bits mid-walk, so the polite scan is
    /// bounded; past the bound residents are reclaimed regardless of their
    /// bit, which keeps the population invariant unconditional.
    fn evict_locked(&self, clock: &mut VecDeque<Arc<Page<V>>>) {
        let mut polite_budget = clock.len().saturating_mul(2);
        while self.population.load(Ordering::Relaxed) > self.capacity.load(Ordering::Relaxed) {
            let Some(page) = clock.pop_front() else {
                break;
            };
            let forced = polite_budget == 0;
            polite_budget = polite_budget.saturating_sub(1);
            if !forced && page.referenced.swap(false, Ordering::Relaxed) {
                clock.push_back(page);
                continue;
            }
            let evicted = page.slot.write().take();
            if evicted.is_some() {
                self.population.fetch_sub(1, Ordering::Relaxed);
                clock.push_back(page);
            } else if Arc::strong_count(&page) > 1 {
                clock.push_back(page);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rejects_empty_name_and_zero_capacity() {
        assert!(ClockCache::<u64, u64>::new("", 3).is_err());
        assert!(ClockCache::<u64, u64>::new("nodes", 0).is_err());
    }

    #[test]
    fn basic_put_get_remove() {
        let cache = ClockCache::new("nodes", 4).unwrap();
        cache.put(1u64, "one");
        cache.put(2, "two");
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn update_replaces_without_growing() {
        let cache = ClockCache::new("nodes", 2).unwrap();
        cache.put(1u64, 10);
        cache.put(1, 11);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), Some(11));
    }

    #[test]
    fn referenced_page_gets_second_chance() {
        let cache = ClockCache::new("nodes", 3).unwrap();
        cache.put('a', 1);
        cache.put('b', 2);
        cache.put('c', 3);
        assert_eq!(cache.get(&'a'), Some(1));

        cache.put('d', 4);

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&'a').is_some(), "accessed page must survive");
        assert!(cache.get(&'d').is_some(), "fresh insert must be resident");
        let survivors = [cache.get(&'b').is_some(), cache.get(&'c').is_some()];
        assert_eq!(
            survivors.iter().filter(|s| **s).count(),
            1,
            "exactly one unreferenced page is reclaimed"
        );
    }

    #[test]
    fn population_never_exceeds_capacity() {
        let cache = ClockCache::new("nodes", 8).unwrap();
        for i in 0..1000u64 {
            cache.put(i, i);
            assert!(cache.len() <= 8, "population {} after put {i}", cache.len());
        }
    }

    #[test]
    fn evicted_key_reuses_its_page() {
        let cache = ClockCache::new("nodes", 2).unwrap();
        cache.put(1u64, 1);
        cache.put(2, 2);
        cache.put(3, 3); // evicts one of the unreferenced pages
        let evicted = [1u64, 2]
            .into_iter()
            .find(|k| cache.get(k).is_none())
            .unwrap();

        cache.put(evicted, 99);
        assert_eq!(cache.get(&evicted), Some(99));
        assert!(cache.len() <= 2);
        // The resident set and queue stay consistent across the reuse.
        assert_eq!(cache.clock.lock().len(), 3);
    }

    #[test]
    fn orphaned_pages_are_pruned_during_the_walk() {
        let cache = ClockCache::new("nodes", 2).unwrap();
        for i in 0..16u64 {
            cache.put(i, i);
            cache.remove(&i);
        }
        // Fill to capacity to drive a full clock walk.
        cache.put(100, 100);
        cache.put(101, 101);
        cache.put(102, 102);
        assert!(
            cache.clock.lock().len() <= 4,
            "removed keys must not pin queue slots"
        );
    }

    #[test]
    fn resize_shrinks_population_before_returning() {
        let cache = ClockCache::new("nodes", 100).unwrap();
        for i in 0..100u64 {
            cache.put(i, i);
        }
        cache.resize(10).unwrap();
        assert!(cache.len() <= 10);
        assert!(cache.resize(0).is_err());
    }

    #[test]
    fn clear_resets_population_and_queue() {
        let cache = ClockCache::new("nodes", 4).unwrap();
        cache.put(1u64, 1);
        cache.put(2, 2);
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(&1), None);
        cache.put(1, 5);
        assert_eq!(cache.get(&1), Some(5));
    }

    #[test]
    fn concurrent_hammer_holds_the_bound() {
        let cache = Arc::new(ClockCache::new("nodes", 64).unwrap());
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..2000u64 {
                    let key = (t * 131 + i) % 256;
                    cache.put(key, key);
                    let _ = cache.get(&key);
                    if i % 7 == 0 {
                        cache.remove(&key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64);
        cache.assert_consistent().unwrap();
    }

    #[test]
    fn consistency_check_holds_through_churn() {
        let cache = ClockCache::new("nodes", 4).unwrap();
        for i in 0..64u64 {
            cache.put(i, i);
            if i % 3 == 0 {
                cache.remove(&i);
            }
            cache.assert_consistent().unwrap();
        }
        cache.resize(2).unwrap();
        cache.assert_consistent().unwrap();
        cache.clear();
        cache.assert_consistent().unwrap();
    }
}
