//! Bounded caches for graph entities: one contract, interchangeable
//! eviction policies selected by [`CacheKind`].

pub mod adaptive;
pub mod clock;
pub mod lru;
pub mod none;
pub mod stripes;
pub mod strong;

pub use adaptive::{AdaptiveCache, AdaptiveCacheManager, MemoryPressure, MemorySample,
    ProcessMemoryPressure};
pub use clock::ClockCache;
pub use lru::LruEntityCache;
pub use none::NoCache;
pub use stripes::{StripedLoadLocks, DEFAULT_STRIPE_COUNT};
pub use strong::StrongCache;

use std::hash::Hash;
use std::sync::Arc;

use crate::config::CacheKind;
use crate::error::Result;

/// A bounded entity cache. Dispatch is by policy variant; all variants
/// honor the same contract: `put` installs or replaces, `get` returns the
/// current referent, `remove` evicts on demand, `resize` shrinks the
/// population to the new bound before returning, and `len` reports the
/// resident population.
pub enum Cache<K, V> {
    Clock(ClockCache<K, V>),
    /// Also backs the weak and soft configurations, which differ only in
    /// how eagerly the adaptive manager squeezes them.
    Lru(Arc<LruEntityCache<K, V>>),
    Strong(StrongCache<K, V>),
    None(NoCache),
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn for_kind(kind: CacheKind, name: &str, capacity: usize) -> Result<Self> {
        Ok(match kind {
            CacheKind::Weak | CacheKind::Soft | CacheKind::Lru => {
                Cache::Lru(Arc::new(LruEntityCache::new(name, capacity)?))
            }
            CacheKind::Clock => Cache::Clock(ClockCache::new(name, capacity)?),
            CacheKind::Strong => Cache::Strong(StrongCache::new(name)?),
            CacheKind::None => Cache::None(NoCache::new(name)?),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Cache::Clock(cache) => cache.name(),
            Cache::Lru(cache) => cache.name(),
            Cache::Strong(cache) => cache.name(),
            Cache::None(cache) => cache.name(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        match self {
            Cache::Clock(cache) => cache.get(key),
            Cache::Lru(cache) => cache.get(key),
            Cache::Strong(cache) => cache.get(key),
            Cache::None(_) => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        match self {
            Cache::Clock(cache) => cache.put(key, value),
            Cache::Lru(cache) => cache.put(key, value),
            Cache::Strong(cache) => cache.put(key, value),
            Cache::None(_) => {}
        }
    }

    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        match self {
            Cache::Clock(cache) => cache.put_all(entries),
            Cache::Lru(cache) => {
                for (key, value) in entries {
                    cache.put(key, value);
                }
            }
            Cache::Strong(cache) => {
                for (key, value) in entries {
                    cache.put(key, value);
                }
            }
            Cache::None(_) => {}
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        match self {
            Cache::Clock(cache) => cache.remove(key),
            Cache::Lru(cache) => cache.remove(key),
            Cache::Strong(cache) => cache.remove(key),
            Cache::None(_) => None,
        }
    }

    /// Unbounded and pass-through policies ignore resize by contract.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        match self {
            Cache::Clock(cache) => cache.resize(capacity),
            Cache::Lru(cache) => cache.resize(capacity),
            Cache::Strong(_) | Cache::None(_) => Ok(()),
        }
    }

    pub fn clear(&self) {
        match self {
            Cache::Clock(cache) => cache.clear(),
            Cache::Lru(cache) => cache.clear(),
            Cache::Strong(cache) => cache.clear(),
            Cache::None(_) => {}
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cache::Clock(cache) => cache.len(),
            Cache::Lru(cache) => cache.len(),
            Cache::Strong(cache) => cache.len(),
            Cache::None(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The handle the adaptive manager resizes, for policies that support
    /// it.
    pub fn adaptive_handle(&self) -> Option<Arc<dyn AdaptiveCache>> {
        match self {
            Cache::Lru(cache) => Some(Arc::clone(cache) as Arc<dyn AdaptiveCache>),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_kinds() -> Vec<CacheKind> {
        vec![
            CacheKind::Weak,
            CacheKind::Soft,
            CacheKind::Lru,
            CacheKind::Clock,
        ]
    }

    #[test]
    fn bounded_policies_honor_capacity() {
        for kind in bounded_kinds() {
            let cache: Cache<u64, u64> = Cache::for_kind(kind, "nodes", 16).unwrap();
            for i in 0..200 {
                cache.put(i, i);
                assert!(cache.len() <= 16, "{kind:?} exceeded its bound");
            }
        }
    }

    #[test]
    fn strong_policy_is_unbounded() {
        let cache: Cache<u64, u64> = Cache::for_kind(CacheKind::Strong, "nodes", 1).unwrap();
        for i in 0..100 {
            cache.put(i, i);
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.get(&0), Some(0));
        cache.resize(1).unwrap();
        assert_eq!(cache.len(), 100, "resize is a no-op for strong");
    }

    #[test]
    fn none_policy_always_misses() {
        let cache: Cache<u64, u64> = Cache::for_kind(CacheKind::None, "nodes", 100).unwrap();
        cache.put(1, 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn shared_contract_put_get_remove_clear() {
        for kind in bounded_kinds().into_iter().chain([CacheKind::Strong]) {
            let cache: Cache<u64, &str> = Cache::for_kind(kind, "nodes", 8).unwrap();
            cache.put(1, "a");
            cache.put(2, "b");
            assert_eq!(cache.get(&1), Some("a"), "{kind:?}");
            assert_eq!(cache.remove(&1), Some("a"), "{kind:?}");
            assert_eq!(cache.get(&1), None, "{kind:?}");
            cache.clear();
            assert_eq!(cache.len(), 0, "{kind:?}");
            assert_eq!(cache.get(&2), None, "{kind:?}");
        }
    }

    #[test]
    fn only_lru_family_registers_for_adaptive_resizing() {
        let lru: Cache<u64, u64> = Cache::for_kind(CacheKind::Soft, "nodes", 8).unwrap();
        assert!(lru.adaptive_handle().is_some());
        let clock: Cache<u64, u64> = Cache::for_kind(CacheKind::Clock, "nodes", 8).unwrap();
        assert!(clock.adaptive_handle().is_none());
    }
}
