//! Bounded access-ordered cache. The policy the adaptive manager can
//! resize at runtime; also the stand-in for collector-managed weak and
//! soft references, which here shed entries on explicit memory pressure.

use std::hash::Hash;
use std::num::NonZeroUsize;

use parking_lot::Mutex;

use crate::cache::adaptive::AdaptiveCache;
use crate::error::{GraphError, Result};

pub struct LruEntityCache<K, V> {
    name: String,
    inner: Mutex<lru::LruCache<K, V>>,
}

impl<K, V> LruEntityCache<K, V>
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
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            GraphError::InvalidArgument("0 is not a valid cache capacity".into())
        })?;
        Ok(Self {
            name,
            inner: Mutex::new(lru::LruCache::new(capacity)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    /// Shrinks or grows the window. `lru` drops least-recently-used
    /// entries on shrink, so population ≤ capacity holds on return.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            GraphError::InvalidArgument("0 is not a valid cache capacity".into())
        })?;
        self.inner.lock().resize(capacity);
        Ok(())
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl<K, V> AdaptiveCache for LruEntityCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn cache_name(&self) -> &str {
        &self.name
    }

    fn population(&self) -> usize {
        self.len()
    }

    fn current_capacity(&self) -> usize {
        self.capacity()
    }

    fn apply_capacity(&self, capacity: usize) {
        // The manager clamps to configured bounds; guard the lower edge.
        let _ = self.resize(capacity.max(1));
    }
}
