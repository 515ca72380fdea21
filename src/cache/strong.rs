//! Unbounded strong-reference cache: everything loaded stays resident
//! until removed or cleared. Resize is a no-op by contract.

use std::hash::Hash;

use dashmap::DashMap;

use crate::error::{GraphError, Result};

pub struct StrongCache<K, V> {
    name: String,
    map: DashMap<K, V>,
}

impl<K, V> StrongCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "cache name cannot be empty".into(),
            ));
        }
        Ok(Self {
            name,
            map: DashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_everything_it_is_given() {
        let cache = StrongCache::new("nodes").unwrap();
        for i in 0..10_000u64 {
            cache.put(i, i);
        }
        assert_eq!(cache.len(), 10_000);
        assert_eq!(cache.get(&9_999), Some(9_999));
    }

    #[test]
    fn remove_and_clear() {
        let cache = StrongCache::new("nodes").unwrap();
        cache.put(1u64, "x");
        assert_eq!(cache.remove(&1), Some("x"));
        cache.put(2, "y");
        cache.clear();
        assert!(cache.is_empty());
    }
}
