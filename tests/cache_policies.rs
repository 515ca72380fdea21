//! The cache-policy matrix against the manager, plus property tests for
//! the bounded-cache contract.

mod common;

use std::sync::Arc;

use common::CountingLoader;
use proptest::prelude::*;
use sable::cache::{Cache, ClockCache};
use sable::config::CacheKind;
use sable::store::RecordLoader;
use sable::{EntityLockManager, EntityManager, GraphConfig, MemoryIdGenerator, PropertyValue};

fn manager_with_kind(kind: CacheKind) -> Arc<EntityManager> {
    let config = GraphConfig {
        cache_kind: kind,
        max_node_cache_size: 8,
        max_relationship_cache_size: 16,
        use_adaptive_cache: false,
        ..GraphConfig::default()
    };
    EntityManager::new(
        config,
        Arc::new(CountingLoader::new()),
        Arc::new(EntityLockManager::new()),
        Arc::new(MemoryIdGenerator::new()),
    )
    .unwrap()
}

#[test]
fn every_policy_supports_the_full_workflow() {
    for kind in [
        CacheKind::Weak,
        CacheKind::Soft,
        CacheKind::Lru,
        CacheKind::Clock,
        CacheKind::Strong,
        CacheKind::None,
    ] {
        let manager = manager_with_kind(kind);
        assert_eq!(manager.cache_kind(), kind);

        let txn = manager.begin();
        let a = manager.create_node(&txn).unwrap();
        let b = manager.create_node(&txn).unwrap();
        let rel = a.create_relationship_to(&txn, &b, "LINKS").unwrap();
        a.set_property(&txn, "name", "a".into()).unwrap();
        txn.commit().unwrap();

        let txn = manager.begin();
        assert_eq!(
            a.property(&txn, "name").unwrap(),
            Some(PropertyValue::from("a")),
            "{kind:?}"
        );
        assert_eq!(a.relationships(&txn).unwrap(), vec![rel.clone()], "{kind:?}");
        assert_eq!(
            manager.get_node_by_id(b.id()).unwrap().id(),
            b.id(),
            "{kind:?}"
        );
        txn.rollback().unwrap();
    }
}

#[test]
fn bounded_policies_stay_within_budget_under_load() {
    for kind in [CacheKind::Lru, CacheKind::Clock] {
        let manager = manager_with_kind(kind);
        let txn = manager.begin();
        let nodes: Vec<_> = (0..64)
            .map(|_| manager.create_node(&txn).unwrap())
            .collect();
        txn.commit().unwrap();

        for node in &nodes {
            manager.get_node_by_id(node.id()).unwrap();
            for (name, population) in manager.cache_populations() {
                let budget = if name == "NodeCache" { 8 } else { 16 };
                assert!(
                    population <= budget,
                    "{kind:?} {name} over budget: {population}"
                );
            }
        }
        // Every node remains reachable; eviction only costs a reload.
        for node in &nodes {
            assert_eq!(manager.get_node_by_id(node.id()).unwrap().id(), node.id());
        }
    }
}

#[test]
fn none_policy_reloads_on_every_access() {
    let loader = Arc::new(CountingLoader::new());
    let config = GraphConfig {
        cache_kind: CacheKind::None,
        ..GraphConfig::default()
    };
    let manager = EntityManager::new(
        config,
        Arc::clone(&loader) as Arc<dyn RecordLoader>,
        Arc::new(EntityLockManager::new()),
        Arc::new(MemoryIdGenerator::new()),
    )
    .unwrap();

    let txn = manager.begin();
    let node = manager.create_node(&txn).unwrap();
    txn.commit().unwrap();

    for _ in 0..3 {
        manager.get_node_by_id(node.id()).unwrap();
    }
    assert_eq!(
        loader.node_load_count(node.id()),
        3,
        "a pass-through cache cannot absorb loads"
    );
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put(u8, u16),
    Get(u8),
    Remove(u8),
}

fn cache_op() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (any::<u8>(), any::<u16>()).prop_map(|(k, v)| CacheOp::Put(k, v)),
        any::<u8>().prop_map(CacheOp::Get),
        any::<u8>().prop_map(CacheOp::Remove),
    ]
}

proptest! {
    /// Population never exceeds capacity between operations, for any
    /// operation sequence, and hits only ever return installed values.
    #[test]
    fn clock_population_bounded_for_any_sequence(
        capacity in 1usize..12,
        ops in proptest::collection::vec(cache_op(), 1..200),
    ) {
        let cache = ClockCache::new("nodes", capacity).unwrap();
        let mut installed: std::collections::HashMap<u8, Vec<u16>> =
            std::collections::HashMap::new();
        for op in ops {
            match op {
                CacheOp::Put(k, v) => {
                    cache.put(k, v);
                    installed.entry(k).or_default().push(v);
                }
                CacheOp::Get(k) => {
                    if let Some(v) = cache.get(&k) {
                        prop_assert!(
                            installed.get(&k).map_or(false, |vs| vs.contains(&v)),
                            "hit returned a value never installed for the key"
                        );
                    }
                }
                CacheOp::Remove(k) => {
                    cache.remove(&k);
                }
            }
            prop_assert!(cache.len() <= capacity);
        }
        prop_assert!(cache.assert_consistent().is_ok());
    }

    #[test]
    fn lru_resize_bound_holds_for_any_shrink(
        fill in 1usize..100,
        shrink in 1usize..100,
    ) {
        let cache: Cache<u64, u64> = Cache::for_kind(CacheKind::Lru, "nodes", 100).unwrap();
        for i in 0..fill as u64 {
            cache.put(i, i);
        }
        cache.resize(shrink).unwrap();
        prop_assert!(cache.len() <= shrink);
    }
}
