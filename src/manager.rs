//! The entity manager: the facade over the caches, the load coordinator,
//! the name holders and the transactional write paths.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::cache::{AdaptiveCacheManager, Cache, ProcessMemoryPressure, StripedLoadLocks};
use crate::config::{CacheKind, GraphConfig};
use crate::entity::node::ChainPosition;
use crate::entity::rel_ids::RelIdArray;
use crate::entity::{CachedNode, CachedRel, NodeProxy, PropertySlot, RelProxy};
use crate::error::{GraphError, Result};
use crate::ids::{IdGenerator, MemoryIdGenerator};
use crate::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::model::{
    Direction, EntityRef, KeyId, NodeId, PropertyValue, RelId, TypeId, IdKind,
};
use crate::names::{PropertyKeyHolder, ReferenceNodeHolder, RelationshipTypeHolder};
use crate::store::{MemoryRecordStore, RecordLoader, RelRecord};
use crate::txn::{EntityDelta, EntityLockManager, LockManager, LockMode, TxOutcome, Txn};

/// Observer of property mutations. Callbacks run before the mutation is
/// recorded; an error from a callback aborts the mutation and poisons the
/// transaction.
pub trait PropertyTracker: Send + Sync {
    fn property_added(&self, entity: EntityRef, key: &str, value: &PropertyValue) -> Result<()>;

    fn property_changed(
        &self,
        entity: EntityRef,
        key: &str,
        old: &PropertyValue,
        new: &PropertyValue,
    ) -> Result<()>;

    fn property_removed(&self, entity: EntityRef, key: &str, old: &PropertyValue) -> Result<()>;
}

type Trackers = RwLock<Vec<Arc<dyn PropertyTracker>>>;

pub struct EntityManager {
    /// Back-reference handed to proxies and transactions; they hold the
    /// manager, the manager holds none of them.
    self_ref: Weak<EntityManager>,
    config: GraphConfig,
    loader: Arc<dyn RecordLoader>,
    lock_manager: Arc<dyn LockManager>,
    id_generator: Arc<dyn IdGenerator>,
    node_cache: Cache<NodeId, Arc<CachedNode>>,
    rel_cache: Cache<RelId, Arc<CachedRel>>,
    load_locks: StripedLoadLocks,
    types: RelationshipTypeHolder,
    keys: PropertyKeyHolder,
    references: ReferenceNodeHolder,
    /// The graph itself carries properties, cache-resident like any other
    /// entity but never evicted.
    graph_props: PropertySlot,
    node_trackers: Trackers,
    rel_trackers: Trackers,
    adaptive: Option<AdaptiveCacheManager>,
    next_tx: AtomicU64,
    node_metrics: CacheMetrics,
    rel_metrics: CacheMetrics,
}

impl EntityManager {
    pub fn new(
        config: GraphConfig,
        loader: Arc<dyn RecordLoader>,
        lock_manager: Arc<dyn LockManager>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Result<Arc<Self>> {
        let config = config.clamped();
        let node_cache = Cache::for_kind(
            config.cache_kind,
            "NodeCache",
            config.max_node_cache_size.max(1),
        )?;
        let rel_cache = Cache::for_kind(
            config.cache_kind,
            "RelationshipCache",
            config.max_relationship_cache_size.max(1),
        )?;
        let adaptive = (config.use_adaptive_cache || config.cache_kind.pressure_driven()).then(
            || {
                AdaptiveCacheManager::new(
                    Box::new(ProcessMemoryPressure::new(config.memory_budget_bytes)),
                    config.adaptive_sample_interval,
                )
            },
        );
        let types = RelationshipTypeHolder::new(Arc::clone(&id_generator), Arc::clone(&loader));
        let keys = PropertyKeyHolder::new(Arc::clone(&id_generator), Arc::clone(&loader));
        let references = ReferenceNodeHolder::new(loader.as_ref());
        let manager = Arc::new_cyclic(|self_ref| Self {
            self_ref: Weak::clone(self_ref),
            node_cache,
            rel_cache,
            load_locks: StripedLoadLocks::default(),
            types,
            keys,
            references,
            graph_props: PropertySlot::default(),
            node_trackers: RwLock::new(Vec::new()),
            rel_trackers: RwLock::new(Vec::new()),
            adaptive,
            next_tx: AtomicU64::new(1),
            node_metrics: CacheMetrics::default(),
            rel_metrics: CacheMetrics::default(),
            loader,
            lock_manager,
            id_generator,
            config,
        });
        if let Some(adaptive) = &manager.adaptive {
            let ratio = manager.config.adaptive_cache_heap_ratio;
            let mut registered = false;
            if let Some(handle) = manager.node_cache.adaptive_handle() {
                adaptive.register(
                    handle,
                    ratio,
                    manager.config.min_node_cache_size,
                    manager.config.max_node_cache_size,
                );
                registered = true;
            }
            if let Some(handle) = manager.rel_cache.adaptive_handle() {
                adaptive.register(
                    handle,
                    ratio,
                    manager.config.min_relationship_cache_size,
                    manager.config.max_relationship_cache_size,
                );
                registered = true;
            }
            // Policies that cannot resize leave the sampler idle.
            if registered {
                adaptive.start();
            }
        }
        debug!(
            cache = manager.config.cache_kind.description(),
            "entity manager ready"
        );
        Ok(manager)
    }

    /// Fully in-process manager: memory record store, entity lock table
    /// and atomic id generator.
    pub fn embedded(config: GraphConfig) -> Result<Arc<Self>> {
        // Hosts with their own subscriber keep it; installation is
        // best-effort.
        let _ = crate::logging::init_logging("sable=warn");
        Self::new(
            config,
            Arc::new(MemoryRecordStore::new()),
            Arc::new(EntityLockManager::new()),
            Arc::new(MemoryIdGenerator::new()),
        )
    }

    /// A strong handle on this manager. Callable from any live method:
    /// the caller reached us through an `Arc` that the weak self-reference
    /// mirrors.
    fn handle(&self) -> Arc<EntityManager> {
        self.self_ref.upgrade().expect("entity manager is alive")
    }

    pub(crate) fn loader(&self) -> &dyn RecordLoader {
        self.loader.as_ref()
    }

    pub(crate) fn lock_manager(&self) -> &dyn LockManager {
        self.lock_manager.as_ref()
    }

    pub fn cache_kind(&self) -> CacheKind {
        self.config.cache_kind
    }

    pub fn begin(&self) -> Txn {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Txn::new(id, self.handle())
    }

    // ------------------------------------------------------------------
    // load coordinator

    /// Double-checked striped load: at most one loader call per id runs
    /// at any moment, while disjoint stripes fault in concurrently.
    fn light_node(&self, id: NodeId) -> Result<Option<Arc<CachedNode>>> {
        if let Some(node) = self.node_cache.get(&id) {
            self.node_metrics.record_hit();
            return Ok(Some(node));
        }
        self.node_metrics.record_miss();
        let _stripe = self.load_locks.lock(id);
        if let Some(node) = self.node_cache.get(&id) {
            return Ok(Some(node));
        }
        let Some(record) = self.loader.load_light_node(id)? else {
            return Ok(None);
        };
        self.node_metrics.record_load();
        let node = Arc::new(CachedNode::new_light(record));
        self.node_cache.put(id, Arc::clone(&node));
        Ok(Some(node))
    }

    fn light_rel(&self, id: RelId) -> Result<Option<Arc<CachedRel>>> {
        if let Some(rel) = self.rel_cache.get(&id) {
            self.rel_metrics.record_hit();
            return Ok(Some(rel));
        }
        self.rel_metrics.record_miss();
        let _stripe = self.load_locks.lock(id);
        if let Some(rel) = self.rel_cache.get(&id) {
            return Ok(Some(rel));
        }
        let Some(record) = self.loader.load_light_relationship(id)? else {
            return Ok(None);
        };
        self.rel_metrics.record_load();
        if self.types.name_of(record.type_id).is_none() {
            return Err(GraphError::NotFound(format!(
                "Relationship[{id}] exists but relationship type[{}] not found",
                record.type_id
            )));
        }
        let rel = Arc::new(CachedRel::new_light(record));
        self.rel_cache.put(id, Arc::clone(&rel));
        Ok(Some(rel))
    }

    pub fn get_node_or_null(&self, id: NodeId) -> Result<Option<NodeProxy>> {
        Ok(self
            .light_node(id)?
            .map(|_| NodeProxy::new(id, self.handle())))
    }

    pub fn get_node_by_id(&self, id: NodeId) -> Result<NodeProxy> {
        self.get_node_or_null(id)?
            .ok_or_else(|| GraphError::not_found("Node", id))
    }

    pub fn get_relationship_or_null(&self, id: RelId) -> Result<Option<RelProxy>> {
        Ok(self
            .light_rel(id)?
            .map(|_| RelProxy::new(id, self.handle())))
    }

    pub fn get_relationship_by_id(&self, id: RelId) -> Result<RelProxy> {
        self.get_relationship_or_null(id)?
            .ok_or_else(|| GraphError::not_found("Relationship", id))
    }

    /// Lazy scan over every allocated node id, silently skipping holes.
    pub fn all_nodes(&self) -> AllNodes {
        let high = self
            .id_generator
            .highest_in_use(IdKind::Node)
            .max(self.loader.highest_id_in_use(IdKind::Node));
        AllNodes {
            manager: self.handle(),
            next: 0,
            high,
            done: false,
        }
    }

    pub fn all_relationships(&self) -> AllRelationships {
        let high = self
            .id_generator
            .highest_in_use(IdKind::Relationship)
            .max(self.loader.highest_id_in_use(IdKind::Relationship));
        AllRelationships {
            manager: self.handle(),
            next: 0,
            high,
            done: false,
        }
    }

    // ------------------------------------------------------------------
    // relationship chain paging

    /// Fetches and merges one chain page. Paging for a node serializes on
    /// its load stripe; the batch is materialized locally, merged into
    /// the node atomically and only then bulk-inserted into the
    /// relationship cache.
    fn page_more_relationships(&self, node: &Arc<CachedNode>) -> Result<()> {
        let _stripe = self.load_locks.lock(node.id());
        let position = match node.chain_position() {
            // A racing pager may have finished the chain while we waited
            // on the stripe.
            ChainPosition::Exhausted => return Ok(()),
            ChainPosition::Unstarted => 0,
            ChainPosition::At(position) => position,
        };
        let batch = self.loader.more_relationships(node.id(), position)?;
        let has_loops = !batch.loops.is_empty();
        let mut local: std::collections::HashMap<String, RelIdArray> =
            std::collections::HashMap::new();
        let mut fresh: Vec<(RelId, Arc<CachedRel>)> = Vec::new();
        self.receive_records(&mut local, &mut fresh, &batch.loops, Direction::Both, has_loops)?;
        self.receive_records(
            &mut local,
            &mut fresh,
            &batch.outgoing,
            Direction::Outgoing,
            has_loops,
        )?;
        self.receive_records(
            &mut local,
            &mut fresh,
            &batch.incoming,
            Direction::Incoming,
            has_loops,
        )?;
        node.merge_chain_page(local, batch.next);
        self.rel_cache.put_all(fresh);
        Ok(())
    }

    fn receive_records(
        &self,
        local: &mut std::collections::HashMap<String, RelIdArray>,
        fresh: &mut Vec<(RelId, Arc<CachedRel>)>,
        records: &[RelRecord],
        direction: Direction,
        has_loops: bool,
    ) -> Result<()> {
        for record in records {
            let type_name = self.types.name_of(record.type_id).ok_or_else(|| {
                GraphError::NotFound(format!(
                    "Relationship[{}] exists but relationship type[{}] not found",
                    record.id, record.type_id
                ))
            })?;
            if self.rel_cache.get(&record.id).is_none() {
                fresh.push((record.id, Arc::new(CachedRel::new_light(*record))));
            }
            local
                .entry(type_name)
                .or_insert_with(|| {
                    if has_loops {
                        RelIdArray::with_loops()
                    } else {
                        RelIdArray::new()
                    }
                })
                .add(record.id, direction);
        }
        Ok(())
    }

    /// Whether the node is visible to the transaction: resident, in the
    /// committed store, or created by the transaction itself (a bounded
    /// cache may already have shed an uncommitted entity).
    fn node_present(&self, txn: &Txn, id: NodeId) -> Result<bool> {
        if self.light_node(id)?.is_some() {
            return Ok(true);
        }
        Ok(self.loader.is_created(txn.id(), EntityRef::Node(id)))
    }

    fn rel_present(&self, txn: &Txn, id: RelId) -> Result<bool> {
        if self.light_rel(id)?.is_some() {
            return Ok(true);
        }
        Ok(self.loader.is_created(txn.id(), EntityRef::Rel(id)))
    }

    /// Committed relationships merged with the transaction's pending
    /// additions and removals.
    pub fn relationships_of(
        &self,
        txn: &Txn,
        node_id: NodeId,
        type_name: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<RelProxy>> {
        txn.ensure_active()?;
        if txn.change_set().is_deleted(EntityRef::Node(node_id)) {
            return Err(GraphError::not_found("Node", node_id));
        }
        let base = match self.light_node(node_id)? {
            Some(node) => {
                while node.has_more_chain() {
                    self.page_more_relationships(&node)?;
                }
                node.relationship_ids(type_name, direction)
            }
            None if self.loader.is_created(txn.id(), EntityRef::Node(node_id)) => Vec::new(),
            None => return Err(GraphError::not_found("Node", node_id)),
        };
        let merged = txn
            .change_set()
            .merged_rel_ids(node_id, type_name, direction, base);
        Ok(merged
            .into_iter()
            .map(|id| RelProxy::new(id, self.handle()))
            .collect())
    }

    // ------------------------------------------------------------------
    // writes

    fn lock_write(&self, txn: &Txn, resource: EntityRef) -> Result<()> {
        match self.lock_manager.acquire(txn.id(), resource, LockMode::Write) {
            Ok(()) => {
                txn.note_lock(resource, LockMode::Write);
                Ok(())
            }
            Err(err) => {
                txn.set_rollback_only();
                Err(err)
            }
        }
    }

    pub fn create_node(&self, txn: &Txn) -> Result<NodeProxy> {
        txn.ensure_active()?;
        let id = self.id_generator.next_id(IdKind::Node);
        let resource = EntityRef::Node(id);
        self.lock_write(txn, resource)?;
        let outcome = (|| -> Result<()> {
            self.loader.create_node(txn.id(), id)?;
            self.node_cache.put(id, Arc::new(CachedNode::new_created(id)));
            txn.change_set().record_created(resource);
            Ok(())
        })();
        match outcome {
            Ok(()) => Ok(NodeProxy::new(id, self.handle())),
            Err(err) => {
                txn.set_rollback_only();
                Err(err)
            }
        }
    }

    pub fn create_relationship(
        &self,
        txn: &Txn,
        start: NodeId,
        end: NodeId,
        type_name: &str,
    ) -> Result<RelProxy> {
        txn.ensure_active()?;
        if type_name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "relationship type name cannot be empty".into(),
            ));
        }
        let type_id = self.types.get_or_create(txn.id(), type_name)?;
        for endpoint in [start, end] {
            let gone = !self.node_present(txn, endpoint)?
                || txn.change_set().is_deleted(EntityRef::Node(endpoint));
            if gone {
                txn.set_rollback_only();
                return Err(GraphError::not_found("Node", endpoint));
            }
        }
        let rel_id = self.id_generator.next_id(IdKind::Relationship);
        // Fixed order: relationship, then smaller node id, then larger.
        self.lock_write(txn, EntityRef::Rel(rel_id))?;
        let (first, second) = (start.min(end), start.max(end));
        self.lock_write(txn, EntityRef::Node(first))?;
        if second != first {
            self.lock_write(txn, EntityRef::Node(second))?;
        }
        let outcome = (|| -> Result<()> {
            // The endpoint may have gone away while we waited for locks.
            if !self.node_present(txn, end)? {
                return Err(GraphError::not_found("Node", end));
            }
            self.loader
                .create_relationship(txn.id(), rel_id, type_id, start, end)?;
            {
                let mut change_set = txn.change_set();
                if start == end {
                    change_set.record_rel_add(start, type_name, rel_id, Direction::Both);
                } else {
                    change_set.record_rel_add(start, type_name, rel_id, Direction::Outgoing);
                    change_set.record_rel_add(end, type_name, rel_id, Direction::Incoming);
                }
                change_set.record_created(EntityRef::Rel(rel_id));
            }
            self.rel_cache.put(
                rel_id,
                Arc::new(CachedRel::new_created(rel_id, type_id, start, end)),
            );
            Ok(())
        })();
        match outcome {
            Ok(()) => Ok(RelProxy::new(rel_id, self.handle())),
            Err(err) => {
                txn.set_rollback_only();
                Err(err)
            }
        }
    }

    pub fn delete_node(&self, txn: &Txn, id: NodeId) -> Result<()> {
        txn.ensure_active()?;
        let resource = EntityRef::Node(id);
        if txn.change_set().is_deleted(resource) {
            return Err(GraphError::not_found("Node", id));
        }
        if !self.node_present(txn, id)? {
            return Err(GraphError::not_found("Node", id));
        }
        self.lock_write(txn, resource)?;
        txn.change_set().mark_deleted(resource);
        match self.loader.delete_node(txn.id(), id) {
            Ok(_properties) => {
                let manager = self.handle();
                txn.defer(move |outcome| {
                    if outcome == TxOutcome::Commit {
                        manager.references.remove_by_node(id);
                    }
                });
                Ok(())
            }
            Err(err) => {
                txn.set_rollback_only();
                Err(err)
            }
        }
    }

    pub fn delete_relationship(&self, txn: &Txn, id: RelId) -> Result<()> {
        txn.ensure_active()?;
        let resource = EntityRef::Rel(id);
        if txn.change_set().is_deleted(resource) {
            return Err(GraphError::not_found("Relationship", id));
        }
        let rel = self.light_rel(id)?;
        if rel.is_none() && !self.loader.is_created(txn.id(), resource) {
            return Err(GraphError::not_found("Relationship", id));
        }
        self.lock_write(txn, resource)?;
        {
            let mut change_set = txn.change_set();
            change_set.mark_deleted(resource);
            match &rel {
                Some(rel) => {
                    change_set.record_rel_remove(rel.start(), id);
                    if !rel.is_loop() {
                        change_set.record_rel_remove(rel.end(), id);
                    }
                }
                // Created this transaction but already shed from the
                // cache: cancel the pending endpoint additions instead.
                None => change_set.cancel_pending_rel(id),
            }
        }
        match self.loader.delete_relationship(txn.id(), id) {
            Ok(_properties) => Ok(()),
            Err(err) => {
                txn.set_rollback_only();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // properties

    fn ensure_entity_exists(&self, txn: &Txn, entity: EntityRef) -> Result<()> {
        let present = match entity {
            EntityRef::Node(id) => self.node_present(txn, id)?,
            EntityRef::Rel(id) => self.rel_present(txn, id)?,
            EntityRef::Graph => true,
        };
        if present {
            Ok(())
        } else {
            Err(GraphError::NotFound(format!("{entity:?}")))
        }
    }

    /// Committed value of a property, faulting the chain in on first
    /// access. An entity this transaction created but the cache already
    /// shed has no committed chain; its truth is the change set.
    fn base_property(
        &self,
        txn: &Txn,
        entity: EntityRef,
        key: KeyId,
    ) -> Result<Option<PropertyValue>> {
        let slot = match entity {
            EntityRef::Node(id) => match self.light_node(id)? {
                Some(node) => {
                    if !node.properties().is_loaded() {
                        // A record with no property chain has nothing to
                        // fetch.
                        let entries = match node.first_prop() {
                            Some(_) => self.loader.load_properties(entity)?,
                            None => Vec::new(),
                        };
                        node.properties().install(entries);
                    }
                    return Ok(node.properties().get(key).flatten());
                }
                None if self.loader.is_created(txn.id(), entity) => return Ok(None),
                None => return Err(GraphError::not_found("Node", id)),
            },
            EntityRef::Rel(id) => match self.light_rel(id)? {
                Some(rel) => {
                    if !rel.properties().is_loaded() {
                        rel.properties()
                            .install(self.loader.load_properties(entity)?);
                    }
                    return Ok(rel.properties().get(key).flatten());
                }
                None if self.loader.is_created(txn.id(), entity) => return Ok(None),
                None => return Err(GraphError::not_found("Relationship", id)),
            },
            EntityRef::Graph => &self.graph_props,
        };
        if !slot.is_loaded() {
            slot.install(self.loader.load_properties(entity)?);
        }
        Ok(slot.get(key).flatten())
    }

    fn property_with_overrides(
        &self,
        txn: &Txn,
        entity: EntityRef,
        key: KeyId,
    ) -> Result<Option<PropertyValue>> {
        if let Some(pending) = txn.change_set().property_override(entity, key) {
            return Ok(pending);
        }
        self.base_property(txn, entity, key)
    }

    fn read_property(
        &self,
        txn: &Txn,
        entity: EntityRef,
        key_name: &str,
    ) -> Result<Option<PropertyValue>> {
        txn.ensure_active()?;
        if txn.change_set().is_deleted(entity) {
            return Err(GraphError::NotFound(format!("{entity:?}")));
        }
        self.ensure_entity_exists(txn, entity)?;
        let Some(key) = self.keys.id_of(key_name) else {
            return Ok(None);
        };
        self.property_with_overrides(txn, entity, key)
    }

    /// Shared write path: trackers are notified before the mutation is
    /// recorded anywhere, so no reader can observe a value a tracker has
    /// not seen.
    fn write_property(
        &self,
        txn: &Txn,
        entity: EntityRef,
        trackers: Option<&Trackers>,
        key_name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        txn.ensure_active()?;
        if key_name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "property key cannot be empty".into(),
            ));
        }
        if txn.change_set().is_deleted(entity) {
            return Err(GraphError::NotFound(format!("{entity:?}")));
        }
        self.ensure_entity_exists(txn, entity)?;
        self.lock_write(txn, entity)?;
        let key = self.keys.get_or_create(txn.id(), key_name)?;
        let old = self.property_with_overrides(txn, entity, key)?;
        if let Some(trackers) = trackers {
            let observers = trackers.read().clone();
            for tracker in observers {
                let observed = match &old {
                    None => tracker.property_added(entity, key_name, &value),
                    Some(previous) => {
                        tracker.property_changed(entity, key_name, previous, &value)
                    }
                };
                if let Err(err) = observed {
                    txn.set_rollback_only();
                    return Err(err);
                }
            }
        }
        txn.change_set()
            .record_property_set(entity, key, value.clone());
        let stored = match &old {
            None => self.loader.add_property(txn.id(), entity, key, &value),
            Some(_) => self.loader.change_property(txn.id(), entity, key, &value),
        };
        if let Err(err) = stored {
            txn.set_rollback_only();
            return Err(err);
        }
        Ok(())
    }

    fn erase_property(
        &self,
        txn: &Txn,
        entity: EntityRef,
        trackers: Option<&Trackers>,
        key_name: &str,
    ) -> Result<()> {
        txn.ensure_active()?;
        if txn.change_set().is_deleted(entity) {
            return Err(GraphError::NotFound(format!("{entity:?}")));
        }
        self.ensure_entity_exists(txn, entity)?;
        let Some(key) = self.keys.id_of(key_name) else {
            return Ok(());
        };
        self.lock_write(txn, entity)?;
        let Some(old) = self.property_with_overrides(txn, entity, key)? else {
            return Ok(());
        };
        if let Some(trackers) = trackers {
            let observers = trackers.read().clone();
            for tracker in observers {
                if let Err(err) = tracker.property_removed(entity, key_name, &old) {
                    txn.set_rollback_only();
                    return Err(err);
                }
            }
        }
        txn.change_set().record_property_remove(entity, key);
        if let Err(err) = self.loader.remove_property(txn.id(), entity, key) {
            txn.set_rollback_only();
            return Err(err);
        }
        Ok(())
    }

    pub fn node_property(
        &self,
        txn: &Txn,
        id: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.read_property(txn, EntityRef::Node(id), key)
    }

    pub fn set_node_property(
        &self,
        txn: &Txn,
        id: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.write_property(
            txn,
            EntityRef::Node(id),
            Some(&self.node_trackers),
            key,
            value,
        )
    }

    pub fn remove_node_property(&self, txn: &Txn, id: NodeId, key: &str) -> Result<()> {
        self.erase_property(txn, EntityRef::Node(id), Some(&self.node_trackers), key)
    }

    pub fn rel_property(&self, txn: &Txn, id: RelId, key: &str) -> Result<Option<PropertyValue>> {
        self.read_property(txn, EntityRef::Rel(id), key)
    }

    pub fn set_rel_property(
        &self,
        txn: &Txn,
        id: RelId,
        key: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.write_property(
            txn,
            EntityRef::Rel(id),
            Some(&self.rel_trackers),
            key,
            value,
        )
    }

    pub fn remove_rel_property(&self, txn: &Txn, id: RelId, key: &str) -> Result<()> {
        self.erase_property(txn, EntityRef::Rel(id), Some(&self.rel_trackers), key)
    }

    pub fn graph_property(&self, txn: &Txn, key: &str) -> Result<Option<PropertyValue>> {
        self.read_property(txn, EntityRef::Graph, key)
    }

    pub fn set_graph_property(&self, txn: &Txn, key: &str, value: PropertyValue) -> Result<()> {
        self.write_property(txn, EntityRef::Graph, None, key, value)
    }

    pub fn remove_graph_property(&self, txn: &Txn, key: &str) -> Result<()> {
        self.erase_property(txn, EntityRef::Graph, None, key)
    }

    // ------------------------------------------------------------------
    // relationship metadata

    pub(crate) fn rel_endpoints(&self, id: RelId) -> Result<(NodeId, NodeId, TypeId)> {
        let rel = self
            .light_rel(id)?
            .ok_or_else(|| GraphError::not_found("Relationship", id))?;
        Ok((rel.start(), rel.end(), rel.type_id()))
    }

    pub(crate) fn rel_direction_from(
        &self,
        id: RelId,
        node: NodeId,
    ) -> Result<Option<Direction>> {
        let rel = self
            .light_rel(id)?
            .ok_or_else(|| GraphError::not_found("Relationship", id))?;
        Ok(rel.direction_from(node))
    }

    pub fn relationship_type_name(&self, type_id: TypeId) -> Result<String> {
        self.types
            .name_of(type_id)
            .ok_or_else(|| GraphError::not_found("RelationshipType", type_id as u64))
    }

    pub fn relationship_type_names(&self) -> Vec<String> {
        self.types.names()
    }

    // ------------------------------------------------------------------
    // reference nodes

    /// Named well-known root. The first caller for a name creates the
    /// anchor node; later callers get the same id.
    pub fn reference_node(&self, txn: &Txn, name: &str) -> Result<NodeProxy> {
        txn.ensure_active()?;
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "reference node name cannot be empty".into(),
            ));
        }
        let (node_id, created) = self.references.get_or_create(name, || {
            let proxy = self.create_node(txn)?;
            self.loader
                .create_reference_node(txn.id(), name, proxy.id())?;
            Ok(proxy.id())
        })?;
        if created {
            let manager = self.handle();
            let name = name.to_owned();
            txn.defer(move |outcome| {
                if outcome == TxOutcome::Rollback {
                    manager.references.remove(&name);
                }
            });
            // The anchor is this transaction's own uncommitted node.
            return Ok(NodeProxy::new(node_id, self.handle()));
        }
        self.get_node_by_id(node_id)
    }

    pub fn reference_node_if_exists(&self, name: &str) -> Result<Option<NodeProxy>> {
        match self.references.get(name) {
            Some(node_id) => self.get_node_or_null(node_id),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // trackers

    pub fn add_node_property_tracker(&self, tracker: Arc<dyn PropertyTracker>) {
        self.node_trackers.write().push(tracker);
    }

    pub fn remove_node_property_tracker(&self, tracker: &Arc<dyn PropertyTracker>) {
        self.node_trackers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, tracker));
    }

    pub fn add_rel_property_tracker(&self, tracker: Arc<dyn PropertyTracker>) {
        self.rel_trackers.write().push(tracker);
    }

    pub fn remove_rel_property_tracker(&self, tracker: &Arc<dyn PropertyTracker>) {
        self.rel_trackers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, tracker));
    }

    // ------------------------------------------------------------------
    // cache administration

    /// Drops a node from the cache. The store is untouched; the next read
    /// faults it back in.
    pub fn evict_node(&self, id: NodeId) {
        if self.node_cache.remove(&id).is_some() {
            self.node_metrics.record_eviction();
        }
    }

    pub fn evict_relationship(&self, id: RelId) {
        if self.rel_cache.remove(&id).is_some() {
            self.rel_metrics.record_eviction();
        }
    }

    pub fn clear_cache(&self) {
        self.node_cache.clear();
        self.rel_cache.clear();
        self.graph_props.reset();
    }

    pub fn cache_populations(&self) -> Vec<(String, usize)> {
        vec![
            (self.node_cache.name().to_owned(), self.node_cache.len()),
            (self.rel_cache.name().to_owned(), self.rel_cache.len()),
        ]
    }

    pub fn node_cache_metrics(&self) -> CacheMetricsSnapshot {
        self.node_metrics.snapshot()
    }

    pub fn rel_cache_metrics(&self) -> CacheMetricsSnapshot {
        self.rel_metrics.snapshot()
    }

    // ------------------------------------------------------------------
    // transaction completion hooks (called from Txn)

    /// Materializes committed deltas into the caches: property and
    /// relationship deltas fold into resident entries, tombstoned
    /// entities are evicted.
    pub(crate) fn apply_committed_changes(
        &self,
        deltas: std::collections::HashMap<EntityRef, EntityDelta>,
    ) {
        for (entity, delta) in deltas {
            if delta.deleted {
                match entity {
                    EntityRef::Node(id) => self.evict_node(id),
                    EntityRef::Rel(id) => self.evict_relationship(id),
                    EntityRef::Graph => self.graph_props.reset(),
                }
                continue;
            }
            match entity {
                EntityRef::Node(id) => {
                    if let Some(node) = self.node_cache.get(&id) {
                        node.properties()
                            .apply_delta(delta.property_sets, delta.property_removes);
                        let adds = delta.rel_adds.into_iter().flat_map(|(type_name, ids)| {
                            ids.tagged()
                                .into_iter()
                                .map(move |(rel, direction)| (type_name.clone(), rel, direction))
                                .collect::<Vec<_>>()
                        });
                        node.apply_rel_delta(adds, delta.rel_removes);
                    }
                }
                EntityRef::Rel(id) => {
                    if let Some(rel) = self.rel_cache.get(&id) {
                        rel.properties()
                            .apply_delta(delta.property_sets, delta.property_removes);
                    }
                }
                EntityRef::Graph => {
                    self.graph_props
                        .apply_delta(delta.property_sets, delta.property_removes);
                }
            }
        }
    }

    /// Inverse cache effects of a rollback: entities the transaction
    /// created never become visible.
    pub(crate) fn rollback_cleanup(&self, created: &[EntityRef]) {
        for entity in created {
            match entity {
                EntityRef::Node(id) => {
                    self.node_cache.remove(id);
                }
                EntityRef::Rel(id) => {
                    self.rel_cache.remove(id);
                }
                EntityRef::Graph => {}
            }
        }
    }
}

pub struct AllNodes {
    manager: Arc<EntityManager>,
    next: NodeId,
    high: NodeId,
    done: bool,
}

impl Iterator for AllNodes {
    type Item = Result<NodeProxy>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while self.next <= self.high {
            let id = self.next;
            self.next += 1;
            match self.manager.get_node_or_null(id) {
                Ok(Some(proxy)) => return Some(Ok(proxy)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

pub struct AllRelationships {
    manager: Arc<EntityManager>,
    next: RelId,
    high: RelId,
    done: bool,
}

impl Iterator for AllRelationships {
    type Item = Result<RelProxy>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while self.next <= self.high {
            let id = self.next;
            self.next += 1;
            match self.manager.get_relationship_or_null(id) {
                Ok(Some(proxy)) => return Some(Ok(proxy)),
                Ok(None) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
