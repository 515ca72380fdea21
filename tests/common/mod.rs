//! Shared test support: a record loader that counts store traffic.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use sable::model::{EntityRef, IdKind, KeyId, NodeId, PropertyValue, RelId, TxId, TypeId};
use sable::store::{MemoryRecordStore, NodeRecord, PropertyEntry, RecordLoader, RelChainBatch, RelRecord};
use sable::Result;

/// Delegates to a [`MemoryRecordStore`] while counting the calls the
/// entity layer makes, per node id where it matters.
#[derive(Default)]
pub struct CountingLoader {
    inner: MemoryRecordStore,
    node_loads: Mutex<HashMap<NodeId, usize>>,
    rel_loads: Mutex<HashMap<RelId, usize>>,
    property_loads: Mutex<HashMap<EntityRef, usize>>,
    node_creates: AtomicUsize,
    reference_creates: AtomicUsize,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grab_size(grab_size: usize) -> Self {
        Self {
            inner: MemoryRecordStore::with_grab_size(grab_size),
            ..Self::default()
        }
    }

    pub fn node_load_count(&self, id: NodeId) -> usize {
        self.node_loads.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn rel_load_count(&self, id: RelId) -> usize {
        self.rel_loads.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn property_load_count(&self, entity: EntityRef) -> usize {
        self.property_loads.lock().get(&entity).copied().unwrap_or(0)
    }

    pub fn node_create_count(&self) -> usize {
        self.node_creates.load(Ordering::SeqCst)
    }

    pub fn reference_create_count(&self) -> usize {
        self.reference_creates.load(Ordering::SeqCst)
    }
}

impl RecordLoader for CountingLoader {
    fn load_light_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        *self.node_loads.lock().entry(id).or_insert(0) += 1;
        self.inner.load_light_node(id)
    }

    fn load_light_relationship(&self, id: RelId) -> Result<Option<RelRecord>> {
        *self.rel_loads.lock().entry(id).or_insert(0) += 1;
        self.inner.load_light_relationship(id)
    }

    fn more_relationships(&self, node: NodeId, position: u64) -> Result<RelChainBatch> {
        self.inner.more_relationships(node, position)
    }

    fn load_properties(&self, entity: EntityRef) -> Result<Vec<PropertyEntry>> {
        *self.property_loads.lock().entry(entity).or_insert(0) += 1;
        self.inner.load_properties(entity)
    }

    fn create_node(&self, tx: TxId, id: NodeId) -> Result<()> {
        self.node_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_node(tx, id)
    }

    fn create_relationship(
        &self,
        tx: TxId,
        id: RelId,
        type_id: TypeId,
        start: NodeId,
        end: NodeId,
    ) -> Result<()> {
        self.inner.create_relationship(tx, id, type_id, start, end)
    }

    fn delete_node(&self, tx: TxId, id: NodeId) -> Result<Vec<PropertyEntry>> {
        self.inner.delete_node(tx, id)
    }

    fn delete_relationship(&self, tx: TxId, id: RelId) -> Result<Vec<PropertyEntry>> {
        self.inner.delete_relationship(tx, id)
    }

    fn add_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()> {
        self.inner.add_property(tx, entity, key, value)
    }

    fn change_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()> {
        self.inner.change_property(tx, entity, key, value)
    }

    fn remove_property(&self, tx: TxId, entity: EntityRef, key: KeyId) -> Result<()> {
        self.inner.remove_property(tx, entity, key)
    }

    fn create_relationship_type(&self, tx: TxId, id: TypeId, name: &str) -> Result<()> {
        self.inner.create_relationship_type(tx, id, name)
    }

    fn create_property_key(&self, tx: TxId, id: KeyId, name: &str) -> Result<()> {
        self.inner.create_property_key(tx, id, name)
    }

    fn create_reference_node(&self, tx: TxId, name: &str, node: NodeId) -> Result<()> {
        self.reference_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_reference_node(tx, name, node)
    }

    fn committed_relationship_types(&self) -> Vec<(TypeId, String)> {
        self.inner.committed_relationship_types()
    }

    fn committed_property_keys(&self) -> Vec<(KeyId, String)> {
        self.inner.committed_property_keys()
    }

    fn committed_reference_nodes(&self) -> Vec<(String, NodeId)> {
        self.inner.committed_reference_nodes()
    }

    fn highest_id_in_use(&self, kind: IdKind) -> u64 {
        self.inner.highest_id_in_use(kind)
    }

    fn is_created(&self, tx: TxId, entity: EntityRef) -> bool {
        self.inner.is_created(tx, entity)
    }

    fn commit_tx(&self, tx: TxId) -> Result<()> {
        self.inner.commit_tx(tx)
    }

    fn rollback_tx(&self, tx: TxId) -> Result<()> {
        self.inner.rollback_tx(tx)
    }
}
