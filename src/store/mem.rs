//! In-memory record store: the embedded default and the test double.
//! Mutations accumulate per transaction and publish at commit; readers
//! observe committed state only.

use std::collections::{BTreeMap, HashMap, HashSet};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{GraphError, Result};
use crate::model::{EntityRef, IdKind, KeyId, NodeId, PropertyValue, RelId, TxId, TypeId};
use crate::store::{NodeRecord, PropertyEntry, RecordLoader, RelChainBatch, RelRecord};

pub const DEFAULT_RELATIONSHIP_GRAB_SIZE: usize = 100;

#[derive(Debug)]
enum Op {
    CreateNode(NodeId),
    CreateRel(RelRecord),
    DeleteNode(NodeId),
    DeleteRel(RelId),
    SetProp(EntityRef, KeyId, PropertyValue),
    RemoveProp(EntityRef, KeyId),
    CreateType(TypeId, String),
    CreateKey(KeyId, String),
    CreateRef(String, NodeId),
}

#[derive(Debug, Default)]
struct TxDelta {
    ops: Vec<Op>,
    created: HashSet<EntityRef>,
}

#[derive(Debug, Default)]
struct Committed {
    nodes: HashMap<NodeId, NodeSlot>,
    rels: HashMap<RelId, RelRecord>,
    /// Relationship chains per node, both directions interleaved in
    /// insertion order. Paging slices this list.
    chains: HashMap<NodeId, Vec<RelId>>,
    props: HashMap<EntityRef, BTreeMap<KeyId, PropertyValue>>,
    types: BTreeMap<TypeId, String>,
    keys: BTreeMap<KeyId, String>,
    references: BTreeMap<String, NodeId>,
    next_prop_token: u64,
    highest_node: Option<u64>,
    highest_rel: Option<u64>,
    highest_type: Option<u64>,
    highest_key: Option<u64>,
}

#[derive(Debug, Default)]
struct NodeSlot {
    first_prop: Option<u64>,
}

pub struct MemoryRecordStore {
    committed: RwLock<Committed>,
    pending: DashMap<TxId, TxDelta>,
    grab_size: usize,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_grab_size(DEFAULT_RELATIONSHIP_GRAB_SIZE)
    }

    /// `grab_size` bounds how many relationship records one chain page
    /// carries. Small sizes force multi-page faulting in tests.
    pub fn with_grab_size(grab_size: usize) -> Self {
        Self {
            committed: RwLock::new(Committed::default()),
            pending: DashMap::new(),
            grab_size: grab_size.max(1),
        }
    }

    fn record(&self, tx: TxId, op: Op) {
        let mut delta = self.pending.entry(tx).or_default();
        if let Some(created) = match &op {
            Op::CreateNode(id) => Some(EntityRef::Node(*id)),
            Op::CreateRel(rec) => Some(EntityRef::Rel(rec.id)),
            _ => None,
        } {
            delta.created.insert(created);
        }
        delta.ops.push(op);
    }
}

impl RecordLoader for MemoryRecordStore {
    fn load_light_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        let committed = self.committed.read();
        Ok(committed.nodes.get(&id).map(|slot| NodeRecord {
            id,
            first_rel: committed
                .chains
                .get(&id)
                .and_then(|chain| chain.first().copied()),
            first_prop: slot.first_prop,
        }))
    }

    fn load_light_relationship(&self, id: RelId) -> Result<Option<RelRecord>> {
        Ok(self.committed.read().rels.get(&id).copied())
    }

    fn more_relationships(&self, node: NodeId, position: u64) -> Result<RelChainBatch> {
        let committed = self.committed.read();
        let mut batch = RelChainBatch::default();
        let Some(chain) = committed.chains.get(&node) else {
            return Ok(batch);
        };
        let start = position as usize;
        let end = (start + self.grab_size).min(chain.len());
        for rel_id in &chain[start..end] {
            let rec = *committed.rels.get(rel_id).ok_or_else(|| {
                GraphError::Corruption(format!("chain of node {node} references missing relationship {rel_id}"))
            })?;
            if rec.is_loop() {
                batch.loops.push(rec);
            } else if rec.start == node {
                batch.outgoing.push(rec);
            } else {
                batch.incoming.push(rec);
            }
        }
        batch.next = (end < chain.len()).then_some(end as u64);
        Ok(batch)
    }

    fn load_properties(&self, entity: EntityRef) -> Result<Vec<PropertyEntry>> {
        Ok(self
            .committed
            .read()
            .props
            .get(&entity)
            .map(|map| {
                map.iter()
                    .map(|(&key, value)| PropertyEntry {
                        key,
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_node(&self, tx: TxId, id: NodeId) -> Result<()> {
        self.record(tx, Op::CreateNode(id));
        Ok(())
    }

    fn create_relationship(
        &self,
        tx: TxId,
        id: RelId,
        type_id: TypeId,
        start: NodeId,
        end: NodeId,
    ) -> Result<()> {
        self.record(
            tx,
            Op::CreateRel(RelRecord {
                id,
                start,
                end,
                type_id,
                first_prop: None,
            }),
        );
        Ok(())
    }

    fn delete_node(&self, tx: TxId, id: NodeId) -> Result<Vec<PropertyEntry>> {
        let properties = self.load_properties(EntityRef::Node(id))?;
        self.record(tx, Op::DeleteNode(id));
        Ok(properties)
    }

    fn delete_relationship(&self, tx: TxId, id: RelId) -> Result<Vec<PropertyEntry>> {
        let properties = self.load_properties(EntityRef::Rel(id))?;
        self.record(tx, Op::DeleteRel(id));
        Ok(properties)
    }

    fn add_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()> {
        self.record(tx, Op::SetProp(entity, key, value.clone()));
        Ok(())
    }

    fn change_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()> {
        self.record(tx, Op::SetProp(entity, key, value.clone()));
        Ok(())
    }

    fn remove_property(&self, tx: TxId, entity: EntityRef, key: KeyId) -> Result<()> {
        self.record(tx, Op::RemoveProp(entity, key));
        Ok(())
    }

    fn create_relationship_type(&self, tx: TxId, id: TypeId, name: &str) -> Result<()> {
        self.record(tx, Op::CreateType(id, name.to_owned()));
        Ok(())
    }

    fn create_property_key(&self, tx: TxId, id: KeyId, name: &str) -> Result<()> {
        self.record(tx, Op::CreateKey(id, name.to_owned()));
        Ok(())
    }

    fn create_reference_node(&self, tx: TxId, name: &str, node: NodeId) -> Result<()> {
        self.record(tx, Op::CreateRef(name.to_owned(), node));
        Ok(())
    }

    fn committed_relationship_types(&self) -> Vec<(TypeId, String)> {
        self.committed
            .read()
            .types
            .iter()
            .map(|(&id, name)| (id, name.clone()))
            .collect()
    }

    fn committed_property_keys(&self) -> Vec<(KeyId, String)> {
        self.committed
            .read()
            .keys
            .iter()
            .map(|(&id, name)| (id, name.clone()))
            .collect()
    }

    fn committed_reference_nodes(&self) -> Vec<(String, NodeId)> {
        self.committed
            .read()
            .references
            .iter()
            .map(|(name, &node)| (name.clone(), node))
            .collect()
    }

    fn highest_id_in_use(&self, kind: IdKind) -> u64 {
        let committed = self.committed.read();
        match kind {
            IdKind::Node => committed.highest_node,
            IdKind::Relationship => committed.highest_rel,
            IdKind::RelationshipType => committed.highest_type,
            IdKind::PropertyKey => committed.highest_key,
        }
        .unwrap_or(0)
    }

    fn is_created(&self, tx: TxId, entity: EntityRef) -> bool {
        self.pending
            .get(&tx)
            .map(|delta| delta.created.contains(&entity))
            .unwrap_or(false)
    }

    fn commit_tx(&self, tx: TxId) -> Result<()> {
        let Some((_, delta)) = self.pending.remove(&tx) else {
            return Ok(());
        };
        let mut committed = self.committed.write();
        for op in delta.ops {
            committed.apply(op)?;
        }
        Ok(())
    }

    fn rollback_tx(&self, tx: TxId) -> Result<()> {
        self.pending.remove(&tx);
        Ok(())
    }
}

impl Committed {
    fn apply(&mut self, op: Op) -> Result<()> {
        match op {
            Op::CreateNode(id) => {
                if self.nodes.insert(id, NodeSlot::default()).is_some() {
                    return Err(GraphError::Corruption(format!("node {id} created twice")));
                }
                self.highest_node = Some(self.highest_node.map_or(id, |h| h.max(id)));
            }
            Op::CreateRel(rec) => {
                if self.rels.insert(rec.id, rec).is_some() {
                    return Err(GraphError::Corruption(format!(
                        "relationship {} created twice",
                        rec.id
                    )));
                }
                self.chains.entry(rec.start).or_default().push(rec.id);
                if !rec.is_loop() {
                    self.chains.entry(rec.end).or_default().push(rec.id);
                }
                self.highest_rel = Some(self.highest_rel.map_or(rec.id, |h| h.max(rec.id)));
            }
            Op::DeleteNode(id) => {
                self.nodes.remove(&id);
                self.chains.remove(&id);
                self.props.remove(&EntityRef::Node(id));
                self.references.retain(|_, &mut target| target != id);
            }
            Op::DeleteRel(id) => {
                if let Some(rec) = self.rels.remove(&id) {
                    for endpoint in [rec.start, rec.end] {
                        if let Some(chain) = self.chains.get_mut(&endpoint) {
                            chain.retain(|&r| r != id);
                        }
                    }
                    self.props.remove(&EntityRef::Rel(id));
                }
            }
            Op::SetProp(entity, key, value) => {
                self.props.entry(entity).or_default().insert(key, value);
                if let EntityRef::Node(id) = entity {
                    let token = self.next_prop_token;
                    if let Some(slot) = self.nodes.get_mut(&id) {
                        if slot.first_prop.is_none() {
                            slot.first_prop = Some(token);
                            self.next_prop_token += 1;
                        }
                    }
                }
            }
            Op::RemoveProp(entity, key) => {
                if let Some(map) = self.props.get_mut(&entity) {
                    map.remove(&key);
                    if map.is_empty() {
                        self.props.remove(&entity);
                        if let EntityRef::Node(id) = entity {
                            if let Some(slot) = self.nodes.get_mut(&id) {
                                slot.first_prop = None;
                            }
                        }
                    }
                }
            }
            Op::CreateType(id, name) => {
                self.types.insert(id, name);
                self.highest_type = Some(self.highest_type.map_or(id as u64, |h| h.max(id as u64)));
            }
            Op::CreateKey(id, name) => {
                self.keys.insert(id, name);
                self.highest_key = Some(self.highest_key.map_or(id as u64, |h| h.max(id as u64)));
            }
            Op::CreateRef(name, node) => {
                self.references.insert(name, node);
            }
        }
        Ok(())
    }
}
