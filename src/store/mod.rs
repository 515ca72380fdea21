//! The record-store boundary. The entity layer never touches record files
//! directly; it consumes a [`RecordLoader`] and caches what comes back.

mod mem;

pub use mem::MemoryRecordStore;

use crate::error::Result;
use crate::model::{EntityRef, IdKind, KeyId, NodeId, PropertyValue, RelId, TxId, TypeId};

/// Core fields of a node record, committed values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub first_rel: Option<RelId>,
    pub first_prop: Option<u64>,
}

/// Core fields of a relationship record, committed values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelRecord {
    pub id: RelId,
    pub start: NodeId,
    pub end: NodeId,
    pub type_id: TypeId,
    pub first_prop: Option<u64>,
}

impl RelRecord {
    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub key: KeyId,
    pub value: PropertyValue,
}

/// One page of a node's relationship chain, split by direction relative to
/// the node. Self-loops arrive only in `loops`.
#[derive(Debug, Clone, Default)]
pub struct RelChainBatch {
    pub outgoing: Vec<RelRecord>,
    pub incoming: Vec<RelRecord>,
    pub loops: Vec<RelRecord>,
    /// Cursor for the next page, `None` once the chain is exhausted.
    pub next: Option<u64>,
}

impl RelChainBatch {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty() && self.loops.is_empty()
    }
}

/// The durable record store, as consumed by the entity layer.
///
/// Readers return committed state only; uncommitted work is visible to its
/// transaction through the change set, not through the loader. Mutations
/// are tagged with the owning transaction and take effect at `commit_tx`;
/// `rollback_tx` discards them.
pub trait RecordLoader: Send + Sync {
    fn load_light_node(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    fn load_light_relationship(&self, id: RelId) -> Result<Option<RelRecord>>;

    /// Fetches the next page of `node`'s relationship chain starting at
    /// `position` (an opaque cursor; `0` is the chain head).
    fn more_relationships(&self, node: NodeId, position: u64) -> Result<RelChainBatch>;

    /// Loads the committed property chain of an entity.
    fn load_properties(&self, entity: EntityRef) -> Result<Vec<PropertyEntry>>;

    fn create_node(&self, tx: TxId, id: NodeId) -> Result<()>;

    fn create_relationship(
        &self,
        tx: TxId,
        id: RelId,
        type_id: TypeId,
        start: NodeId,
        end: NodeId,
    ) -> Result<()>;

    /// Tombstones a node. Returns the committed properties it carried.
    fn delete_node(&self, tx: TxId, id: NodeId) -> Result<Vec<PropertyEntry>>;

    /// Tombstones a relationship. Returns the committed properties it carried.
    fn delete_relationship(&self, tx: TxId, id: RelId) -> Result<Vec<PropertyEntry>>;

    fn add_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()>;

    fn change_property(
        &self,
        tx: TxId,
        entity: EntityRef,
        key: KeyId,
        value: &PropertyValue,
    ) -> Result<()>;

    fn remove_property(&self, tx: TxId, entity: EntityRef, key: KeyId) -> Result<()>;

    fn create_relationship_type(&self, tx: TxId, id: TypeId, name: &str) -> Result<()>;

    fn create_property_key(&self, tx: TxId, id: KeyId, name: &str) -> Result<()>;

    fn create_reference_node(&self, tx: TxId, name: &str, node: NodeId) -> Result<()>;

    /// Name registries committed by earlier transactions, replayed into the
    /// in-memory holders at startup.
    fn committed_relationship_types(&self) -> Vec<(TypeId, String)>;

    fn committed_property_keys(&self) -> Vec<(KeyId, String)>;

    fn committed_reference_nodes(&self) -> Vec<(String, NodeId)>;

    fn highest_id_in_use(&self, kind: IdKind) -> u64;

    /// Whether `entity` was created by the given in-flight transaction.
    fn is_created(&self, tx: TxId, entity: EntityRef) -> bool;

    fn commit_tx(&self, tx: TxId) -> Result<()>;

    fn rollback_tx(&self, tx: TxId) -> Result<()>;
}
