//! Cached node state: committed record fields plus the lazily paged
//! relationship map and property chain.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::entity::props::PropertySlot;
use crate::entity::rel_ids::RelIdArray;
use crate::model::{Direction, NodeId, RelId};
use crate::store::NodeRecord;

/// Cursor state of the node's on-disk relationship chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    /// Nothing paged in yet; the next fetch starts at the chain head.
    Unstarted,
    /// More pages remain, next fetch resumes here.
    At(u64),
    /// The whole chain is in memory.
    Exhausted,
}

impl Default for ChainPosition {
    fn default() -> Self {
        ChainPosition::Unstarted
    }
}

#[derive(Debug, Default)]
struct RelState {
    map: HashMap<String, RelIdArray>,
    position: ChainPosition,
}

#[derive(Debug)]
pub struct CachedNode {
    id: NodeId,
    first_rel: Option<RelId>,
    first_prop: Option<u64>,
    properties: PropertySlot,
    rels: RwLock<RelState>,
}

impl CachedNode {
    /// A node created by the running transaction: fully loaded, nothing
    /// on disk to page in.
    pub fn new_created(id: NodeId) -> Self {
        Self {
            id,
            first_rel: None,
            first_prop: None,
            properties: PropertySlot::loaded_empty(),
            rels: RwLock::new(RelState {
                map: HashMap::new(),
                position: ChainPosition::Exhausted,
            }),
        }
    }

    /// A node materialized from its committed record. Chains fault in on
    /// demand.
    pub fn new_light(record: NodeRecord) -> Self {
        let position = if record.first_rel.is_some() {
            ChainPosition::Unstarted
        } else {
            ChainPosition::Exhausted
        };
        Self {
            id: record.id,
            first_rel: record.first_rel,
            first_prop: record.first_prop,
            properties: PropertySlot::default(),
            rels: RwLock::new(RelState {
                map: HashMap::new(),
                position,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn first_rel(&self) -> Option<RelId> {
        self.first_rel
    }

    pub fn first_prop(&self) -> Option<u64> {
        self.first_prop
    }

    pub fn properties(&self) -> &PropertySlot {
        &self.properties
    }

    pub fn chain_position(&self) -> ChainPosition {
        self.rels.read().position
    }

    pub fn has_more_chain(&self) -> bool {
        !matches!(self.chain_position(), ChainPosition::Exhausted)
    }

    /// Atomically merges one locally materialized chain page into the
    /// node. Readers between merges see a consistent, monotonically
    /// growing map.
    pub fn merge_chain_page(&self, page: HashMap<String, RelIdArray>, next: Option<u64>) {
        let mut state = self.rels.write();
        for (type_name, additions) in page {
            state
                .map
                .entry(type_name)
                .or_insert_with(RelIdArray::new)
                .merge(additions);
        }
        state.position = match next {
            Some(position) => ChainPosition::At(position),
            None => ChainPosition::Exhausted,
        };
    }

    /// Committed relationship ids visible from this node, optionally
    /// narrowed to one type.
    pub fn relationship_ids(&self, type_name: Option<&str>, direction: Direction) -> Vec<RelId> {
        let state = self.rels.read();
        match type_name {
            Some(name) => state
                .map
                .get(name)
                .map(|ids| ids.iter(direction).collect())
                .unwrap_or_default(),
            None => state
                .map
                .values()
                .flat_map(|ids| ids.iter(direction).collect::<Vec<_>>())
                .collect(),
        }
    }

    /// Folds a committed relationship delta into the map (commit-time
    /// materialization of the transaction's change set).
    pub fn apply_rel_delta(
        &self,
        adds: impl IntoIterator<Item = (String, RelId, Direction)>,
        removes: impl IntoIterator<Item = RelId>,
    ) {
        let mut state = self.rels.write();
        for (type_name, rel, direction) in adds {
            let ids = state.map.entry(type_name).or_insert_with(RelIdArray::new);
            // A racing chain page may have delivered this id already.
            if !ids.contains(rel) {
                ids.add(rel, direction);
            }
        }
        for rel in removes {
            for ids in state.map.values_mut() {
                if ids.remove(rel) {
                    break;
                }
            }
        }
    }
}
