//! Cached relationship state: committed record fields plus the lazily
//! faulted property chain.

use crate::entity::props::PropertySlot;
use crate::model::{Direction, NodeId, RelId, TypeId};
use crate::store::RelRecord;

#[derive(Debug)]
pub struct CachedRel {
    id: RelId,
    start: NodeId,
    end: NodeId,
    type_id: TypeId,
    properties: PropertySlot,
}

impl CachedRel {
    /// A relationship created by the running transaction.
    pub fn new_created(id: RelId, type_id: TypeId, start: NodeId, end: NodeId) -> Self {
        Self {
            id,
            start,
            end,
            type_id,
            properties: PropertySlot::loaded_empty(),
        }
    }

    pub fn new_light(record: RelRecord) -> Self {
        Self {
            id: record.id,
            start: record.start,
            end: record.end,
            type_id: record.type_id,
            properties: PropertySlot::default(),
        }
    }

    pub fn id(&self) -> RelId {
        self.id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    pub fn properties(&self) -> &PropertySlot {
        &self.properties
    }

    /// Direction of this relationship as seen from `node`, `None` when
    /// the node is not an endpoint.
    pub fn direction_from(&self, node: NodeId) -> Option<Direction> {
        if self.is_loop() {
            (self.start == node).then_some(Direction::Both)
        } else if self.start == node {
            Some(Direction::Outgoing)
        } else if self.end == node {
            Some(Direction::Incoming)
        } else {
            None
        }
    }

    /// The endpoint opposite `node`; for loops that is the node itself.
    pub fn other_end(&self, node: NodeId) -> Option<NodeId> {
        if self.start == node {
            Some(self.end)
        } else if self.end == node {
            Some(self.start)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_from_endpoints() {
        let rel = CachedRel::new_created(1, 0, 10, 20);
        assert_eq!(rel.direction_from(10), Some(Direction::Outgoing));
        assert_eq!(rel.direction_from(20), Some(Direction::Incoming));
        assert_eq!(rel.direction_from(30), None);
        assert_eq!(rel.other_end(10), Some(20));
        assert_eq!(rel.other_end(30), None);
    }

    #[test]
    fn loops_report_both_once() {
        let rel = CachedRel::new_created(1, 0, 7, 7);
        assert!(rel.is_loop());
        assert_eq!(rel.direction_from(7), Some(Direction::Both));
        assert_eq!(rel.other_end(7), Some(7));
    }
}
