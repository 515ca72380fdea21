//! Proxy handles. A proxy is an id plus a shared reference to the
//! manager; it owns no entity state and faults data in on access. Two
//! proxies are equal when they name the same entity.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::manager::EntityManager;
use crate::model::{Direction, NodeId, PropertyValue, RelId};
use crate::txn::Txn;

#[derive(Clone)]
pub struct NodeProxy {
    id: NodeId,
    manager: Arc<EntityManager>,
}

impl NodeProxy {
    pub(crate) fn new(id: NodeId, manager: Arc<EntityManager>) -> Self {
        Self { id, manager }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn property(&self, txn: &Txn, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.node_property(txn, self.id, key)
    }

    pub fn set_property(&self, txn: &Txn, key: &str, value: PropertyValue) -> Result<()> {
        self.manager.set_node_property(txn, self.id, key, value)
    }

    pub fn remove_property(&self, txn: &Txn, key: &str) -> Result<()> {
        self.manager.remove_node_property(txn, self.id, key)
    }

    pub fn relationships(&self, txn: &Txn) -> Result<Vec<RelProxy>> {
        self.manager
            .relationships_of(txn, self.id, None, Direction::Both)
    }

    pub fn relationships_of_type(
        &self,
        txn: &Txn,
        type_name: &str,
        direction: Direction,
    ) -> Result<Vec<RelProxy>> {
        self.manager
            .relationships_of(txn, self.id, Some(type_name), direction)
    }

    pub fn create_relationship_to(
        &self,
        txn: &Txn,
        other: &NodeProxy,
        type_name: &str,
    ) -> Result<RelProxy> {
        self.manager
            .create_relationship(txn, self.id, other.id, type_name)
    }

    pub fn delete(&self, txn: &Txn) -> Result<()> {
        self.manager.delete_node(txn, self.id)
    }
}

impl PartialEq for NodeProxy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeProxy {}

impl fmt::Debug for NodeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeProxy").field(&self.id).finish()
    }
}

#[derive(Clone)]
pub struct RelProxy {
    id: RelId,
    manager: Arc<EntityManager>,
}

impl RelProxy {
    pub(crate) fn new(id: RelId, manager: Arc<EntityManager>) -> Self {
        Self { id, manager }
    }

    pub fn id(&self) -> RelId {
        self.id
    }

    pub fn start_node(&self) -> Result<NodeProxy> {
        let (start, _, _) = self.manager.rel_endpoints(self.id)?;
        Ok(NodeProxy::new(start, Arc::clone(&self.manager)))
    }

    pub fn end_node(&self) -> Result<NodeProxy> {
        let (_, end, _) = self.manager.rel_endpoints(self.id)?;
        Ok(NodeProxy::new(end, Arc::clone(&self.manager)))
    }

    /// The endpoint opposite `node`; a loop's other node is itself.
    pub fn other_node(&self, node: &NodeProxy) -> Result<NodeProxy> {
        let (start, end, _) = self.manager.rel_endpoints(self.id)?;
        let other = if start == node.id() { end } else { start };
        Ok(NodeProxy::new(other, Arc::clone(&self.manager)))
    }

    pub fn type_name(&self) -> Result<String> {
        let (_, _, type_id) = self.manager.rel_endpoints(self.id)?;
        self.manager.relationship_type_name(type_id)
    }

    /// Direction of this relationship as seen from `node`.
    pub fn direction_from(&self, node: &NodeProxy) -> Result<Option<Direction>> {
        self.manager.rel_direction_from(self.id, node.id())
    }

    pub fn property(&self, txn: &Txn, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.rel_property(txn, self.id, key)
    }

    pub fn set_property(&self, txn: &Txn, key: &str, value: PropertyValue) -> Result<()> {
        self.manager.set_rel_property(txn, self.id, key, value)
    }

    pub fn remove_property(&self, txn: &Txn, key: &str) -> Result<()> {
        self.manager.remove_rel_property(txn, self.id, key)
    }

    pub fn delete(&self, txn: &Txn) -> Result<()> {
        self.manager.delete_relationship(txn, self.id)
    }
}

impl PartialEq for RelProxy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RelProxy {}

impl fmt::Debug for RelProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelProxy").field(&self.id).finish()
    }
}
