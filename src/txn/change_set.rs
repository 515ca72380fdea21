//! Per-transaction copy-on-write side maps. Pending mutations live here
//! until commit; every read inside the transaction merges these deltas
//! over the cached base state, so uncommitted work is visible only to its
//! owner.

use std::collections::{HashMap, HashSet};

use crate::entity::rel_ids::RelIdArray;
use crate::model::{Direction, EntityRef, KeyId, NodeId, PropertyValue, RelId};

#[derive(Debug, Default)]
pub struct EntityDelta {
    pub property_sets: HashMap<KeyId, PropertyValue>,
    pub property_removes: HashSet<KeyId>,
    /// Pending relationship additions, keyed by type name and tagged with
    /// the direction they will occupy on this node.
    pub rel_adds: HashMap<String, RelIdArray>,
    pub rel_removes: HashSet<RelId>,
    pub deleted: bool,
}

impl EntityDelta {
    fn is_noop(&self) -> bool {
        !self.deleted
            && self.property_sets.is_empty()
            && self.property_removes.is_empty()
            && self.rel_adds.is_empty()
            && self.rel_removes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TransactionChangeSet {
    entities: HashMap<EntityRef, EntityDelta>,
    /// Entities created by this transaction, in creation order. Rollback
    /// evicts them from the caches.
    created: Vec<EntityRef>,
}

impl TransactionChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn delta_mut(&mut self, entity: EntityRef) -> &mut EntityDelta {
        self.entities.entry(entity).or_default()
    }

    pub fn record_created(&mut self, entity: EntityRef) {
        self.created.push(entity);
    }

    pub fn record_property_set(&mut self, entity: EntityRef, key: KeyId, value: PropertyValue) {
        let delta = self.delta_mut(entity);
        delta.property_removes.remove(&key);
        delta.property_sets.insert(key, value);
    }

    pub fn record_property_remove(&mut self, entity: EntityRef, key: KeyId) {
        let delta = self.delta_mut(entity);
        delta.property_sets.remove(&key);
        delta.property_removes.insert(key);
    }

    pub fn record_rel_add(
        &mut self,
        node: NodeId,
        type_name: &str,
        rel: RelId,
        direction: Direction,
    ) {
        self.delta_mut(EntityRef::Node(node))
            .rel_adds
            .entry(type_name.to_owned())
            .or_insert_with(RelIdArray::new)
            .add(rel, direction);
    }

    pub fn record_rel_remove(&mut self, node: NodeId, rel: RelId) {
        let delta = self.delta_mut(EntityRef::Node(node));
        for ids in delta.rel_adds.values_mut() {
            if ids.remove(rel) {
                return;
            }
        }
        delta.rel_removes.insert(rel);
    }

    /// Cancels a pending relationship addition wherever it was recorded
    /// (both endpoints), for deletes whose endpoints are no longer
    /// resident.
    pub fn cancel_pending_rel(&mut self, rel: RelId) {
        for delta in self.entities.values_mut() {
            for ids in delta.rel_adds.values_mut() {
                ids.remove(rel);
            }
        }
    }

    pub fn mark_deleted(&mut self, entity: EntityRef) {
        self.delta_mut(entity).deleted = true;
    }

    pub fn is_deleted(&self, entity: EntityRef) -> bool {
        self.entities
            .get(&entity)
            .map(|delta| delta.deleted)
            .unwrap_or(false)
    }

    pub fn is_touched(&self, entity: EntityRef) -> bool {
        self.entities
            .get(&entity)
            .map(|delta| !delta.is_noop())
            .unwrap_or(false)
    }

    /// Pending value for a property. `None`: no override. `Some(None)`:
    /// pending removal. `Some(Some(v))`: pending write.
    pub fn property_override(
        &self,
        entity: EntityRef,
        key: KeyId,
    ) -> Option<Option<PropertyValue>> {
        let delta = self.entities.get(&entity)?;
        if let Some(value) = delta.property_sets.get(&key) {
            return Some(Some(value.clone()));
        }
        if delta.property_removes.contains(&key) {
            return Some(None);
        }
        None
    }

    /// Merges the node's pending relationship delta over `base` ids.
    /// Additions keep their recorded order; removed ids disappear.
    pub fn merged_rel_ids(
        &self,
        node: NodeId,
        type_name: Option<&str>,
        direction: Direction,
        base: Vec<RelId>,
    ) -> Vec<RelId> {
        let Some(delta) = self.entities.get(&EntityRef::Node(node)) else {
            return base;
        };
        let mut merged: Vec<RelId> = base
            .into_iter()
            .filter(|rel| !delta.rel_removes.contains(rel))
            .collect();
        let pending = delta
            .rel_adds
            .iter()
            .filter(|(name, _)| type_name.map_or(true, |wanted| wanted == name.as_str()))
            .flat_map(|(_, ids)| ids.iter(direction));
        for rel in pending {
            if !merged.contains(&rel) {
                merged.push(rel);
            }
        }
        merged
    }

    pub fn created(&self) -> &[EntityRef] {
        &self.created
    }

    /// Hands the deltas over for commit-time materialization.
    pub fn take_deltas(&mut self) -> HashMap<EntityRef, EntityDelta> {
        std::mem::take(&mut self.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: EntityRef = EntityRef::Node(1);

    #[test]
    fn set_then_remove_leaves_a_removal() {
        let mut cs = TransactionChangeSet::new();
        cs.record_property_set(NODE, 1, PropertyValue::Int(1));
        cs.record_property_remove(NODE, 1);
        assert_eq!(cs.property_override(NODE, 1), Some(None));

        cs.record_property_set(NODE, 1, PropertyValue::Int(2));
        assert_eq!(
            cs.property_override(NODE, 1),
            Some(Some(PropertyValue::Int(2)))
        );
        assert_eq!(cs.property_override(NODE, 2), None);
    }

    #[test]
    fn rel_merge_applies_adds_and_removes() {
        let mut cs = TransactionChangeSet::new();
        cs.record_rel_add(1, "KNOWS", 10, Direction::Outgoing);
        cs.record_rel_add(1, "LIKES", 11, Direction::Incoming);
        cs.record_rel_remove(1, 5);

        let merged = cs.merged_rel_ids(1, None, Direction::Both, vec![5, 6]);
        assert_eq!(merged, vec![6, 10, 11]);

        let knows_only = cs.merged_rel_ids(1, Some("KNOWS"), Direction::Both, vec![]);
        assert_eq!(knows_only, vec![10]);

        let incoming = cs.merged_rel_ids(1, None, Direction::Incoming, vec![]);
        assert_eq!(incoming, vec![11]);
    }

    #[test]
    fn removing_a_pending_add_cancels_it() {
        let mut cs = TransactionChangeSet::new();
        cs.record_rel_add(1, "KNOWS", 10, Direction::Outgoing);
        cs.record_rel_remove(1, 10);
        assert!(cs
            .merged_rel_ids(1, None, Direction::Both, vec![])
            .is_empty());
        // The cancel must not tombstone a committed id.
        assert_eq!(cs.merged_rel_ids(1, None, Direction::Both, vec![10]), vec![10]);
    }

    #[test]
    fn tombstone_and_touched_state() {
        let mut cs = TransactionChangeSet::new();
        assert!(!cs.is_touched(NODE));
        cs.mark_deleted(NODE);
        assert!(cs.is_deleted(NODE));
        assert!(cs.is_touched(NODE));
    }

    #[test]
    fn take_deltas_drains_but_keeps_created_list() {
        let mut cs = TransactionChangeSet::new();
        cs.record_created(NODE);
        cs.record_property_set(NODE, 1, PropertyValue::Bool(true));
        let deltas = cs.take_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(cs.created(), &[NODE]);
        assert_eq!(cs.property_override(NODE, 1), None);
    }
}
