//! Process-wide name registries: relationship types, property keys and
//! named reference nodes. Entries are created lazily under a single
//! writer and never evicted; reads are lock-free after first publication.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::ids::IdGenerator;
use crate::model::{IdKind, KeyId, NodeId, TxId, TypeId};
use crate::store::RecordLoader;

pub struct RelationshipTypeHolder {
    by_name: DashMap<String, TypeId>,
    by_id: DashMap<TypeId, String>,
    create_lock: Mutex<()>,
    id_generator: Arc<dyn IdGenerator>,
    loader: Arc<dyn RecordLoader>,
}

impl RelationshipTypeHolder {
    pub fn new(id_generator: Arc<dyn IdGenerator>, loader: Arc<dyn RecordLoader>) -> Self {
        let holder = Self {
            by_name: DashMap::new(),
            by_id: DashMap::new(),
            create_lock: Mutex::new(()),
            id_generator,
            loader,
        };
        for (id, name) in holder.loader.committed_relationship_types() {
            holder.publish(id, name);
        }
        holder
    }

    fn publish(&self, id: TypeId, name: String) {
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).map(|entry| *entry.value())
    }

    pub fn name_of(&self, id: TypeId) -> Option<String> {
        self.by_id.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, tx: TxId, name: &str) -> Result<TypeId> {
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "relationship type name cannot be empty".into(),
            ));
        }
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let _guard = self.create_lock.lock();
        // A racing creator may have published while we waited.
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let id = self.id_generator.next_id(IdKind::RelationshipType) as TypeId;
        self.loader.create_relationship_type(tx, id, name)?;
        self.publish(id, name.to_owned());
        debug!(type_name = name, type_id = id, "registered relationship type");
        Ok(id)
    }

    pub fn remove(&self, id: TypeId) {
        if let Some((_, name)) = self.by_id.remove(&id) {
            self.by_name.remove(&name);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.by_name
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

pub struct PropertyKeyHolder {
    by_name: DashMap<String, KeyId>,
    by_id: DashMap<KeyId, String>,
    create_lock: Mutex<()>,
    id_generator: Arc<dyn IdGenerator>,
    loader: Arc<dyn RecordLoader>,
}

impl PropertyKeyHolder {
    pub fn new(id_generator: Arc<dyn IdGenerator>, loader: Arc<dyn RecordLoader>) -> Self {
        let holder = Self {
            by_name: DashMap::new(),
            by_id: DashMap::new(),
            create_lock: Mutex::new(()),
            id_generator,
            loader,
        };
        for (id, name) in holder.loader.committed_property_keys() {
            holder.publish(id, name);
        }
        holder
    }

    fn publish(&self, id: KeyId, name: String) {
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
    }

    pub fn id_of(&self, name: &str) -> Option<KeyId> {
        self.by_name.get(name).map(|entry| *entry.value())
    }

    pub fn name_of(&self, id: KeyId) -> Option<String> {
        self.by_id.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, tx: TxId, name: &str) -> Result<KeyId> {
        if name.is_empty() {
            return Err(GraphError::InvalidArgument(
                "property key cannot be empty".into(),
            ));
        }
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let _guard = self.create_lock.lock();
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let id = self.id_generator.next_id(IdKind::PropertyKey) as KeyId;
        self.loader.create_property_key(tx, id, name)?;
        self.publish(id, name.to_owned());
        Ok(id)
    }
}

/// Directory of well-known named root nodes.
pub struct ReferenceNodeHolder {
    by_name: DashMap<String, NodeId>,
    create_lock: Mutex<()>,
}

impl ReferenceNodeHolder {
    pub fn new(loader: &dyn RecordLoader) -> Self {
        let holder = Self {
            by_name: DashMap::new(),
            create_lock: Mutex::new(()),
        };
        for (name, node) in loader.committed_reference_nodes() {
            holder.by_name.insert(name, node);
        }
        holder
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).map(|entry| *entry.value())
    }

    /// Returns the anchored node id, invoking `create` exactly once for a
    /// name that has no anchor yet. Returns `(id, created_now)`.
    pub fn get_or_create(
        &self,
        name: &str,
        create: impl FnOnce() -> Result<NodeId>,
    ) -> Result<(NodeId, bool)> {
        if let Some(node) = self.get(name) {
            return Ok((node, false));
        }
        let _guard = self.create_lock.lock();
        if let Some(node) = self.get(name) {
            return Ok((node, false));
        }
        let node = create()?;
        self.by_name.insert(name.to_owned(), node);
        debug!(reference = name, node_id = node, "anchored reference node");
        Ok((node, true))
    }

    pub fn remove(&self, name: &str) {
        self.by_name.remove(name);
    }

    pub fn remove_by_node(&self, node: NodeId) {
        self.by_name.retain(|_, &mut target| target != node);
    }
}
