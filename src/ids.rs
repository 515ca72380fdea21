use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::IdKind;

/// Allocator for entity ids. Implementations must never hand out the same
/// id twice within a namespace.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, kind: IdKind) -> u64;

    /// Highest id that may be in use for the namespace, inclusive. Used as
    /// the scan bound for full iteration.
    fn highest_in_use(&self, kind: IdKind) -> u64;
}

/// Process-local id generator backed by one counter per namespace.
#[derive(Debug, Default)]
pub struct MemoryIdGenerator {
    nodes: AtomicU64,
    rels: AtomicU64,
    types: AtomicU64,
    keys: AtomicU64,
}

impl MemoryIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: IdKind) -> &AtomicU64 {
        match kind {
            IdKind::Node => &self.nodes,
            IdKind::Relationship => &self.rels,
            IdKind::RelationshipType => &self.types,
            IdKind::PropertyKey => &self.keys,
        }
    }
}

impl IdGenerator for MemoryIdGenerator {
    fn next_id(&self, kind: IdKind) -> u64 {
        self.counter(kind).fetch_add(1, Ordering::Relaxed)
    }

    fn highest_in_use(&self, kind: IdKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed).saturating_sub(1)
    }
}
