//! sable: the in-memory entity layer of an embedded graph database.
//!
//! Nodes and relationships are materialized from a record store on
//! demand, cached under a bounded budget behind interchangeable eviction
//! policies, and handed out as lightweight proxies. Writes thread through
//! per-transaction change sets and an entity lock protocol, so
//! uncommitted state stays private to its transaction.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod ids;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod names;
pub mod store;
pub mod txn;

pub use crate::config::{CacheKind, GraphConfig};
pub use crate::entity::{NodeProxy, RelProxy};
pub use crate::error::{GraphError, Result};
pub use crate::ids::{IdGenerator, MemoryIdGenerator};
pub use crate::manager::{EntityManager, PropertyTracker};
pub use crate::model::{Direction, EntityRef, NodeId, PropertyValue, RelId, TxId};
pub use crate::store::{MemoryRecordStore, RecordLoader};
pub use crate::txn::{EntityLockManager, LockManager, TxOutcome, TxState, Txn};
