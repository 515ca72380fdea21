//! In-memory representations of graph entities and the proxy handles the
//! upper layers hold on them.

pub mod node;
pub mod props;
pub mod proxy;
pub mod rel_ids;
pub mod relationship;

pub use node::{CachedNode, ChainPosition};
pub use props::PropertySlot;
pub use proxy::{NodeProxy, RelProxy};
pub use rel_ids::RelIdArray;
pub use relationship::CachedRel;
