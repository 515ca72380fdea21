//! Striped load locks: serialize the load-from-store path per entity id
//! while letting disjoint ids fault in concurrently.

use parking_lot::{Mutex, MutexGuard};

use crate::error::{GraphError, Result};

pub const DEFAULT_STRIPE_COUNT: usize = 32;

/// Ids within the same 32k block share a stripe, so sequential scans take
/// the same lock while unrelated regions of the id space do not collide.
const STRIPE_BLOCK: u64 = 32_768;

pub struct StripedLoadLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLoadLocks {
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(GraphError::InvalidArgument(
                "stripe count must be positive".into(),
            ));
        }
        Ok(Self {
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Pure mapping from id to stripe index.
    pub fn stripe_of(&self, id: u64) -> usize {
        ((id / STRIPE_BLOCK) % self.stripes.len() as u64) as usize
    }

    /// Blocks until the id's stripe is held. Holders must not acquire a
    /// second stripe.
    pub fn lock(&self, id: u64) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(id)].lock()
    }
}

impl Default for StripedLoadLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPE_COUNT).expect("default stripe count is positive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_pure_and_in_range() {
        let locks = StripedLoadLocks::default();
        for id in [0, 1, 32_767, 32_768, u64::MAX] {
            let stripe = locks.stripe_of(id);
            assert!(stripe < locks.stripe_count());
            assert_eq!(stripe, locks.stripe_of(id), "mapping must be stable");
        }
    }

    #[test]
    fn nearby_ids_share_and_distant_ids_differ() {
        let locks = StripedLoadLocks::default();
        assert_eq!(locks.stripe_of(10), locks.stripe_of(20_000));
        assert_ne!(locks.stripe_of(10), locks.stripe_of(40_000));
    }

    #[test]
    fn zero_stripes_rejected() {
        assert!(StripedLoadLocks::new(0).is_err());
    }
}
