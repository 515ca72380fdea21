//! Entity lock manager. Write locks are exclusive and re-entrant per
//! owning transaction; read locks are shared. Callers follow the fixed
//! acquisition order (relationship, smaller node id, larger node id) for
//! multi-entity writes, which keeps the wait graph acyclic.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::error::{GraphError, Result};
use crate::model::{EntityRef, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

pub trait LockManager: Send + Sync {
    /// Blocks until the lock is granted.
    fn acquire(&self, tx: TxId, resource: EntityRef, mode: LockMode) -> Result<()>;

    /// Releases one hold. Fails with a lock error when the transaction
    /// does not hold the resource in that mode.
    fn release(&self, tx: TxId, resource: EntityRef, mode: LockMode) -> Result<()>;
}

#[derive(Debug, Default)]
struct LockState {
    readers: HashMap<TxId, usize>,
    writer: Option<(TxId, usize)>,
    waiters: usize,
}

impl LockState {
    fn idle(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none() && self.waiters == 0
    }

    fn write_grantable(&self, tx: TxId) -> bool {
        match self.writer {
            Some((owner, _)) => owner == tx,
            None => {
                self.readers.is_empty()
                    || (self.readers.len() == 1 && self.readers.contains_key(&tx))
            }
        }
    }

    fn read_grantable(&self, tx: TxId) -> bool {
        match self.writer {
            Some((owner, _)) => owner == tx,
            None => true,
        }
    }
}

#[derive(Default)]
struct LockCell {
    state: Mutex<LockState>,
    released: Condvar,
}

/// In-process lock table keyed by entity.
#[derive(Default)]
pub struct EntityLockManager {
    cells: DashMap<EntityRef, Arc<LockCell>>,
}

impl EntityLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live lock records, for diagnostics.
    pub fn resource_count(&self) -> usize {
        self.cells.len()
    }
}

impl LockManager for EntityLockManager {
    fn acquire(&self, tx: TxId, resource: EntityRef, mode: LockMode) -> Result<()> {
        loop {
            let cell = Arc::clone(&self.cells.entry(resource).or_default());
            let mut state = cell.state.lock();
            // The record may have been retired between lookup and lock.
            let still_current = self
                .cells
                .get(&resource)
                .map(|entry| Arc::ptr_eq(entry.value(), &cell))
                .unwrap_or(false);
            if !still_current {
                continue;
            }
            loop {
                let grantable = match mode {
                    LockMode::Write => state.write_grantable(tx),
                    LockMode::Read => state.read_grantable(tx),
                };
                if grantable {
                    match mode {
                        LockMode::Write => match &mut state.writer {
                            Some((_, count)) => *count += 1,
                            None => state.writer = Some((tx, 1)),
                        },
                        LockMode::Read => {
                            *state.readers.entry(tx).or_insert(0) += 1;
                        }
                    }
                    return Ok(());
                }
                state.waiters += 1;
                cell.released.wait(&mut state);
                state.waiters -= 1;
            }
        }
    }

    fn release(&self, tx: TxId, resource: EntityRef, mode: LockMode) -> Result<()> {
        let cell = self
            .cells
            .get(&resource)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                GraphError::Lock(format!(
                    "{} {resource:?} is not locked",
                    resource.kind_name()
                ))
            })?;
        let mut state = cell.state.lock();
        match mode {
            LockMode::Write => match &mut state.writer {
                Some((owner, count)) if *owner == tx => {
                    *count -= 1;
                    if *count == 0 {
                        state.writer = None;
                    }
                }
                _ => {
                    return Err(GraphError::Lock(format!(
                        "tx {tx} does not hold the write lock on {resource:?}"
                    )))
                }
            },
            LockMode::Read => match state.readers.get_mut(&tx) {
                Some(count) => {
                    *count -= 1;
                    if *count == 0 {
                        state.readers.remove(&tx);
                    }
                }
                None => {
                    return Err(GraphError::Lock(format!(
                        "tx {tx} does not hold a read lock on {resource:?}"
                    )))
                }
            },
        }
        let idle = state.idle();
        cell.released.notify_all();
        drop(state);
        if idle {
            // Retire the record unless someone raced in; try_lock keeps
            // the shard-lock / state-lock order acyclic.
            self.cells.remove_if(&resource, |_, current| {
                Arc::ptr_eq(current, &cell)
                    && current
                        .state
                        .try_lock()
                        .map(|state| state.idle())
                        .unwrap_or(false)
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    const NODE: EntityRef = EntityRef::Node(1);

    #[test]
    fn write_lock_is_reentrant_per_tx() {
        let locks = EntityLockManager::new();
        locks.acquire(1, NODE, LockMode::Write).unwrap();
        locks.acquire(1, NODE, LockMode::Write).unwrap();
        locks.release(1, NODE, LockMode::Write).unwrap();
        locks.release(1, NODE, LockMode::Write).unwrap();
        assert_eq!(locks.resource_count(), 0, "idle records are retired");
    }

    #[test]
    fn writer_blocks_other_tx_until_release() {
        let locks = Arc::new(EntityLockManager::new());
        locks.acquire(1, NODE, LockMode::Write).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                locks.acquire(2, NODE, LockMode::Write).unwrap();
                acquired.store(true, Ordering::SeqCst);
                locks.release(2, NODE, LockMode::Write).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst), "tx 2 must wait for tx 1");
        locks.release(1, NODE, LockMode::Write).unwrap();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn readers_share_and_block_writers() {
        let locks = Arc::new(EntityLockManager::new());
        locks.acquire(1, NODE, LockMode::Read).unwrap();
        locks.acquire(2, NODE, LockMode::Read).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                locks.acquire(3, NODE, LockMode::Write).unwrap();
                acquired.store(true, Ordering::SeqCst);
                locks.release(3, NODE, LockMode::Write).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        locks.release(1, NODE, LockMode::Read).unwrap();
        locks.release(2, NODE, LockMode::Read).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn sole_reader_may_upgrade() {
        let locks = EntityLockManager::new();
        locks.acquire(1, NODE, LockMode::Read).unwrap();
        locks.acquire(1, NODE, LockMode::Write).unwrap();
        locks.release(1, NODE, LockMode::Write).unwrap();
        locks.release(1, NODE, LockMode::Read).unwrap();
    }

    #[test]
    fn releasing_unheld_lock_fails() {
        let locks = EntityLockManager::new();
        assert!(locks.release(1, NODE, LockMode::Write).is_err());
        locks.acquire(1, NODE, LockMode::Write).unwrap();
        assert!(locks.release(2, NODE, LockMode::Write).is_err());
        locks.release(1, NODE, LockMode::Write).unwrap();
    }
}
