//! Explicit transaction handles. A [`Txn`] owns the change set, the set
//! of entity locks taken on its behalf (released only at completion), and
//! the synchronization hooks that run after the outcome is decided.

pub mod change_set;
pub mod locks;

pub use change_set::{EntityDelta, TransactionChangeSet};
pub use locks::{EntityLockManager, LockManager, LockMode};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::manager::EntityManager;
use crate::model::{EntityRef, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Commit,
    Rollback,
}

type Synchronization = Box<dyn FnOnce(TxOutcome) + Send>;

pub struct Txn {
    id: TxId,
    manager: Arc<EntityManager>,
    state: Mutex<TxState>,
    rollback_only: AtomicBool,
    change_set: Mutex<TransactionChangeSet>,
    /// Locks taken for this transaction, in acquisition order. Released
    /// in reverse at completion.
    held_locks: Mutex<Vec<(EntityRef, LockMode)>>,
    synchronizations: Mutex<Vec<Synchronization>>,
    started: Instant,
}

impl Txn {
    pub(crate) fn new(id: TxId, manager: Arc<EntityManager>) -> Self {
        debug!(tx_id = id, "transaction started");
        Self {
            id,
            manager,
            state: Mutex::new(TxState::Active),
            rollback_only: AtomicBool::new(false),
            change_set: Mutex::new(TransactionChangeSet::new()),
            held_locks: Mutex::new(Vec::new()),
            synchronizations: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    /// Marks the transaction so commit degrades to rollback. Irrevocable.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::Relaxed);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Relaxed)
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state() != TxState::Active {
            return Err(GraphError::InvalidArgument(
                "transaction is no longer active".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn change_set(&self) -> MutexGuard<'_, TransactionChangeSet> {
        self.change_set.lock()
    }

    pub(crate) fn note_lock(&self, resource: EntityRef, mode: LockMode) {
        self.held_locks.lock().push((resource, mode));
    }

    /// Registers a hook that runs once the outcome is decided, after the
    /// cache effects and before the deferred lock release.
    pub fn defer(&self, hook: impl FnOnce(TxOutcome) + Send + 'static) {
        self.synchronizations.lock().push(Box::new(hook));
    }

    pub fn commit(self) -> Result<()> {
        if self.is_rollback_only() {
            self.complete(TxOutcome::Rollback)?;
            return Err(GraphError::InvalidArgument(
                "transaction marked rollback-only".into(),
            ));
        }
        self.complete(TxOutcome::Commit)
    }

    pub fn rollback(self) -> Result<()> {
        self.complete(TxOutcome::Rollback)
    }

    fn complete(&self, requested: TxOutcome) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != TxState::Active {
                return Err(GraphError::InvalidArgument(
                    "transaction is no longer active".into(),
                ));
            }
            *state = match requested {
                TxOutcome::Commit => TxState::Committed,
                TxOutcome::Rollback => TxState::RolledBack,
            };
        }

        let mut outcome = requested;
        let mut store_error = None;
        match outcome {
            TxOutcome::Commit => {
                if let Err(err) = self.manager.loader().commit_tx(self.id) {
                    // A failed store commit degrades to rollback.
                    let _ = self.manager.loader().rollback_tx(self.id);
                    *self.state.lock() = TxState::RolledBack;
                    outcome = TxOutcome::Rollback;
                    store_error = Some(err);
                }
            }
            TxOutcome::Rollback => {
                if let Err(err) = self.manager.loader().rollback_tx(self.id) {
                    store_error = Some(err);
                }
            }
        }

        {
            let mut change_set = self.change_set.lock();
            match outcome {
                TxOutcome::Commit => {
                    let deltas = change_set.take_deltas();
                    self.manager.apply_committed_changes(deltas);
                }
                TxOutcome::Rollback => {
                    self.manager.rollback_cleanup(change_set.created());
                }
            }
        }

        let hooks: Vec<Synchronization> = std::mem::take(&mut *self.synchronizations.lock());
        for hook in hooks {
            hook(outcome);
        }

        // Every release is attempted even when a sibling fails; failures
        // are surfaced as one aggregated lock error afterwards.
        let mut release_failures = Vec::new();
        {
            let mut held = self.held_locks.lock();
            for (resource, mode) in held.drain(..).rev() {
                if let Err(err) = self.manager.lock_manager().release(self.id, resource, mode) {
                    warn!(tx_id = self.id, ?resource, error = %err, "failed to release lock");
                    release_failures.push(err);
                }
            }
        }

        match outcome {
            TxOutcome::Commit => info!(
                tx_id = self.id,
                duration_ms = self.started.elapsed().as_millis() as u64,
                "transaction committed"
            ),
            TxOutcome::Rollback => warn!(tx_id = self.id, "transaction rolled back"),
        }

        if let Some(err) = store_error {
            return Err(err);
        }
        if !release_failures.is_empty() {
            return Err(GraphError::release_failures(release_failures));
        }
        Ok(())
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if self.state() == TxState::Active {
            warn!(
                tx_id = self.id,
                "transaction dropped without commit or rollback"
            );
            let _ = self.complete(TxOutcome::Rollback);
        }
    }
}
