//! Transaction scopes
//!
//! A `TransactionScope` is the per-thread state of the transaction pool: the
//! base lock with its nested locks, plus the connections enlisted while it is
//! held. It can also be used directly when transaction state must be passed
//! explicitly instead of living in a thread-local.
//!
//! Connections belong to the base lock. Nested levels share them, so only the
//! base level commits on `commit_and_release`, and connections are closed when
//! the base lock goes away.

use std::time::Duration;
use tessera_core::Result;
use tracing::{debug, warn};

use crate::connection::{ConnectionBundle, ConnectionOwner};
use crate::transaction_lock::TransactionLock;

/// Held lock and enlisted connections of one logical transaction
#[derive(Debug, Default)]
pub struct TransactionScope {
    lock: Option<TransactionLock>,
    connections: ConnectionBundle,
}

impl TransactionScope {
    /// Scope holding nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `lock`
    ///
    /// With a valid base lock held, `lock` is nested under it after admission
    /// checks. If the held lock turns out to be no longer valid the scope is
    /// torn down first. Otherwise `lock` is acquired within `timeout` and
    /// becomes the base.
    ///
    /// # Errors
    ///
    /// - `NestedLockConflict` if a strict base lock does not hold every key
    /// - `LockTimeout` if a fresh acquisition misses its deadline
    pub fn acquire(&mut self, timeout: Duration, lock: TransactionLock) -> Result<()> {
        self.enter(lock, Some(timeout))
    }

    /// Enter `lock`, acquiring a fresh base within the strategy's default timeout
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub fn acquire_default(&mut self, lock: TransactionLock) -> Result<()> {
        self.enter(lock, None)
    }

    fn enter(&mut self, mut lock: TransactionLock, timeout: Option<Duration>) -> Result<()> {
        if let Some(base) = self.lock.as_mut() {
            if base.is_locked() {
                return base.push_nested(lock);
            }
            warn!(target: "tessera::pool", "Held transaction lock is no longer valid, discarding scope");
            self.teardown();
        }

        match timeout {
            Some(timeout) => lock.lock(timeout)?,
            None => lock.lock_default()?,
        }
        self.lock = Some(lock);
        debug!(target: "tessera::pool", "Scope acquired base lock");
        Ok(())
    }

    /// Innermost held lock
    pub fn current_lock(&self) -> Option<&TransactionLock> {
        self.lock.as_ref().map(TransactionLock::current)
    }

    /// Leave one nesting level
    ///
    /// Releasing the base lock also closes every enlisted connection; work not
    /// committed by then is rolled back by the connection's `close`.
    pub fn release(&mut self) {
        let Some(base) = self.lock.as_mut() else {
            return;
        };
        if base.pop_nested().is_some() {
            return;
        }
        base.release();
        self.lock = None;
        if !self.connections.is_empty() {
            debug!(
                target: "tessera::pool",
                connections = self.connections.len(),
                "Closing connections at base release"
            );
            self.connections.close_all();
        }
    }

    /// Enlist the connection of `owner` in this transaction
    pub fn encapsulate(&mut self, owner: &dyn ConnectionOwner) -> Result<bool> {
        self.connections.encapsulate(owner)
    }

    /// Commit every enlisted connection; they stay enlisted
    pub fn commit(&mut self) -> Result<()> {
        self.connections.commit()
    }

    /// Roll back every enlisted connection
    pub fn rollback(&mut self) -> Result<()> {
        self.connections.rollback()
    }

    /// Commit, then leave one nesting level whatever the outcome
    ///
    /// At a nested level nothing is committed: the connections belong to the
    /// outer transaction, which commits when its own level is released.
    pub fn commit_and_release(&mut self) -> Result<()> {
        let result = if self.lock_depth() > 1 {
            debug!(target: "tessera::pool", depth = self.lock_depth(), "Commit deferred to base level");
            Ok(())
        } else {
            self.commit()
        };
        self.release();
        result
    }

    /// Roll back, then tear the whole scope down
    pub fn rollback_and_release(&mut self) -> Result<()> {
        let result = self.rollback();
        self.clear();
        result
    }

    /// Release every lock level and close every connection
    pub fn clear(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut base) = self.lock.take() {
            base.release();
        }
        self.connections.close_all();
    }

    /// Whether a lock is held
    pub fn is_active(&self) -> bool {
        self.lock.is_some()
    }

    /// Held lock levels: zero, or one plus the nested depth
    pub fn lock_depth(&self) -> usize {
        self.lock
            .as_ref()
            .map_or(0, |base| 1 + base.nested_depth())
    }

    /// Number of enlisted connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
