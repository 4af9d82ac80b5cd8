//! Transaction locks
//!
//! A `TransactionLock` covers the set of entities one transaction mutates. Keys
//! are kept in a `BTreeMap`, so iteration order is the canonical lock order and
//! any two transactions sharing keys acquire them in the same relative order.
//!
//! # State Machine
//!
//! ```text
//! Created --lock()--> Locked --release()--> Released
//!    |                                          ^
//!    +---------------- release() ---------------+
//! ```
//!
//! Only a lock acquired through `lock()` talks to its strategy. Locks admitted
//! with `push_nested()` ride on the outer lock and never touch the strategy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tessera_core::{Entity, EntityRegistry, Error, LockKey, Result};
use tracing::{debug, warn};

use crate::strategy::{Deadline, LockOwner, LockStrategy};

/// Lifecycle of a transaction lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Built, nothing acquired
    Created,
    /// Every key acquired (or admitted under an outer lock)
    Locked,
    /// Released; cannot be locked again
    Released,
}

/// Ordered set of entity locks acquired together
pub struct TransactionLock {
    objects: BTreeMap<LockKey, Option<Arc<dyn Entity>>>,
    strategy: Option<Arc<dyn LockStrategy>>,
    owner: LockOwner,
    state: LockState,
    relaxed: bool,
    /// Keys acquired from the strategy, in acquisition order
    acquired: Vec<LockKey>,
    nested: Vec<TransactionLock>,
}

impl TransactionLock {
    /// Lock covering `objects`, keyed through `registry`
    ///
    /// A relaxed lock admits any nested lock; a strict one only admits nested
    /// locks whose keys it already holds.
    ///
    /// # Errors
    ///
    /// Propagates key computation failures (`InvalidState` for an entity type
    /// without a primary key).
    pub fn new<I>(
        strategy: Arc<dyn LockStrategy>,
        registry: &dyn EntityRegistry,
        objects: I,
        relaxed: bool,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Entity>>,
    {
        let mut map = BTreeMap::new();
        for object in objects {
            let key = LockKey::for_entity(registry, object.as_ref())?;
            map.insert(key, Some(object));
        }
        Ok(Self::from_map(strategy, map, relaxed))
    }

    /// Lock covering bare keys with no participating objects
    pub fn with_keys<I>(strategy: Arc<dyn LockStrategy>, keys: I, relaxed: bool) -> Self
    where
        I: IntoIterator<Item = LockKey>,
    {
        let map = keys.into_iter().map(|key| (key, None)).collect();
        Self::from_map(strategy, map, relaxed)
    }

    fn from_map(
        strategy: Arc<dyn LockStrategy>,
        objects: BTreeMap<LockKey, Option<Arc<dyn Entity>>>,
        relaxed: bool,
    ) -> Self {
        Self {
            objects,
            strategy: Some(strategy),
            owner: LockOwner::for_current_thread(),
            state: LockState::Created,
            relaxed,
            acquired: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Replace the owner description recorded with each key
    pub fn with_owner_description(mut self, description: impl Into<String>) -> Self {
        self.owner = LockOwner::new(description);
        self
    }

    /// Acquire every key in canonical order within `timeout`
    ///
    /// Strategy errors are retried until the deadline. On timeout every key
    /// acquired by this call is released again before the error is returned.
    ///
    /// # Errors
    ///
    /// - `LockTimeout` listing every requested key
    /// - `InvalidState` if the lock was already released
    pub fn lock(&mut self, timeout: Duration) -> Result<()> {
        match self.state {
            LockState::Created => {}
            LockState::Locked => return Ok(()),
            LockState::Released => {
                return Err(Error::InvalidState(
                    "a released transaction lock cannot be locked again".to_string(),
                ))
            }
        }
        let strategy = match &self.strategy {
            Some(strategy) => Arc::clone(strategy),
            None => {
                return Err(Error::InvalidState(
                    "transaction lock has no strategy".to_string(),
                ))
            }
        };

        let deadline = Deadline::after(timeout);
        let keys: Vec<LockKey> = self.objects.keys().cloned().collect();
        for key in &keys {
            loop {
                match strategy.lock(key, &self.owner, deadline.remaining()) {
                    Ok(()) => {
                        self.acquired.push(key.clone());
                        break;
                    }
                    Err(e) if deadline.expired() => {
                        debug!(target: "tessera::txn", key = %key, error = %e, "Lock deadline reached");
                        self.release_acquired(strategy.as_ref());
                        return Err(Error::lock_timeout(&keys));
                    }
                    Err(e) => {
                        debug!(target: "tessera::txn", key = %key, error = %e, "Retrying key");
                        thread::sleep(strategy.config().poll_interval().min(deadline.remaining()));
                    }
                }
            }
        }

        self.state = LockState::Locked;
        debug!(target: "tessera::txn", owner = %self.owner.id(), keys = keys.len(), "Transaction locked");
        Ok(())
    }

    /// Acquire every key within the strategy's configured default timeout
    ///
    /// # Errors
    ///
    /// Same as [`lock`](Self::lock).
    pub fn lock_default(&mut self) -> Result<()> {
        let timeout = self.default_timeout()?;
        self.lock(timeout)
    }

    /// `default_timeout_ms` of the strategy this lock acquires from
    pub fn default_timeout(&self) -> Result<Duration> {
        self.strategy
            .as_ref()
            .map(|strategy| strategy.config().default_timeout())
            .ok_or_else(|| Error::InvalidState("transaction lock has no strategy".to_string()))
    }

    /// Release the lock
    ///
    /// Keys are released in reverse acquisition order. Failures are logged and
    /// skipped. Nested locks are dropped with it. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.state == LockState::Released {
            return;
        }
        for mut nested in self.nested.drain(..).rev() {
            nested.release();
        }
        if let Some(strategy) = self.strategy.take() {
            self.release_acquired(strategy.as_ref());
        }
        self.objects.clear();
        self.state = LockState::Released;
        debug!(target: "tessera::txn", owner = %self.owner.id(), "Transaction lock released");
    }

    fn release_acquired(&mut self, strategy: &dyn LockStrategy) {
        for key in self.acquired.drain(..).rev() {
            if let Err(e) = strategy.release_lock(&key, &self.owner) {
                warn!(target: "tessera::txn", key = %key, error = %e, "Failed to release key");
            }
        }
    }

    /// Admit `nested` under this lock
    ///
    /// # Errors
    ///
    /// - `InvalidState` if this lock is not locked or `nested` is not fresh
    /// - `NestedLockConflict` naming the first key (canonical order) this strict
    ///   lock does not hold
    pub fn push_nested(&mut self, mut nested: TransactionLock) -> Result<()> {
        if self.state != LockState::Locked {
            return Err(Error::InvalidState(
                "nested locks need a locked outer lock".to_string(),
            ));
        }
        if nested.state != LockState::Created {
            return Err(Error::InvalidState(
                "only a fresh transaction lock can be nested".to_string(),
            ));
        }
        if !self.relaxed {
            if let Some(key) = nested.keys().find(|key| !self.objects.contains_key(*key)) {
                return Err(Error::NestedLockConflict {
                    key: key.to_string(),
                });
            }
        }

        nested.strategy = None;
        nested.state = LockState::Locked;
        self.nested.push(nested);
        debug!(target: "tessera::txn", depth = self.nested.len(), "Nested lock admitted");
        Ok(())
    }

    /// Remove the innermost nested lock
    pub fn pop_nested(&mut self) -> Option<TransactionLock> {
        let mut nested = self.nested.pop()?;
        nested.release();
        debug!(target: "tessera::txn", depth = self.nested.len(), "Nested lock released");
        Some(nested)
    }

    /// Innermost lock: the last admitted nested lock, or this lock
    pub fn current(&self) -> &TransactionLock {
        self.nested.last().unwrap_or(self)
    }

    /// Re-check that the strategy still attributes every key to this lock
    ///
    /// If any key was lost (evicted as stale, force-released), the keys still
    /// owned are released and the lock becomes `Released`. A key whose check
    /// fails with a backend error counts as still held.
    pub fn is_locked(&mut self) -> bool {
        if self.state != LockState::Locked {
            return false;
        }
        let strategy = match &self.strategy {
            Some(strategy) => Arc::clone(strategy),
            None => return true,
        };

        let mut lost = None;
        for key in &self.acquired {
            match strategy.is_locked_by_owner(key, &self.owner) {
                Ok(true) => {}
                Ok(false) => {
                    lost = Some(key.clone());
                    break;
                }
                Err(e) => {
                    warn!(target: "tessera::txn", key = %key, error = %e, "Cannot verify key, assuming held");
                }
            }
        }
        let Some(lost) = lost else {
            return true;
        };

        warn!(target: "tessera::txn", key = %lost, owner = %self.owner, "Transaction lock lost a key");
        let owned: Vec<LockKey> = self
            .acquired
            .drain(..)
            .filter(|key| !matches!(strategy.is_locked_by_owner(key, &self.owner), Ok(false)))
            .collect();
        self.acquired = owned;
        self.release();
        false
    }

    /// Locked keys in canonical order
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.objects.keys()
    }

    /// Whether `key` is covered by this lock
    pub fn contains_key(&self, key: &LockKey) -> bool {
        self.objects.contains_key(key)
    }

    /// Participating object of `key`
    pub fn object(&self, key: &LockKey) -> Option<&Arc<dyn Entity>> {
        self.objects.get(key).and_then(Option::as_ref)
    }

    /// Lifecycle state
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether any nested lock is admitted
    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    /// Number of admitted nested locks
    pub fn nested_depth(&self) -> usize {
        self.nested.len()
    }

    /// Identity recorded with each key
    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        if self.state == LockState::Locked && !self.acquired.is_empty() {
            debug!(target: "tessera::txn", owner = %self.owner.id(), "Releasing dropped transaction lock");
        }
        self.release();
    }
}

impl fmt::Debug for TransactionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLock")
            .field("keys", &self.objects.keys().collect::<Vec<_>>())
            .field("owner", &self.owner)
            .field("state", &self.state)
            .field("relaxed", &self.relaxed)
            .field("nested", &self.nested.len())
            .finish()
    }
}
