//! Thread-local transaction pool
//!
//! Each thread owns one `TransactionScope`, created lazily on first access. The
//! pool maps "the current thread" to its held transaction lock and connection
//! bundle, so persistence code deep in a call stack can join the running
//! transaction without threading a scope through every call.
//!
//! # Example
//!
//! ```ignore
//! let lock = TransactionLock::new(strategy, &registry, objects, false)?;
//! TransactionPool::acquire(Duration::from_secs(5), lock)?;
//! TransactionPool::encapsulate(&store)?;
//!
//! // ... mutate ...
//!
//! TransactionPool::commit_and_release()?;
//! ```
//!
//! Scopes are never shared across threads. The closures given to
//! `with_scope` and `with_current_lock` must not call back into the pool.

use std::cell::RefCell;
use std::time::Duration;
use tessera_core::Result;

use crate::connection::ConnectionOwner;
use crate::scope::TransactionScope;
use crate::transaction_lock::TransactionLock;

thread_local! {
    /// Transaction state of the current thread
    static SCOPE: RefCell<TransactionScope> = RefCell::new(TransactionScope::new());
}

/// Thread-scoped transaction registry
///
/// Every method operates on the calling thread's scope.
pub struct TransactionPool;

impl TransactionPool {
    /// Enter `lock` on this thread, nesting it under a held lock if there is one
    ///
    /// See [`TransactionScope::acquire`].
    pub fn acquire(timeout: Duration, lock: TransactionLock) -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().acquire(timeout, lock))
    }

    /// Enter `lock` on this thread within the strategy's default timeout
    ///
    /// See [`TransactionScope::acquire_default`].
    pub fn acquire_default(lock: TransactionLock) -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().acquire_default(lock))
    }

    /// Leave one nesting level; the base lock is released last
    pub fn release() {
        SCOPE.with(|scope| scope.borrow_mut().release())
    }

    /// Enlist the connection of `owner` in this thread's transaction
    pub fn encapsulate(owner: &dyn ConnectionOwner) -> Result<bool> {
        SCOPE.with(|scope| scope.borrow_mut().encapsulate(owner))
    }

    /// Commit every enlisted connection
    pub fn commit() -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().commit())
    }

    /// Roll back every enlisted connection
    pub fn rollback() -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().rollback())
    }

    /// Commit, then leave one nesting level
    pub fn commit_and_release() -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().commit_and_release())
    }

    /// Roll back, then drop every lock level and connection
    pub fn rollback_and_release() -> Result<()> {
        SCOPE.with(|scope| scope.borrow_mut().rollback_and_release())
    }

    /// Drop every lock level and connection of this thread
    pub fn clear() {
        SCOPE.with(|scope| scope.borrow_mut().clear())
    }

    /// Whether this thread holds a transaction lock
    pub fn is_active() -> bool {
        SCOPE.with(|scope| scope.borrow().is_active())
    }

    /// Held lock levels on this thread
    pub fn lock_depth() -> usize {
        SCOPE.with(|scope| scope.borrow().lock_depth())
    }

    /// Connections enlisted on this thread
    pub fn connection_count() -> usize {
        SCOPE.with(|scope| scope.borrow().connection_count())
    }

    /// Run `f` with the innermost held lock
    pub fn with_current_lock<R>(f: impl FnOnce(Option<&TransactionLock>) -> R) -> R {
        SCOPE.with(|scope| f(scope.borrow().current_lock()))
    }

    /// Run `f` with this thread's scope
    pub fn with_scope<R>(f: impl FnOnce(&mut TransactionScope) -> R) -> R {
        SCOPE.with(|scope| f(&mut scope.borrow_mut()))
    }
}
