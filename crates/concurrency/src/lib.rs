//! Transaction lock manager for Tessera
//!
//! This crate provides:
//! - LockStrategy: single-key locks with polling, ownership and stale eviction,
//!   backed by memory (`MemoryLockStrategy`) or SQLite (`PersistentLockStrategy`)
//! - TransactionLock: ordered, timeout-bounded acquisition of an entity set with
//!   nested lock admission
//! - TransactionScope / TransactionPool: per-thread held locks and the
//!   connections committed or rolled back together
//!
//! Keys are always acquired in their canonical (sorted) order, so transactions
//! sharing keys cannot deadlock; a transaction that cannot get every key within
//! its timeout gives back what it took.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod memory;
pub mod persistent;
pub mod pool;
pub mod registry;
pub mod scope;
pub mod strategy;
pub mod transaction_lock;

pub use connection::{ConnectionBundle, ConnectionOwner, SqliteConnection, TransactionalConnection};
pub use memory::MemoryLockStrategy;
pub use persistent::PersistentLockStrategy;
pub use pool::TransactionPool;
pub use registry::{
    memory_strategy, register_strategy, strategy, unregister_strategy, MEMORY_STRATEGY,
};
pub use scope::TransactionScope;
pub use strategy::{evict_stale, LockOwner, LockRecord, LockStrategy};
pub use transaction_lock::{LockState, TransactionLock};
