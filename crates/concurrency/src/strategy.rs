//! Single-key lock strategies
//!
//! A `LockStrategy` stores one `LockRecord` per held key. Implementations only
//! provide the storage primitives (atomic create, read, conditional remove); the
//! polling acquire loop, owner-checked release and lazy staleness eviction are
//! provided methods shared by every backend.

use chrono::{DateTime, Utc};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{Error, LockConfig, LockKey, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identity of a lock holder
///
/// Every `TransactionLock` gets a fresh owner; the id is what strategies compare
/// on release, the description is only for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockOwner {
    id: Uuid,
    description: String,
}

impl LockOwner {
    /// New owner with a random id
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
        }
    }

    /// New owner described by the calling thread
    pub fn for_current_thread() -> Self {
        let current = thread::current();
        let description = match current.name() {
            Some(name) => format!("thread {}", name),
            None => format!("thread {:?}", current.id()),
        };
        Self::new(description)
    }

    /// Unique id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Token stored in lock records
    pub fn token(&self) -> String {
        self.id.to_string()
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.description)
    }
}

/// Stored form of a held lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Locked key
    pub key: String,
    /// Owner token (`LockOwner::token`)
    pub owner: String,
    /// Owner description at acquisition time
    pub owner_desc: String,
    /// Acquisition time
    pub created: DateTime<Utc>,
}

impl LockRecord {
    /// Record for `key` held by `owner`, created now
    pub fn new(key: &LockKey, owner: &LockOwner) -> Self {
        Self {
            key: key.to_string(),
            owner: owner.token(),
            owner_desc: owner.description().to_string(),
            created: Utc::now(),
        }
    }

    /// Time since acquisition; zero if the clock went backwards
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.created)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the record is older than `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Backend holding lock records
pub trait LockStrategy: Send + Sync + fmt::Debug {
    /// Polling and staleness settings
    fn config(&self) -> &LockConfig;

    /// Insert `record` unless a record for its key exists
    ///
    /// Must be atomic with respect to every other caller of the same backend.
    /// Returns `true` if the record was inserted.
    fn try_create(&self, record: &LockRecord) -> Result<bool>;

    /// Current record of `key`
    fn record(&self, key: &str) -> Result<Option<LockRecord>>;

    /// Remove the record of `key`
    ///
    /// With `owner` set, only a record held by that owner token is removed.
    /// Returns `true` if a record was removed.
    fn remove(&self, key: &str, owner: Option<&str>) -> Result<bool>;

    /// Acquire `key` for `owner`, polling until `timeout`
    ///
    /// Stale records are evicted and the attempt repeated immediately. Backend
    /// errors inside the loop count as "not acquired yet".
    ///
    /// # Errors
    ///
    /// `LockTimeout` naming `key` once the deadline passes.
    fn lock(&self, key: &LockKey, owner: &LockOwner, timeout: Duration) -> Result<()> {
        let deadline = Deadline::after(timeout);
        loop {
            match self.try_create(&LockRecord::new(key, owner)) {
                Ok(true) => {
                    debug!(target: "tessera::lock", key = %key, owner = %owner.id(), "Lock acquired");
                    return Ok(());
                }
                Ok(false) => match evict_stale(self, key.as_str()) {
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(e) => {
                        debug!(target: "tessera::lock", key = %key, error = %e, "Staleness check failed")
                    }
                },
                Err(e) => {
                    debug!(target: "tessera::lock", key = %key, error = %e, "Lock attempt failed")
                }
            }

            if deadline.expired() {
                return Err(Error::lock_timeout([key]));
            }
            thread::sleep(self.config().poll_interval().min(deadline.remaining()));
        }
    }

    /// Release `key` held by `owner`
    ///
    /// A record held by someone else stays in place unless `ignore_lock_owner` is
    /// configured. Returns `true` if a record was removed.
    fn release_lock(&self, key: &LockKey, owner: &LockOwner) -> Result<bool> {
        let token = owner.token();
        match self.record(key.as_str())? {
            None => Ok(false),
            Some(record) if record.owner == token => self.remove(key.as_str(), Some(&token)),
            Some(record) => {
                warn!(
                    target: "tessera::lock",
                    key = %key,
                    owner = %record.owner,
                    owner_desc = %record.owner_desc,
                    releasing = %owner,
                    "Release by a different owner"
                );
                if self.config().ignore_lock_owner {
                    self.remove(key.as_str(), None)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Whether `key` is held by anyone
    fn is_locked(&self, key: &LockKey) -> Result<bool> {
        evict_stale(self, key.as_str())?;
        Ok(self.record(key.as_str())?.is_some())
    }

    /// Whether `key` is held by `owner`
    fn is_locked_by_owner(&self, key: &LockKey, owner: &LockOwner) -> Result<bool> {
        evict_stale(self, key.as_str())?;
        let token = owner.token();
        Ok(self
            .record(key.as_str())?
            .map_or(false, |record| record.owner == token))
    }
}

/// Point in time an acquisition gives up
///
/// A timeout too large to add to the current instant (`Duration::MAX`) means
/// no deadline at all.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Deadline(Instant::now().checked_add(timeout))
    }

    pub(crate) fn expired(&self) -> bool {
        self.0.map_or(false, |at| Instant::now() >= at)
    }

    /// Time left; `Duration::MAX` without a deadline
    pub(crate) fn remaining(&self) -> Duration {
        self.0
            .map_or(Duration::MAX, |at| at.saturating_duration_since(Instant::now()))
    }
}

/// Remove the record of `key` if it is older than the configured maximum age
///
/// The removal is conditional on the stale owner, so a record re-created by
/// someone else in the meantime survives. Returns the evicted record.
pub fn evict_stale<S>(strategy: &S, key: &str) -> Result<Option<LockRecord>>
where
    S: LockStrategy + ?Sized,
{
    let max_age = strategy.config().max_lock_age();
    match strategy.record(key)? {
        Some(record) if record.is_stale(max_age) => {
            if strategy.remove(key, Some(&record.owner))? {
                warn!(
                    target: "tessera::lock",
                    key = %key,
                    owner = %record.owner,
                    owner_desc = %record.owner_desc,
                    age_ms = record.age().as_millis() as u64,
                    "Evicted stale lock"
                );
                Ok(Some(record))
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}
