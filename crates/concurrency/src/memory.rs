//! In-process lock strategy
//!
//! Records live in a mutex-guarded map. Locks are only visible inside the
//! process, which makes this the default for tests and single-process
//! deployments.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tessera_core::{LockConfig, Result};

use crate::strategy::{LockRecord, LockStrategy};

/// Lock records held in memory
#[derive(Debug, Default)]
pub struct MemoryLockStrategy {
    config: LockConfig,
    records: Mutex<HashMap<String, LockRecord>>,
}

impl MemoryLockStrategy {
    /// Empty lock table
    ///
    /// # Errors
    ///
    /// Returns `Config` if `config` fails validation.
    pub fn new(config: LockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Number of held keys, stale ones included
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no key is held
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LockStrategy for MemoryLockStrategy {
    fn config(&self) -> &LockConfig {
        &self.config
    }

    fn try_create(&self, record: &LockRecord) -> Result<bool> {
        match self.records.lock().entry(record.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn record(&self, key: &str) -> Result<Option<LockRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn remove(&self, key: &str, owner: Option<&str>) -> Result<bool> {
        let mut records = self.records.lock();
        let matches = match (records.get(key), owner) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(record), Some(owner)) => record.owner == owner,
        };
        if matches {
            records.remove(key);
        }
        Ok(matches)
    }
}
