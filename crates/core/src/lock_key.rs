//! Lock keys
//!
//! A `LockKey` names one lockable entity instance: the registry name followed by each
//! primary key value in declaration order, comma-separated (`Account,42`,
//! `OrderLine,7,3`).
//!
//! Keys order lexicographically by their string form. Every multi-key acquisition
//! walks keys in this order, which is what keeps two transactions that share
//! resources from waiting on each other in a cycle.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::entity::{Entity, EntityRegistry};
use crate::error::{Error, Result};

/// Separator between the registry name and each key value
pub const KEY_SEPARATOR: char = ',';

/// Canonical identity of a lockable entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    /// Wrap an already formatted key
    pub fn new(key: impl Into<String>) -> Self {
        LockKey(key.into())
    }

    /// Build a key from a registry name and primary key values
    pub fn from_parts<I, V>(registry_name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        let mut key = String::from(registry_name);
        for value in values {
            key.push(KEY_SEPARATOR);
            key.push_str(&value.to_string());
        }
        LockKey(key)
    }

    /// Build the key of an entity through the mapping registry
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the registered type declares no primary key.
    pub fn for_entity(registry: &dyn EntityRegistry, entity: &dyn Entity) -> Result<Self> {
        let name = entity.registry_name();
        let fields = registry.primary_key_fields(name)?;
        if fields.is_empty() {
            return Err(Error::InvalidState(format!(
                "entity type {} has no primary key and cannot be locked",
                name
            )));
        }
        let values = fields
            .iter()
            .map(|field| entity.field_value(field))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_parts(name, values))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Registry name part of the key
    pub fn registry_name(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map(|(name, _)| name)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for LockKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockKey {
    fn from(s: &str) -> Self {
        LockKey::new(s)
    }
}

impl From<String> for LockKey {
    fn from(s: String) -> Self {
        LockKey(s)
    }
}
