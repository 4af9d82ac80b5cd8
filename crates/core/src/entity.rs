//! Entity mapping contract
//!
//! The mapping layer (table metadata, reflective field access) lives outside this
//! workspace. The lock manager only needs to name an entity, list its primary key
//! fields in declaration order, and read their values; relation wrappers additionally
//! write fields back through the same contract.

use std::fmt;

use crate::error::Result;
use crate::value::Value;

/// Descriptor of one mapped field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Field name on the entity
    pub name: String,
}

impl FieldDescriptor {
    /// Descriptor of the field called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A persistent object taking part in a transaction
pub trait Entity: Send + Sync + fmt::Debug {
    /// Name under which the entity type is registered with the mapping layer
    fn registry_name(&self) -> &str;

    /// Current value of a mapped field
    fn field_value(&self, field: &FieldDescriptor) -> Result<Value>;

    /// Write a mapped field
    ///
    /// Used by relation wrappers when they resolve pending changes.
    fn set_field_value(&mut self, field: &FieldDescriptor, value: Value) -> Result<()>;
}

/// Table metadata lookup for registered entity types
pub trait EntityRegistry: Send + Sync {
    /// Primary key fields of a registered type, in table-declaration order
    fn primary_key_fields(&self, registry_name: &str) -> Result<Vec<FieldDescriptor>>;
}
