//! Core types and traits for Tessera
//!
//! This crate defines the foundational types shared by the query compiler and the
//! lock manager:
//! - Error: Error type hierarchy
//! - Value / RenderKind: runtime values and their statement encodings
//! - Entity / EntityRegistry: the contract with the entity mapping layer
//! - LockKey: canonical identity of a lockable entity
//! - LockConfig: polling and staleness settings for lock strategies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod entity;
pub mod error;
pub mod lock_key;
pub mod value;

pub use config::LockConfig;
pub use entity::{Entity, EntityRegistry, FieldDescriptor};
pub use error::{Error, Result};
pub use lock_key::LockKey;
pub use value::{RenderKind, Value};
