//! Error types for Tessera
//!
//! This module defines all error types used throughout the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - `Syntax` / `UnterminatedToken`: malformed template, fatal to that compile
//! - `UnsupportedContext`: the render call lacks a capability the template needs
//! - `LockTimeout`: deadline exceeded while acquiring, the caller picks a retry policy
//! - `NestedLockConflict`: unsafe nesting detected, never retried

use std::io;
use thiserror::Error;

/// Result type alias for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the query compiler and the lock manager
#[derive(Debug, Error)]
pub enum Error {
    /// Unexpected character while compiling a template
    #[error("Syntax error: unexpected character {ch:?} at position {position}")]
    Syntax {
        /// The offending character
        ch: char,
        /// Character offset in the template source
        position: usize,
    },

    /// Input ended inside a quoted literal or a parameter
    #[error("Unterminated {token} starting at position {position}")]
    UnterminatedToken {
        /// Kind of token that was left open ("quoted literal", "parameter")
        token: &'static str,
        /// Character offset where the token started
        position: usize,
    },

    /// The render context lacks a capability required by the template
    #[error("Unsupported context: {0}")]
    UnsupportedContext(String),

    /// A parameter names a rendering kind that does not exist
    #[error("Unknown rendering kind: {0:?}")]
    UnknownRenderKind(String),

    /// A value cannot be converted to the requested rendering kind
    #[error("Cannot render {value} as {kind}")]
    Conversion {
        /// Type and text form of the value
        value: String,
        /// Requested rendering kind
        kind: String,
    },

    /// Lock acquisition exceeded its deadline
    #[error("Lock timeout acquiring [{}]", .keys.join("; "))]
    LockTimeout {
        /// Every key requested by the failed acquisition
        keys: Vec<String>,
    },

    /// A nested transaction lock needs a key its outer lock does not hold
    #[error("Nested lock conflict: key {key:?} is not held by the outer lock")]
    NestedLockConflict {
        /// First conflicting key in canonical order
        key: String,
    },

    /// Invalid operation or state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Backing store error (lock table, connection storage)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transactional connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a lock timeout error from any collection of keys
    pub fn lock_timeout<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: ToString,
    {
        Error::LockTimeout {
            keys: keys.into_iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Whether retrying the same call may succeed
    ///
    /// Only contention and transient storage failures qualify. Syntax and
    /// admission errors are usage errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout { .. } | Error::Storage(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
