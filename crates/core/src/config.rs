//! Lock manager configuration via `tessera.toml`
//!
//! Every lock strategy reads its polling and staleness settings from a `LockConfig`.
//! The config is plain serde data; it can be built in code, parsed from a TOML string
//! or loaded from a file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Config file name conventionally used for lock settings.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_max_lock_age_ms() -> u64 {
    300_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Lock strategy configuration.
///
/// # Example
///
/// ```toml
/// poll_interval_ms = 50
/// max_lock_age_ms = 300000
/// ignore_lock_owner = false
/// default_timeout_ms = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Sleep between acquisition attempts on a held key.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Records older than this are considered abandoned and evicted.
    #[serde(default = "default_max_lock_age_ms")]
    pub max_lock_age_ms: u64,
    /// Let any owner remove a record on release.
    #[serde(default)]
    pub ignore_lock_owner: bool,
    /// Timeout used by callers that do not pass one explicitly.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_lock_age_ms: default_max_lock_age_ms(),
            ignore_lock_owner: false,
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl LockConfig {
    /// Poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum record age as a `Duration`
    pub fn max_lock_age(&self) -> Duration {
        Duration::from_millis(self.max_lock_age_ms)
    }

    /// Default acquisition timeout as a `Duration`
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Check the settings for values that would break the polling loop.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a zero poll interval or a zero maximum age.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_lock_age_ms == 0 {
            return Err(Error::Config(
                "max_lock_age_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LockConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to load config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera lock manager configuration
#
# Sleep between attempts while a key is held by another owner (milliseconds)
poll_interval_ms = 50

# Locks older than this are treated as abandoned and evicted (milliseconds)
max_lock_age_ms = 300000

# Allow a non-owner to remove a lock on release (default: false)
ignore_lock_owner = false

# Acquisition timeout when the caller does not pass one (milliseconds)
default_timeout_ms = 10000
"#
    }
}
