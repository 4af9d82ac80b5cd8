//! SQLite-backed lock strategy
//!
//! Records are rows of the `tessera_locks` table, so every process opening the
//! same database file sees the same locks. Creation relies on the primary key:
//! `INSERT OR IGNORE` either inserts the row or changes nothing.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tessera_core::{Error, LockConfig, Result};
use tracing::debug;

use crate::strategy::{LockRecord, LockStrategy};

/// Name of the lock table
pub const LOCK_TABLE: &str = "tessera_locks";

/// How long SQLite waits on a busy database file before failing a statement
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Lock records stored in a SQLite table
pub struct PersistentLockStrategy {
    conn: Mutex<Connection>,
    config: LockConfig,
}

impl PersistentLockStrategy {
    /// Open (or create) the lock table in the database file at `path`
    pub fn open(path: impl AsRef<Path>, config: LockConfig) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage)?;
        debug!(target: "tessera::lock", path = %path.display(), "Opened lock table");
        Self::with_connection(conn, config)
    }

    /// Lock table in a private in-memory database
    pub fn in_memory(config: LockConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn, config)
    }

    /// Use an already opened connection
    pub fn with_connection(conn: Connection, config: LockConfig) -> Result<Self> {
        config.validate()?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(storage)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tessera_locks (
                key TEXT PRIMARY KEY,
                created INTEGER NOT NULL,
                owner TEXT NOT NULL,
                owner_str TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// Number of rows in the lock table, stale ones included
    pub fn lock_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM tessera_locks", [], |row| row.get(0))
            .map_err(storage)?;
        Ok(count as usize)
    }
}

impl fmt::Debug for PersistentLockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentLockStrategy")
            .field("table", &LOCK_TABLE)
            .field("config", &self.config)
            .finish()
    }
}

impl LockStrategy for PersistentLockStrategy {
    fn config(&self) -> &LockConfig {
        &self.config
    }

    fn try_create(&self, record: &LockRecord) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO tessera_locks (key, created, owner, owner_str)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.key,
                    record.created.timestamp_millis(),
                    record.owner,
                    record.owner_desc
                ],
            )
            .map_err(storage)?;
        Ok(changed == 1)
    }

    fn record(&self, key: &str) -> Result<Option<LockRecord>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT key, created, owner, owner_str FROM tessera_locks WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(storage)?;

        row.map(|(key, created, owner, owner_desc)| {
            let created = DateTime::<Utc>::from_timestamp_millis(created).ok_or_else(|| {
                Error::Storage(format!("lock {} has invalid created time {}", key, created))
            })?;
            Ok(LockRecord {
                key,
                owner,
                owner_desc,
                created,
            })
        })
        .transpose()
    }

    fn remove(&self, key: &str, owner: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = match owner {
            Some(owner) => conn.execute(
                "DELETE FROM tessera_locks WHERE key = ?1 AND owner = ?2",
                params![key, owner],
            ),
            None => conn.execute("DELETE FROM tessera_locks WHERE key = ?1", [key]),
        }
        .map_err(storage)?;
        Ok(removed > 0)
    }
}
