//! Transactional connections
//!
//! Objects that hold store connections implement `ConnectionOwner`. A
//! `ConnectionBundle` collects one transactional connection per owner so every
//! store touched by a transaction commits or rolls back together.
//!
//! Committing or rolling back a bundle leaves its connections enlisted; they
//! are closed only by `close_all`, which the scope calls when its base lock is
//! released or torn down.

use rusqlite::Connection;
use std::fmt;
use std::path::Path;
use tessera_core::{Error, Result};
use tracing::{debug, warn};

/// Connection with an open transaction
pub trait TransactionalConnection: Send {
    /// Commit the open transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> Result<()>;

    /// Close the connection
    fn close(&mut self) -> Result<()>;
}

/// Object able to hand out a transactional connection
pub trait ConnectionOwner {
    /// Stable identity used to keep one connection per owner
    ///
    /// Every handle to the same store must return the same id, and distinct
    /// stores distinct ids, for as long as a transaction is running.
    fn owner_id(&self) -> usize;

    /// Open a connection with a started transaction
    ///
    /// `None` means the owner does not take part in transactions.
    fn create_transactional_connection(&self) -> Result<Option<Box<dyn TransactionalConnection>>>;
}

/// Open connections of one transaction, in enlistment order
#[derive(Default)]
pub struct ConnectionBundle {
    connections: Vec<(usize, Box<dyn TransactionalConnection>)>,
}

impl ConnectionBundle {
    /// Empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Enlist the connection of `owner`
    ///
    /// Returns `true` if the owner has a connection in the bundle afterwards,
    /// `false` if it does not take part in transactions.
    pub fn encapsulate(&mut self, owner: &dyn ConnectionOwner) -> Result<bool> {
        let id = owner.owner_id();
        if self.contains(id) {
            return Ok(true);
        }
        match owner.create_transactional_connection()? {
            Some(connection) => {
                self.connections.push((id, connection));
                debug!(target: "tessera::pool", owner = id, count = self.connections.len(), "Connection enlisted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether the owner with `owner_id` is enlisted
    pub fn contains(&self, owner_id: usize) -> bool {
        self.connections.iter().any(|(id, _)| *id == owner_id)
    }

    /// Number of enlisted connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is enlisted
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Commit every connection
    ///
    /// Every connection is attempted even after a failure, and all of them
    /// stay enlisted.
    ///
    /// # Errors
    ///
    /// `Connection` summarizing the failures if any connection failed to commit.
    pub fn commit(&mut self) -> Result<()> {
        self.apply_all("commit", |c| c.commit())
    }

    /// Roll back every connection; they stay enlisted
    pub fn rollback(&mut self) -> Result<()> {
        self.apply_all("rollback", |c| c.rollback())
    }

    fn apply_all<F>(&mut self, action: &str, mut apply: F) -> Result<()>
    where
        F: FnMut(&mut dyn TransactionalConnection) -> Result<()>,
    {
        let total = self.connections.len();
        let mut failures = Vec::new();
        for (id, connection) in &mut self.connections {
            if let Err(e) = apply(connection.as_mut()) {
                warn!(target: "tessera::pool", owner = *id, error = %e, "Connection {} failed", action);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            debug!(target: "tessera::pool", connections = total, action, "Connections finished");
            Ok(())
        } else {
            Err(Error::Connection(format!(
                "{} failed on {} of {} connections: {}",
                action,
                failures.len(),
                total,
                failures.join("; ")
            )))
        }
    }

    /// Close and forget every connection; failures are logged
    pub fn close_all(&mut self) {
        for (id, mut connection) in self.connections.drain(..) {
            if let Err(e) = connection.close() {
                warn!(target: "tessera::pool", owner = id, error = %e, "Failed to close connection");
            }
        }
    }
}

impl fmt::Debug for ConnectionBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBundle")
            .field("connections", &self.connections.len())
            .finish()
    }
}

fn connection_error(e: rusqlite::Error) -> Error {
    Error::Connection(e.to_string())
}

/// SQLite connection running one transaction
///
/// The transaction starts when the connection is opened. `commit` and
/// `rollback` immediately begin the next one, so the connection stays usable
/// until `close`, which rolls back whatever is still open.
pub struct SqliteConnection {
    conn: Option<Connection>,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Open the database at `path` and begin a transaction
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(connection_error)?;
        Self::begin(conn)
    }

    /// Begin a transaction on an existing connection
    pub fn begin(conn: Connection) -> Result<Self> {
        conn.execute_batch("BEGIN").map_err(connection_error)?;
        Ok(Self {
            conn: Some(conn),
            in_transaction: true,
        })
    }

    /// Underlying connection while it is open
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn end(&mut self, statement: &str, restart: bool) -> Result<()> {
        let conn = match (&self.conn, self.in_transaction) {
            (Some(conn), true) => conn,
            _ => {
                return Err(Error::Connection(format!(
                    "cannot {}: no open transaction",
                    statement.to_ascii_lowercase()
                )))
            }
        };
        conn.execute_batch(statement).map_err(connection_error)?;
        self.in_transaction = false;
        if restart {
            conn.execute_batch("BEGIN").map_err(connection_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl TransactionalConnection for SqliteConnection {
    fn commit(&mut self) -> Result<()> {
        self.end("COMMIT", true)
    }

    fn rollback(&mut self) -> Result<()> {
        self.end("ROLLBACK", true)
    }

    fn close(&mut self) -> Result<()> {
        if self.in_transaction {
            self.end("ROLLBACK", false)?;
        }
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| connection_error(e)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.conn.is_some())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}
