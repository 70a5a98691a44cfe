//! SQLite store behind the repository service.
//!
//! One `texmerge.db` file per data directory holds branches, commits, merge
//! requests, their conflicts and the audit log. [`Database`] owns the
//! connection; the typed queries live in [`queries`] and the migrations in
//! [`schema`].

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// File name of the store inside a data directory.
pub const DATABASE_FILE: &str = "texmerge.db";

/// How long a writer waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a migrated texmerge store.
///
/// The connection sits behind a `Mutex` so the handle is `Send + Sync`.
/// Every [`Database::transaction`] begins `IMMEDIATE`, so two processes
/// sharing one store serialize their read-check-write sequences instead of
/// interleaving them.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store of `data_dir`, creating the directory and the database
    /// file on first use.
    pub fn open_store<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Self::open(data_dir.join(DATABASE_FILE))
    }

    /// Open (or create) the database file at `path` and bring its schema up
    /// to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening store");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // WAL lets `log`/`show` read while another process commits.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::migrated(conn)
    }

    /// A private in-memory store, used by tests.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        debug!("store schema is up to date");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection for a single statement or a read.
    ///
    /// A poisoned lock is recovered; SQLite already rolled back whatever the
    /// panicking holder left open.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` inside an `IMMEDIATE` transaction.
    ///
    /// `Ok` commits and `Err` rolls back. A closure that decides not to write
    /// must return before its first statement that modifies a row, since an
    /// `Ok` return commits whatever was already written.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
