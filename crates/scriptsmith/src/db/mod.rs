//! SQLite persistence for users, run history and queued tasks.
//!
//! One connection per process, shared by the caller thread and every worker
//! through [`Database`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod error;
pub mod history_repo;
pub mod migrations;
pub mod task_repo;
pub mod user_repo;

pub use error::DatabaseError;

/// How long a statement waits on a lock held by another process, such as a
/// second CLI invocation polling the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle over a single connection.
///
/// Statements are serialized through the mutex, so a single-statement write
/// is atomic with respect to other workers.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file, creating parent directories,
    /// and runs pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self::prepare(conn)?;

        log::info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, migrated. Used by tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        // Needed for ON DELETE CASCADE from users to history.
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside an IMMEDIATE transaction, committing when it returns
    /// `Ok`. The write lock is taken up front, so a check made inside `f`
    /// still holds when its writes commit, even against other processes.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let value = f(&*tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(value)
    }
}

/// Returns the canonical database path: `~/.scriptsmith/data/scriptsmith.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".scriptsmith").join("data").join("scriptsmith.db"))
}

/// Formats a timestamp the way every timestamp column stores it, so that
/// text comparison orders rows chronologically.
pub(crate) fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Current time as stored in every timestamp column.
pub(crate) fn now_rfc3339() -> String {
    format_timestamp(chrono::Utc::now())
}
