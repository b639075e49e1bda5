//! `DuckDB` connection pool management.
//!
//! All pooled connections are clones of one root connection, so they share a
//! single database instance (opening the same file twice from one process is
//! rejected by `DuckDB`).

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::Connection;

struct PoolInner {
    db_path: Option<PathBuf>,
    max_idle: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database file at `path` and create a pool on top of it.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let path = path.into();
        let root = Connection::open(path.as_path())?;
        configure_connection(&root)?;
        Ok(Self::from_root(root, Some(path), max_idle))
    }

    /// Create a pool over a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if `DuckDB` cannot allocate the database.
    pub fn open_in_memory(max_idle: usize) -> Result<Self, ::duckdb::Error> {
        let root = Connection::open_in_memory()?;
        configure_connection(&root)?;
        Ok(Self::from_root(root, None, max_idle))
    }

    fn from_root(root: Connection, db_path: Option<PathBuf>, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Acquire a connection from the pool.
    ///
    /// The connection goes back to the pool when the returned guard is
    /// dropped, whichever way the caller leaves its scope.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned from the root.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let connection = match reused {
            Some(connection) => connection,
            None => self
                .inner
                .root
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_clone()?,
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Number of idle connections currently parked in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get the path to the database file, `None` for in-memory databases.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            // The slot is only emptied inside `drop`.
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = self
            .pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.pool.max_idle {
            idle.push(connection);
        }
    }
}

/// Configure a database connection with appropriate settings.
fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_returns_to_pool_on_drop() {
        let manager = DuckDbConnectionManager::open_in_memory(2).expect("pool");
        assert_eq!(manager.idle_count(), 0);

        {
            let connection = manager.acquire().expect("acquire");
            connection.execute_batch("SELECT 1").expect("query");
        }
        assert_eq!(manager.idle_count(), 1);
    }

    #[test]
    fn connection_returns_to_pool_on_error_path() {
        let manager = DuckDbConnectionManager::open_in_memory(2).expect("pool");

        let outcome = (|| -> Result<(), ::duckdb::Error> {
            let connection = manager.acquire()?;
            connection.execute_batch("SELECT * FROM missing_table")?;
            Ok(())
        })();

        assert!(outcome.is_err());
        assert_eq!(manager.idle_count(), 1);
    }

    #[test]
    fn clones_share_one_database() {
        let manager = DuckDbConnectionManager::open_in_memory(2).expect("pool");
        let first = manager.acquire().expect("first");
        let second = manager.acquire().expect("second");

        first
            .execute_batch("CREATE TABLE shared (id INTEGER); INSERT INTO shared VALUES (7);")
            .expect("write");
        let id: i32 = second
            .query_row("SELECT id FROM shared", [], |row| row.get(0))
            .expect("read through second connection");
        assert_eq!(id, 7);
    }
}
