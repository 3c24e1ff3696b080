//! Monotonic per-entity-class counters backing meta-id allocation.
//!
//! One integer per `(class, supplier prefix)` pair. Allocation never goes
//! backwards and never reuses a value, even across process restarts; values
//! allocated by a batch that is later cancelled are simply leaked.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("counter storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("counter lock poisoned")]
    Poisoned,
}

/// Read/increment interface over a counter store.
///
/// `increment` returns the first value of the allocated run: incrementing a
/// counter at 10 by 3 allocates 11, 12, 13 and returns 11. Implementations
/// must serialise concurrent increments.
pub trait Counter: Send + Sync {
    /// Last allocated value for `class` (0 if nothing allocated yet).
    fn read(&self, class: &str) -> Result<u64, CounterError>;

    /// Atomically allocate `k` consecutive values for `class`, returning the
    /// first.
    fn increment(&self, class: &str, k: u64) -> Result<u64, CounterError>;
}

/// SQLite-backed counter store.
///
/// WAL mode plus `busy_timeout` make increments safe across the parallel
/// batch processes that share one store; the exclusive transaction supplies
/// the single-writer semantics.
pub struct SqliteCounter {
    conn: Mutex<Connection>,
    prefix: String,
}

impl SqliteCounter {
    pub fn open(path: &Path, supplier_prefix: &str) -> Result<Self, CounterError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS counters (
                 class  TEXT NOT NULL,
                 prefix TEXT NOT NULL,
                 value  INTEGER NOT NULL,
                 PRIMARY KEY (class, prefix)
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            prefix: supplier_prefix.to_string(),
        })
    }

    /// The supplier prefix this store partitions its ranges under.
    pub fn supplier_prefix(&self) -> &str {
        &self.prefix
    }
}

impl Counter for SqliteCounter {
    fn read(&self, class: &str) -> Result<u64, CounterError> {
        let conn = self.conn.lock().map_err(|_| CounterError::Poisoned)?;
        let value: Option<u64> = conn
            .query_row(
                "SELECT value FROM counters WHERE class = ?1 AND prefix = ?2",
                params![class, self.prefix],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value.unwrap_or(0))
    }

    fn increment(&self, class: &str, k: u64) -> Result<u64, CounterError> {
        let mut conn = self.conn.lock().map_err(|_| CounterError::Poisoned)?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO counters (class, prefix, value) VALUES (?1, ?2, 0)",
            params![class, self.prefix],
        )?;
        let new_value: u64 = tx.query_row(
            "UPDATE counters SET value = value + ?3
             WHERE class = ?1 AND prefix = ?2
             RETURNING value",
            params![class, self.prefix, k],
            |row| row.get(0),
        )?;
        tx.commit()?;
        tracing::trace!(class, k, first = new_value - k + 1, "allocated counter range");
        Ok(new_value - k + 1)
    }
}

/// In-memory counter for tests and dry runs.
pub struct InMemoryCounter {
    values: Mutex<std::collections::HashMap<String, u64>>,
}

impl Default for InMemoryCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounter {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Pre-seed a class at `value`, as if that many ids were already
    /// allocated.
    pub fn seed(self, class: &str, value: u64) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(class.to_string(), value);
        }
        self
    }
}

impl Counter for InMemoryCounter {
    fn read(&self, class: &str) -> Result<u64, CounterError> {
        let values = self.values.lock().map_err(|_| CounterError::Poisoned)?;
        Ok(values.get(class).copied().unwrap_or(0))
    }

    fn increment(&self, class: &str, k: u64) -> Result<u64, CounterError> {
        let mut values = self.values.lock().map_err(|_| CounterError::Poisoned)?;
        let entry = values.entry(class.to_string()).or_insert(0);
        *entry += k;
        Ok(*entry - k + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_allocates_consecutive_runs() {
        let counter = InMemoryCounter::new();
        assert_eq!(counter.read("br").unwrap(), 0);
        assert_eq!(counter.increment("br", 1).unwrap(), 1);
        assert_eq!(counter.increment("br", 3).unwrap(), 2);
        assert_eq!(counter.read("br").unwrap(), 4);
        // Classes are independent
        assert_eq!(counter.increment("ra", 1).unwrap(), 1);
    }

    #[test]
    fn seeded_counter_resumes() {
        let counter = InMemoryCounter::new().seed("br", 10);
        assert_eq!(counter.increment("br", 1).unwrap(), 11);
    }

    #[test]
    fn sqlite_counter_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.db");

        {
            let counter = SqliteCounter::open(&path, "060").unwrap();
            assert_eq!(counter.increment("br", 2).unwrap(), 1);
            assert_eq!(counter.read("br").unwrap(), 2);
        }
        let counter = SqliteCounter::open(&path, "060").unwrap();
        assert_eq!(counter.read("br").unwrap(), 2);
        assert_eq!(counter.increment("br", 1).unwrap(), 3);
    }

    #[test]
    fn sqlite_counter_partitions_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.db");

        let a = SqliteCounter::open(&path, "060").unwrap();
        let b = SqliteCounter::open(&path, "070").unwrap();
        assert_eq!(a.increment("br", 5).unwrap(), 1);
        assert_eq!(b.increment("br", 1).unwrap(), 1);
        assert_eq!(a.read("br").unwrap(), 5);
        assert_eq!(b.read("br").unwrap(), 1);
    }
}
