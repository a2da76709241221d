//! Transactional SQLite index of cached tiles.
//!
//! The index holds one row per cached tile plus a single running total,
//! `cache_size`, in a `stats` table. The total is maintained incrementally:
//! [`IndexTxn::record_insert`] adds to it and [`IndexTxn::record_delete`]
//! subtracts from it in the same transaction as the row change, so it
//! always equals `SUM(size)` at commit boundaries without ever re-summing
//! the table on the write path.
//!
//! # Schema
//!
//! ```text
//! tile (address TEXT PRIMARY KEY, key TEXT, size INTEGER, last_access INTEGER)
//! stats (key TEXT PRIMARY KEY, value INTEGER)   -- ('cache_size', total)
//! ```

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;

use crate::cache::types::CacheEntry;

/// Time a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tile (
        address     TEXT PRIMARY KEY,
        key         TEXT NOT NULL,
        size        INTEGER NOT NULL,
        last_access INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS tile_last_access ON tile (last_access ASC);
    CREATE INDEX IF NOT EXISTS tile_key ON tile (key);
    CREATE TABLE IF NOT EXISTS stats (
        key   TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO stats (key, value) VALUES ('cache_size', 0);
";

/// Index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// SQLite reported an error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Integrity check did not come back clean
    #[error("Index is corrupt: {0}")]
    Corrupt(String),
}

/// The cache index: a single SQLite connection shared behind a mutex.
///
/// SQLite serialises writers across processes; the mutex serialises
/// callers sharing this handle.
pub struct CacheIndex {
    conn: Mutex<Connection>,
}

impl CacheIndex {
    /// Open (or create) the index database at `path`.
    ///
    /// Fails if the file is not a usable SQLite database or does not pass
    /// `PRAGMA quick_check`.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory index.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<(), IndexError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // In-memory databases answer "memory" here, which is fine
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if !check.eq_ignore_ascii_case("ok") {
            return Err(IndexError::Corrupt(check));
        }

        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls back every change
    /// made through the transaction.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&IndexTxn<'_>) -> Result<T, IndexError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&IndexTxn { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    /// Current tracked total of all entry sizes.
    pub fn total_size(&self) -> Result<u64, IndexError> {
        total_size(&self.conn.lock())
    }

    /// Number of indexed tiles.
    pub fn entry_count(&self) -> Result<u64, IndexError> {
        entry_count(&self.conn.lock())
    }

    /// Entry for a tile key, if indexed.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>, IndexError> {
        entry_by_key(&self.conn.lock(), key)
    }

    /// Bump the last access time of `key` to `now`.
    ///
    /// Returns `false` when the key is not indexed.
    pub fn record_access(&self, key: &str, now: i64) -> Result<bool, IndexError> {
        touch(&self.conn.lock(), key, now)
    }

    /// `SUM(size)` recomputed over every row.
    ///
    /// O(n) in the number of tiles; used to audit the tracked total.
    pub fn summed_size(&self) -> Result<u64, IndexError> {
        let conn = self.conn.lock();
        let sum: i64 = conn.query_row("SELECT COALESCE(SUM(size), 0) FROM tile", [], |row| {
            row.get(0)
        })?;
        Ok(from_sql_size(sum))
    }
}

/// Index operations inside a running transaction.
pub struct IndexTxn<'a> {
    conn: &'a Connection,
}

impl IndexTxn<'_> {
    /// Insert an entry and add its size to the total.
    ///
    /// An existing row with the same address is replaced and its size
    /// taken off the total first.
    pub fn record_insert(&self, entry: &CacheEntry) -> Result<(), IndexError> {
        if let Some(previous) = size_by_address(self.conn, &entry.address)? {
            adjust_total(self.conn, -previous)?;
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO tile (address, key, size, last_access)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.address,
                entry.key,
                to_sql_size(entry.size_bytes),
                entry.last_access
            ],
        )?;
        adjust_total(self.conn, to_sql_size(entry.size_bytes))
    }

    /// Bump the last access time of `key`; `false` if not indexed.
    pub fn record_access(&self, key: &str, now: i64) -> Result<bool, IndexError> {
        touch(self.conn, key, now)
    }

    /// Entry with the oldest access time, earliest inserted first on ties.
    pub fn select_oldest(&self) -> Result<Option<CacheEntry>, IndexError> {
        Ok(self
            .conn
            .query_row(
                "SELECT address, key, size, last_access FROM tile
                 ORDER BY last_access ASC, rowid ASC LIMIT 1",
                [],
                entry_from_row,
            )
            .optional()?)
    }

    /// Remove an entry and subtract its recorded size from the total.
    ///
    /// Does nothing if the row is already gone.
    pub fn record_delete(&self, entry: &CacheEntry) -> Result<(), IndexError> {
        if let Some(size) = size_by_address(self.conn, &entry.address)? {
            self.conn.execute(
                "DELETE FROM tile WHERE address = ?1",
                params![entry.address],
            )?;
            adjust_total(self.conn, -size)?;
        }
        Ok(())
    }

    /// Tracked total as seen inside this transaction.
    pub fn total_size(&self) -> Result<u64, IndexError> {
        total_size(self.conn)
    }

    /// Number of rows as seen inside this transaction.
    pub fn entry_count(&self) -> Result<u64, IndexError> {
        entry_count(self.conn)
    }

    /// Entry for a tile key as seen inside this transaction.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>, IndexError> {
        entry_by_key(self.conn, key)
    }
}

fn total_size(conn: &Connection) -> Result<u64, IndexError> {
    let value: i64 = conn.query_row(
        "SELECT value FROM stats WHERE key = 'cache_size'",
        [],
        |row| row.get(0),
    )?;
    Ok(from_sql_size(value))
}

fn entry_count(conn: &Connection) -> Result<u64, IndexError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tile", [], |row| row.get(0))?;
    Ok(from_sql_size(count))
}

fn entry_by_key(conn: &Connection, key: &str) -> Result<Option<CacheEntry>, IndexError> {
    Ok(conn
        .query_row(
            "SELECT address, key, size, last_access FROM tile WHERE key = ?1",
            params![key],
            entry_from_row,
        )
        .optional()?)
}

fn size_by_address(conn: &Connection, address: &str) -> Result<Option<i64>, IndexError> {
    Ok(conn
        .query_row(
            "SELECT size FROM tile WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )
        .optional()?)
}

fn touch(conn: &Connection, key: &str, now: i64) -> Result<bool, IndexError> {
    // MAX keeps last_access from moving backwards if the clock does
    let updated = conn.execute(
        "UPDATE tile SET last_access = MAX(last_access, ?1) WHERE key = ?2",
        params![now, key],
    )?;
    Ok(updated > 0)
}

fn adjust_total(conn: &Connection, delta: i64) -> Result<(), IndexError> {
    conn.execute(
        "UPDATE stats SET value = value + ?1 WHERE key = 'cache_size'",
        params![delta],
    )?;
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        address: row.get(0)?,
        key: row.get(1)?,
        size_bytes: from_sql_size(row.get(2)?),
        last_access: row.get(3)?,
    })
}

fn to_sql_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn from_sql_size(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
