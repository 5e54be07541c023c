use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::SharedCache;
use crate::error::{Error, Result};

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL  -- unix epoch milliseconds
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry ON cache_entries(expires_at);
"#;

/// Cache backed by a SQLite file, so separate processes sharing a credential
/// see the same budget state.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(CACHE_SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Removes expired rows. Returns how many were deleted.
    pub fn purge_expired(&self) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![now_millis()],
        )?;
        Ok(rows)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

impl SharedCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
            params![key, now_millis()],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expiry_millis(ttl)],
        )?;
        Ok(())
    }

    fn increment(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (current, expires_at) = match existing {
            Some((value, expires_at)) => {
                let current = value.parse::<i64>().map_err(|_| {
                    Error::Cache(format!("cache entry '{key}' is not a counter"))
                })?;
                (current, expires_at)
            }
            None => (0, expiry_millis(ttl)),
        };

        let next = current + by;
        tx.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, next.to_string(), expires_at],
        )?;
        tx.commit()?;

        Ok(next)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}
