//! Short-lived key/value state shared by every sync run that uses the same
//! credential: rate budget snapshots, project membership sets and call counters.
//!
//! Keys are always derived from a credential hash, never from the raw credential.

mod memory;
mod sqlite;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::error::{Error, Result};

/// Cache interface injected into the budget components.
pub trait SharedCache: Send + Sync {
    /// Returns the value for `key` unless it is missing or expired.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Adds `by` to the integer counter at `key` and returns the new value.
    /// A missing or expired counter starts from zero with a fresh `ttl`;
    /// a live counter keeps its original expiry.
    fn increment(&self, key: &str, by: i64, ttl: Duration) -> Result<i64>;

    fn delete(&self, key: &str) -> Result<bool>;
}

/// Reads a JSON value. Entries that fail to decode are treated as absent.
pub fn get_json<T: DeserializeOwned>(cache: &dyn SharedCache, key: &str) -> Result<Option<T>> {
    let Some(raw) = cache.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("Discarding undecodable cache entry '{key}': {e}");
            Ok(None)
        }
    }
}

pub fn set_json<T: Serialize>(
    cache: &dyn SharedCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| Error::Cache(e.to_string()))?;
    cache.set(key, &raw, ttl)
}
