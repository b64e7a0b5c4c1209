//! # Kisan Store
//!
//! Durable key-value storage used by the kisan data layer.
//!
//! ## Overview
//!
//! The data layer needs exactly three storage primitives: `get`, `put` and
//! `delete` on string keys. They back two things:
//!
//! - the offline sync queue, which must survive process restarts
//! - the bundled fallback dataset served when every remote tier fails
//!
//! ## Backends
//!
//! | Backend | Durability | Use |
//! |---------|------------|-----|
//! | [`DuckDbStore`] | on-disk `DuckDB` file | production, CLI |
//! | [`MemoryStore`] | process lifetime | tests, `--ephemeral` runs |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kisan_store::{DuckDbStore, LocalStore, LocalStoreExt, StoreConfig};
//!
//! fn main() -> Result<(), kisan_store::StoreError> {
//!     let store = DuckDbStore::open(StoreConfig::default())?;
//!
//!     store.put("greeting", "namaste")?;
//!     assert_eq!(store.get("greeting")?.as_deref(), Some("namaste"));
//!
//!     store.put_json("numbers", &vec![1, 2, 3])?;
//!     let numbers: Option<Vec<u32>> = store.get_json("numbers")?;
//!     assert_eq!(numbers, Some(vec![1, 2, 3]));
//!
//!     Ok(())
//! }
//! ```

pub mod duckdb;
mod memory;
mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use self::duckdb::{ConnectionPool, PooledConnection};
pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (creating the data directory).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded as JSON.
    #[error("stored value for key '{key}' is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable string key-value storage.
///
/// Implementations must be safe to share across tasks; every call is a
/// short, local operation and is allowed to block.
pub trait LocalStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Returns `true` when a value was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Typed JSON helpers available on every [`LocalStore`].
pub trait LocalStoreExt: LocalStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_owned(),
                source,
            })
    }

    fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
            key: key.to_owned(),
            source,
        })?;
        self.put(key, &raw)
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}

/// Configuration for the on-disk store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for kisan data.
    pub kisan_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept by the pool.
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_home(default_home())
    }
}

impl StoreConfig {
    /// Store rooted at `kisan_home`, database at `<home>/store/kisan.duckdb`.
    pub fn in_home(kisan_home: impl Into<PathBuf>) -> Self {
        let kisan_home = kisan_home.into();
        let db_path = kisan_home.join("store").join("kisan.duckdb");
        Self {
            kisan_home,
            db_path,
            max_pool_size: 2,
        }
    }
}

/// Resolves the data directory: `KISAN_HOME`, then `$HOME/.kisan`, then `.kisan`.
pub fn default_home() -> PathBuf {
    if let Some(path) = env::var_os("KISAN_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".kisan");
    }

    PathBuf::from(".kisan")
}

/// `DuckDB`-backed [`LocalStore`].
#[derive(Clone)]
pub struct DuckDbStore {
    pool: ConnectionPool,
}

impl DuckDbStore {
    /// Open (creating if needed) the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.as_path(), config.max_pool_size)?;
        let store = Self { pool };
        store.initialize()?;
        debug!(path = %config.db_path.display(), "opened duckdb store");
        Ok(store)
    }

    fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Path to the database file.
    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }
}

impl LocalStore for DuckDbStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM kv_entries WHERE key = ?")?;
        let mut rows = statement.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get::<_, String>(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let connection = self.pool.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO kv_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let connection = self.pool.acquire()?;
        let removed = connection.execute("DELETE FROM kv_entries WHERE key = ?", params![key])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp_store() -> (tempfile::TempDir, DuckDbStore) {
        let dir = tempdir().expect("tempdir");
        let store = DuckDbStore::open(StoreConfig::in_home(dir.path())).expect("store opens");
        (dir, store)
    }

    #[test]
    fn put_get_delete_round_through_duckdb() {
        let (_dir, store) = open_temp_store();

        assert_eq!(store.get("missing").expect("get"), None);

        store.put("queue", "[]").expect("put");
        assert_eq!(store.get("queue").expect("get").as_deref(), Some("[]"));

        store.put("queue", "[1]").expect("overwrite");
        assert_eq!(store.get("queue").expect("get").as_deref(), Some("[1]"));

        assert!(store.delete("queue").expect("delete"));
        assert!(!store.delete("queue").expect("second delete"));
        assert_eq!(store.get("queue").expect("get"), None);
    }

    #[test]
    fn values_survive_reopening_the_database() {
        let dir = tempdir().expect("tempdir");
        {
            let store = DuckDbStore::open(StoreConfig::in_home(dir.path())).expect("store opens");
            store.put("fallback/dataset", "{\"markets\":[]}").expect("put");
        }

        let reopened = DuckDbStore::open(StoreConfig::in_home(dir.path())).expect("store reopens");
        assert_eq!(
            reopened.get("fallback/dataset").expect("get").as_deref(),
            Some("{\"markets\":[]}")
        );
    }

    #[test]
    fn keys_with_quotes_are_bound_as_parameters() {
        let (_dir, store) = open_temp_store();
        let key = "o'reilly'; DROP TABLE kv_entries; --";

        store.put(key, "safe").expect("put");
        assert_eq!(store.get(key).expect("get").as_deref(), Some("safe"));
        store.put("other", "still here").expect("table still exists");
    }

    #[test]
    fn json_helpers_report_the_offending_key() {
        let (_dir, store) = open_temp_store();
        store.put("broken", "{not json").expect("put");

        let error = store
            .get_json::<Vec<u32>>("broken")
            .expect_err("invalid json must fail");
        assert!(error.to_string().contains("broken"));
    }
}
