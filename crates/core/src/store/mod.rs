//! Durable key-value and list storage behind the cache and history.
//!
//! The gateway needs only a small surface from its backing store:
//!
//! - `get` / `set_with_ttl` / `delete` for cache entries
//! - `append` / `range` for per-user history lists
//! - `delete_prefix` / `count_prefix` / `purge_expired` for admin maintenance
//!
//! Two implementations ship: [`SqliteStore`] (WAL-mode SQLite on a background
//! thread) and [`MemoryStore`] (process-local, used by tests and `store = "memory"`).
//! Callers decide how to treat failures; the cache and history layers degrade
//! instead of propagating.

pub mod connection;
pub mod memory;
pub mod migrations;

use std::sync::Arc;
use std::time::Duration;

use crate::Error;
use crate::config::{AppConfig, StoreKind};

pub use connection::SqliteStore;
pub use memory::MemoryStore;

/// Storage operations used by the cache and history layers.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Read a value. Expired or absent keys return `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write a value that the store may drop once `ttl` has elapsed.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error>;

    /// Append a value to the end of a list, creating it if needed.
    async fn append(&self, list_key: &str, value: &str) -> Result<(), Error>;

    /// All values of a list in insertion order.
    async fn range(&self, list_key: &str) -> Result<Vec<String>, Error>;

    /// Delete a key and any list stored under it.
    ///
    /// Returns `true` if anything was removed.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// Delete every key and list whose name starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error>;

    /// Number of live keys plus lists whose name starts with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> Result<u64, Error>;

    /// Physically remove expired values.
    async fn purge_expired(&self) -> Result<u64, Error>;
}

/// Open the store selected by the configuration.
pub async fn open(config: &AppConfig) -> Result<Arc<dyn Store>, Error> {
    match config.store {
        StoreKind::Sqlite => {
            tracing::info!(path = %config.db_path.display(), "opening sqlite store");
            Ok(Arc::new(SqliteStore::open(&config.db_path).await?))
        }
        StoreKind::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = AppConfig { store: StoreKind::Memory, ..Default::default() };
        let store = open(&config).await.unwrap();
        store.set_with_ttl("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_open_sqlite_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { db_path: dir.path().join("cag.sqlite"), ..Default::default() };
        let store = open(&config).await.unwrap();
        store.append("history:u1", "first").await.unwrap();
        assert_eq!(store.range("history:u1").await.unwrap(), vec!["first".to_string()]);
    }
}
