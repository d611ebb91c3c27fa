//! SQLite-backed store with pragma configuration.
//!
//! Opens the database, applies the pragmas needed for concurrent access
//! (WAL mode), runs migrations, and implements [`Store`] on top of the
//! `kv` and `lists` tables. All statements run on the tokio-rusqlite
//! background thread, so one connection serializes individual appends.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{Store, migrations};
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) conn: Connection,
}

impl SqliteStore {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }
}

fn expires_at_ms(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl_ms)
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)")?;

                match stmt.query_row(params![key, now], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let created_at = Utc::now().to_rfc3339();
        let expires_at = expires_at_ms(ttl);

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv (key, value, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at",
                    params![key, value, created_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn append(&self, list_key: &str, value: &str) -> Result<(), Error> {
        let list_key = list_key.to_string();
        let value = value.to_string();
        let appended_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO lists (list_key, value, appended_at) VALUES (?1, ?2, ?3)",
                    params![list_key, value, appended_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn range(&self, list_key: &str) -> Result<Vec<String>, Error> {
        let list_key = list_key.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM lists WHERE list_key = ?1 ORDER BY id ASC")?;
                let rows = stmt.query_map(params![list_key], |row| row.get::<_, String>(0))?;
                let values = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(values)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let kv = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                let lists = conn.execute("DELETE FROM lists WHERE list_key = ?1", params![key])?;
                Ok(kv + lists > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let kv = conn.execute("DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1", params![prefix])?;
                let lists = conn.execute(
                    "DELETE FROM lists WHERE substr(list_key, 1, length(?1)) = ?1",
                    params![prefix],
                )?;
                Ok((kv + lists) as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let prefix = prefix.to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let kv: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM kv
                    WHERE substr(key, 1, length(?1)) = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![prefix, now],
                    |row| row.get(0),
                )?;
                let lists: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT list_key) FROM lists WHERE substr(list_key, 1, length(?1)) = ?1",
                    params![prefix],
                    |row| row.get(0),
                )?;
                Ok((kv + lists) as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count =
                    conn.execute("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let version = store
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_with_ttl("llm:abc", "{\"v\":1}", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("llm:abc").await.unwrap().as_deref(), Some("{\"v\":1}"));
        assert!(store.get("llm:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_with_ttl("k", "old", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl("k", "new", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_expired_value_reads_absent() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_with_ttl("expiring", "v", Duration::from_millis(20)).await.unwrap();
        store.set_with_ttl("fresh", "v", Duration::from_secs(3600)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.get("expiring").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        for value in ["a", "b", "c"] {
            store.append("history:u1", value).await.unwrap();
        }
        store.append("history:u2", "other").await.unwrap();

        assert_eq!(store.range("history:u1").await.unwrap(), vec!["a", "b", "c"]);
        assert!(store.range("history:none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_list() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.append("history:u1", "a").await.unwrap();

        assert!(store.delete("history:u1").await.unwrap());
        assert!(!store.delete("history:u1").await.unwrap());
        assert!(store.range("history:u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_with_ttl("crawl:1", "a", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl("crawl:2", "b", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl("llm:1", "c", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.delete_prefix("crawl:").await.unwrap(), 2);
        assert!(store.get("crawl:1").await.unwrap().is_none());
        assert!(store.get("llm:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_count_prefix_skips_expired_and_counts_lists_once() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.set_with_ttl("llm:1", "a", Duration::from_secs(60)).await.unwrap();
        store.set_with_ttl("llm:2", "b", Duration::from_millis(10)).await.unwrap();
        store.set_with_ttl("crawl:1", "c", Duration::from_secs(60)).await.unwrap();
        for value in ["x", "y", "z"] {
            store.append("history:u1", value).await.unwrap();
        }
        store.append("history:u2", "w").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.count_prefix("llm:").await.unwrap(), 1);
        assert_eq!(store.count_prefix("history:").await.unwrap(), 2);
        assert_eq!(store.count_prefix("missing:").await.unwrap(), 0);
    }
}
