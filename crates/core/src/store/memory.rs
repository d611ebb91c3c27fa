//! Process-local store.
//!
//! Uses plain maps behind a tokio RwLock. Expired values are hidden on read
//! and dropped by `purge_expired`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::Store;
use crate::Error;

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, StoredValue>,
    lists: HashMap<String, Vec<String>>,
}

/// In-memory [`Store`]. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        Ok(inner
            .kv
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        let expires_at = Instant::now().checked_add(ttl);
        inner
            .kv
            .insert(key.to_string(), StoredValue { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn append(&self, list_key: &str, value: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner
            .lists
            .entry(list_key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn range(&self, list_key: &str) -> Result<Vec<String>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.lists.get(list_key).cloned().unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let kv = inner.kv.remove(key).is_some();
        let list = inner.lists.remove(key).is_some();
        Ok(kv || list)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let mut inner = self.inner.write().await;
        let before = inner.kv.len() + inner.lists.len();
        inner.kv.retain(|key, _| !key.starts_with(prefix));
        inner.lists.retain(|key, _| !key.starts_with(prefix));
        Ok((before - inner.kv.len() - inner.lists.len()) as u64)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        let kv = inner
            .kv
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && !stored.is_expired(now))
            .count();
        let lists = inner.lists.keys().filter(|key| key.starts_with(prefix)).count();
        Ok((kv + lists) as u64)
    }

    async fn purge_expired(&self) -> Result<u64, Error> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let before = inner.kv.len();
        inner.kv.retain(|_, stored| !stored.is_expired(now));
        Ok((before - inner.kv.len()) as u64)
    }
}
