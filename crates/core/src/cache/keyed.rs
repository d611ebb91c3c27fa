//! Typed get/set-with-TTL over content-addressed keys.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::entry::CacheEntry;
use super::hash::{Namespace, derive_key};
use crate::Error;
use crate::store::Store;

/// Cache for one namespace and payload type.
///
/// `get` and `set` never fail: a store outage reads as a miss and writes
/// become no-ops. Every failed call is logged at warn. Use `try_get`/`try_set`
/// where the caller needs to see the failure (health probes, admin routes).
pub struct KeyedCache<T> {
    store: Arc<dyn Store>,
    namespace: Namespace,
    ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for KeyedCache<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), namespace: self.namespace, ttl: self.ttl, _payload: PhantomData }
    }
}

impl<T> KeyedCache<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(store: Arc<dyn Store>, namespace: Namespace, ttl: Duration) -> Self {
        Self { store, namespace, ttl, _payload: PhantomData }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Derive the storage key for a semantic input.
    pub fn key(&self, input: &str) -> String {
        derive_key(self.namespace, input)
    }

    /// Look up a fresh entry.
    ///
    /// Entries past their TTL and payloads that no longer decode are
    /// reported as absent.
    pub async fn try_get(&self, input: &str) -> Result<Option<CacheEntry<T>>, Error> {
        let key = self.key(input);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                return Ok(None);
            }
        };

        if entry.key != key || entry.is_expired() {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    pub async fn get(&self, input: &str) -> Option<CacheEntry<T>> {
        match self.try_get(input).await {
            Ok(Some(entry)) => {
                tracing::debug!(namespace = self.namespace.prefix(), key = %entry.key, "cache hit");
                Some(entry)
            }
            Ok(None) => {
                tracing::debug!(namespace = self.namespace.prefix(), "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(namespace = self.namespace.prefix(), error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value under the namespace default TTL.
    pub async fn try_set(&self, input: &str, value: T) -> Result<CacheEntry<T>, Error> {
        self.try_set_with_ttl(input, value, self.ttl).await
    }

    /// Store a value. Last write wins.
    pub async fn try_set_with_ttl(&self, input: &str, value: T, ttl: Duration) -> Result<CacheEntry<T>, Error> {
        let entry = CacheEntry::new(self.key(input), value, ttl);
        let raw = serde_json::to_string(&entry)?;
        self.store
            .set_with_ttl(&entry.key, &raw, ttl)
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))?;
        Ok(entry)
    }

    pub async fn set(&self, input: &str, value: T) {
        self.set_with_ttl(input, value, self.ttl).await;
    }

    pub async fn set_with_ttl(&self, input: &str, value: T, ttl: Duration) {
        if let Err(e) = self.try_set_with_ttl(input, value, ttl).await {
            tracing::warn!(namespace = self.namespace.prefix(), error = %e, "cache write failed, skipping");
        }
    }

    /// Number of live entries in this namespace.
    pub async fn count(&self) -> Result<u64, Error> {
        self.store
            .count_prefix(&self.namespace.key_prefix())
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))
    }

    /// Drop the entry for one semantic input.
    pub async fn remove(&self, input: &str) -> Result<bool, Error> {
        self.store
            .delete(&self.key(input))
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))
    }

    /// Remove every entry in this namespace.
    pub async fn clear(&self) -> Result<u64, Error> {
        self.store
            .delete_prefix(&self.namespace.key_prefix())
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// Store whose every operation fails.
    pub(crate) struct FailingStore;

    #[async_trait::async_trait]
    impl Store for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn append(&self, _list_key: &str, _value: &str) -> Result<(), Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn range(&self, _list_key: &str) -> Result<Vec<String>, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn count_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }

        async fn purge_expired(&self) -> Result<u64, Error> {
            Err(Error::StoreUnavailable("connection refused".into()))
        }
    }

    fn cache(ttl: Duration) -> KeyedCache<String> {
        KeyedCache::new(Arc::new(MemoryStore::new()), Namespace::Llm, ttl)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = cache(Duration::from_secs(60));
        cache.set("prompt", "answer".to_string()).await;

        let entry = cache.get("prompt").await.unwrap();
        assert_eq!(entry.payload, "answer");
        assert_eq!(entry.key, cache.key("prompt"));
        assert!(cache.get("other prompt").await.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = cache(Duration::from_secs(60));
        cache.set("prompt", "first".to_string()).await;
        cache.set("prompt", "second".to_string()).await;
        assert_eq!(cache.get("prompt").await.unwrap().payload, "second");
    }

    #[tokio::test]
    async fn test_ttl_expiry_even_if_store_keeps_value() {
        let store = Arc::new(MemoryStore::new());
        let cache: KeyedCache<String> = KeyedCache::new(store.clone(), Namespace::Crawl, Duration::from_secs(60));

        // Entry claims a 10ms lifetime while the store keeps it for an hour.
        let entry = CacheEntry::new(cache.key("url"), "body".to_string(), Duration::from_millis(10));
        store
            .set_with_ttl(&entry.key, &serde_json::to_string(&entry).unwrap(), Duration::from_secs(3600))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get(&entry.key).await.unwrap().is_some());
        assert!(cache.get("url").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache: KeyedCache<String> = KeyedCache::new(store.clone(), Namespace::Llm, Duration::from_secs(60));
        store
            .set_with_ttl(&cache.key("prompt"), "not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.try_get("prompt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outage_degrades() {
        let cache: KeyedCache<String> = KeyedCache::new(Arc::new(FailingStore), Namespace::Llm, Duration::from_secs(60));

        cache.set("prompt", "answer".to_string()).await;
        assert!(cache.get("prompt").await.is_none());

        let err = cache.try_get("prompt").await.unwrap_err();
        assert_eq!(err.code(), "CACHE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_count_remove_and_clear_stay_in_namespace() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let llm: KeyedCache<String> = KeyedCache::new(store.clone(), Namespace::Llm, Duration::from_secs(60));
        let crawl: KeyedCache<String> = KeyedCache::new(store, Namespace::Crawl, Duration::from_secs(60));

        llm.set("a", "1".to_string()).await;
        llm.set("b", "2".to_string()).await;
        crawl.set("a", "3".to_string()).await;

        assert_eq!(llm.count().await.unwrap(), 2);
        assert!(llm.remove("b").await.unwrap());
        assert_eq!(llm.count().await.unwrap(), 1);
        assert_eq!(crawl.count().await.unwrap(), 1);

        assert_eq!(llm.clear().await.unwrap(), 1);
        assert!(llm.get("a").await.is_none());
        assert!(crawl.get("a").await.is_some());
    }
}
