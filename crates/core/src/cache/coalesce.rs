//! Single-flight deduplication of concurrent cache misses.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;

/// Shares one in-flight computation between concurrent callers of the same key.
///
/// The first caller for a key becomes the leader and runs the computation on
/// a spawned task; later callers subscribe to its result. The task outlives
/// the leader's request, so a disconnected caller still lets the computation
/// finish and reach the others.
pub struct Coalescer<V> {
    inflight: Arc<DashMap<String, broadcast::Sender<V>>>,
}

impl<V> Clone for Coalescer<V> {
    fn clone(&self) -> Self {
        Self { inflight: Arc::clone(&self.inflight) }
    }
}

impl<V> Default for Coalescer<V> {
    fn default() -> Self {
        Self { inflight: Arc::new(DashMap::new()) }
    }
}

/// Removes a key from the in-flight map when the computation task ends.
///
/// Owned by the spawned task, so the entry also goes away when the computation
/// panics. With the map's sender gone and the task's own sender dropped,
/// waiters see the channel close instead of waiting forever.
struct InflightGuard<V> {
    inflight: Arc<DashMap<String, broadcast::Sender<V>>>,
    key: String,
}

impl<V> Drop for InflightGuard<V> {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

impl<V> Coalescer<V>
where
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `fut` for `key`, or wait for the run already in progress.
    ///
    /// Returns `None` if the computation task panicked or was aborted; the
    /// key is released either way, so the next caller starts a fresh run.
    pub async fn run<F>(&self, key: &str, fut: F) -> Option<V>
    where
        F: Future<Output = V> + Send + 'static,
    {
        let mut rx = {
            match self.inflight.entry(key.to_string()) {
                Entry::Occupied(o) => {
                    tracing::debug!(key, "joining in-flight computation");
                    o.get().subscribe()
                }
                Entry::Vacant(v) => {
                    let (tx, rx) = broadcast::channel(1);
                    v.insert(tx.clone());

                    let guard = InflightGuard { inflight: Arc::clone(&self.inflight), key: key.to_string() };
                    tokio::spawn(async move {
                        let value = fut.await;
                        drop(guard);
                        let _ = tx.send(value);
                    });
                    rx
                }
            }
        };

        rx.recv().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("key", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        assert_eq!(coalescer.run("key", async { 1 }).await, Some(1));
        assert_eq!(coalescer.run("key", async { 2 }).await, Some(2));
    }

    #[tokio::test]
    async fn test_panicking_computation_releases_waiters_and_key() {
        let coalescer: Coalescer<u32> = Coalescer::new();

        let leader = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .run("key", async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        panic!("upstream crashed")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(coalescer.in_flight(), 1);

        let joined = tokio::time::timeout(Duration::from_secs(5), coalescer.run("key", async { 99 }))
            .await
            .expect("waiter must not hang after a panic");
        assert_eq!(joined, None);

        let led = tokio::time::timeout(Duration::from_secs(5), leader)
            .await
            .expect("leader must not hang after a panic")
            .unwrap();
        assert_eq!(led, None);
        assert_eq!(coalescer.in_flight(), 0);

        assert_eq!(coalescer.run("key", async { 3 }).await, Some(3));
    }

    #[tokio::test]
    async fn test_computation_survives_dropped_leader() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let done = Arc::new(AtomicUsize::new(0));

        let leader = {
            let coalescer = coalescer.clone();
            let done = done.clone();
            tokio::spawn(async move {
                coalescer
                    .run("key", async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                        7
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        leader.abort();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
