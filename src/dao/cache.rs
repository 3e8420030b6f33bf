//! Keyed memo of in-flight or resolved reads.
//!
//! Each key maps to a shared future: the first caller installs the fetch, later
//! callers await the same future, so `N` concurrent readers cost one store
//! round-trip. Writes replace or evict the slot synchronously; a fetch that was
//! still pending keeps serving the callers already awaiting it but can no
//! longer be observed by new ones.

use std::{
    future::Future,
    hash::Hash,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Slot<V, E> {
    generation: u64,
    value: SharedFetch<V, E>,
}

/// Per-key memo where concurrent readers of a missing key share one fetch.
pub struct SingleFlightCache<K, V, E> {
    slots: DashMap<K, Slot<V, E>>,
    generations: AtomicU64,
}

impl<K, V, E> Default for SingleFlightCache<K, V, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for `key`, running `fetch` only when no slot exists.
    ///
    /// A failed fetch is evicted so the next caller issues a fresh one, unless a
    /// write has replaced the slot in the meantime.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (generation, shared) = match self.slots.entry(key.clone()) {
            Entry::Occupied(slot) => (slot.get().generation, slot.get().value.clone()),
            Entry::Vacant(vacant) => {
                let generation = self.next_generation();
                let shared = fetch().boxed().shared();
                vacant.insert(Slot {
                    generation,
                    value: shared.clone(),
                });
                (generation, shared)
            }
        };

        let result = shared.await;
        if result.is_err() {
            self.slots
                .remove_if(&key, |_, slot| slot.generation == generation);
        }
        result
    }

    /// Replace whatever is memoized for `key` with a resolved value.
    pub fn put(&self, key: K, value: V) {
        let generation = self.next_generation();
        let ready = futures::future::ready(Ok(value)).boxed().shared();
        self.slots.insert(
            key,
            Slot {
                generation,
                value: ready,
            },
        );
    }

    /// Forget `key`; the next read goes back to the store.
    pub fn evict(&self, key: &K) {
        self.slots.remove(key);
    }

    /// Whether a pending or resolved entry exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::sync::oneshot;

    type TestCache = SingleFlightCache<u32, String, String>;

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let cache = Arc::new(TestCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = release_rx.shared();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let release_rx = release_rx.clone();
            readers.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(1, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        Ok("fetched".to_string())
                    })
                    .await
            }));
        }

        tokio::task::yield_now().await;
        release_tx.send(()).unwrap();

        for reader in readers {
            assert_eq!(reader.await.unwrap().unwrap(), "fetched");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn put_supersedes_pending_fetch() {
        let cache = Arc::new(TestCache::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(7, move || async move {
                        let _ = release_rx.await;
                        Ok("stale".to_string())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        cache.put(7, "written".to_string());
        release_tx.send(()).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), "stale");
        let value = cache
            .get_or_fetch(7, || async { Ok("refetched".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "written");
    }

    #[tokio::test]
    async fn failed_fetch_is_not_memoized() {
        let cache = TestCache::new();
        let err = cache
            .get_or_fetch(3, || async { Err("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(!cache.contains(&3));

        let value = cache
            .get_or_fetch(3, || async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "recovered");
    }

    #[tokio::test]
    async fn evict_forces_refetch() {
        let cache = TestCache::new();
        cache.put(5, "cached".to_string());
        cache.evict(&5);

        let value = cache
            .get_or_fetch(5, || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "fresh");
    }
}
