//! Per-key memoization of tile fetches
//!
//! The first request for a key spawns the fetch on the tokio runtime and stores
//! a [`Shared`] handle to it; every later request for that key, in flight or
//! finished, gets a clone of the same handle. The spawned task runs to
//! completion even if every requester stops waiting.
//!
//! ```text
//! request A ─┐
//! request B ─┼──► TileCache ── first request only ──► tokio::spawn(fetch)
//! request C ─┘        │                                      │
//!                     ▼                                      ▼
//!             [A, B, C await the same Shared future] ◄───────┘
//! ```

use super::DatasetError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub type TileResult<V> = Result<V, DatasetError>;

type TileFuture<V> = Shared<BoxFuture<'static, TileResult<V>>>;

/// Counters for monitoring how often requests share a fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total requests received
    pub requests: u64,
    /// Requests served by an existing entry
    pub coalesced: u64,
    /// Requests that started a fetch
    pub fetches: u64,
    /// Entries dropped because their fetch failed
    pub evictions: u64,
}

impl CacheStats {
    /// Returns the share of requests that did not start a fetch (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.requests as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    evictions: AtomicU64,
}

/// Concurrent map from tile key to the shared result of fetching that tile
pub struct TileCache<K, V> {
    entries: DashMap<K, TileFuture<V>>,
    counters: Counters,
}

impl<K, V> TileCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Result for `key`, starting `fetch` only if no entry exists yet.
    ///
    /// A failed fetch is removed from the cache once observed, so a later
    /// request retries it; requesters already waiting on it still see the error.
    /// Must be called from within a tokio runtime.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> TileResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TileResult<V>> + Send + 'static,
    {
        let future = self.entry(key.clone(), fetch);
        let result = future.clone().await;
        if result.is_err() && self.entries.remove_if(&key, |_, f| f.ptr_eq(&future)).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = ?key, "evicted failed tile");
        }
        result
    }

    fn entry<F, Fut>(&self, key: K, fetch: F) -> TileFuture<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TileResult<V>> + Send + 'static,
    {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                let coalesced = self.counters.coalesced.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(key = ?entry.key(), coalesced, "coalescing tile request");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.counters.fetches.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?entry.key(), "starting tile fetch");
                let task = tokio::spawn(fetch());
                let future = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(DatasetError::Task(e.to_string())),
                    }
                }
                .boxed()
                .shared();
                entry.insert(future.clone());
                future
            }
        }
    }

    /// Whether `key` has an entry, in flight or finished
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop the entry for `key` so the next request fetches it again
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a snapshot of the request counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for TileCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> fmt::Debug for TileCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
