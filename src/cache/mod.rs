// Transform cache module
//
// Holds completed transform outputs keyed by TransformKey, evicted in
// strict LRU order at a fixed entry capacity. Concurrent requests for
// the same key are deduplicated: the first caller becomes the leader and
// computes, every other caller waits on a broadcast channel and receives
// a clone of the same result. The computation runs in a detached task,
// so a caller that goes away never cancels work other callers share.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use tokio::sync::watch;

use crate::provider::error::TransformError;

pub mod entry;
pub mod key;

pub use entry::TransformEntry;
pub use key::TransformKey;

type TransformResult = Result<TransformEntry, TransformError>;

/// Statistics tracker using atomics for thread safety
pub(crate) struct CacheStatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced_waits: AtomicU64,
}

impl CacheStatsTracker {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            coalesced_waits: AtomicU64::new(0),
        }
    }

    pub fn increment_hits(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_misses(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_evictions(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coalesced_waits(&self) {
        self.coalesced_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self, entry_count: u64, capacity: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            entry_count,
            capacity,
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Requests that waited on another caller's computation
    pub coalesced_waits: u64,
    pub entry_count: u64,
    pub capacity: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

enum Slot {
    Leader(watch::Sender<Option<TransformResult>>),
    Follower(watch::Receiver<Option<TransformResult>>),
}

/// LRU cache of transform outputs with single-flight computation.
pub struct TransformCache {
    store: moka::future::Cache<TransformKey, TransformEntry>,
    in_flight: Arc<tokio::sync::Mutex<HashMap<TransformKey, watch::Receiver<Option<TransformResult>>>>>,
    stats: Arc<CacheStatsTracker>,
    capacity: u64,
}

impl TransformCache {
    /// Create a cache holding at most `capacity` completed entries.
    pub fn new(capacity: u64) -> Self {
        // Create stats tracker first so we can share it with the eviction listener
        let stats = Arc::new(CacheStatsTracker::new());
        let stats_clone = stats.clone();

        let store = moka::future::Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                // Count capacity evictions only, not explicit invalidation
                if matches!(cause, RemovalCause::Size) {
                    stats_clone.increment_evictions();
                }
            })
            .build();

        Self {
            store,
            in_flight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            stats,
            capacity,
        }
    }

    /// Cached entry for a key, if present. Counts a hit or a miss.
    pub async fn get(&self, key: &TransformKey) -> Option<TransformEntry> {
        match self.store.get(key).await {
            Some(entry) => {
                self.stats.increment_hits();
                Some(entry)
            }
            None => {
                self.stats.increment_misses();
                None
            }
        }
    }

    /// Look up `key`, computing it exactly once across all concurrent
    /// callers on a miss.
    ///
    /// The first caller for a key becomes the leader and runs `compute`
    /// in a detached task; abandoning the returned future therefore
    /// never cancels a computation other callers may be waiting on.
    /// Followers receive a clone of the leader's result over a watch
    /// channel. Successful results are admitted to the store before
    /// followers wake; failures are broadcast but never stored, so the
    /// next caller retries.
    pub async fn get_or_compute<F, Fut>(&self, key: TransformKey, compute: F) -> TransformResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = TransformResult> + Send + 'static,
    {
        if let Some(entry) = self.store.get(&key).await {
            self.stats.increment_hits();
            return Ok(entry);
        }
        self.stats.increment_misses();

        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(rx) => Slot::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx);
                    Slot::Leader(tx)
                }
            }
        };

        match slot {
            Slot::Follower(mut rx) => {
                self.stats.increment_coalesced_waits();
                match rx.wait_for(|result| result.is_some()).await {
                    Ok(result) => (*result)
                        .clone()
                        .unwrap_or_else(|| Err(TransformError::interrupted())),
                    // Leader dropped its channel without broadcasting
                    Err(_) => Err(TransformError::interrupted()),
                }
            }
            Slot::Leader(tx) => {
                let store = self.store.clone();
                let in_flight = Arc::clone(&self.in_flight);
                let task_key = key.clone();
                let fut = compute();

                let task = tokio::spawn(async move {
                    let result = match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(TransformError::internal("transform task panicked")),
                    };

                    // Admit before waking followers so they observe the entry
                    if let Ok(entry) = &result {
                        store.insert(task_key.clone(), entry.clone()).await;
                    }
                    in_flight.lock().await.remove(&task_key);
                    let _ = tx.send(Some(result.clone()));
                    result
                });

                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(TransformError::internal(format!(
                        "transform task failed: {}",
                        e
                    ))),
                }
            }
        }
    }

    /// Drops every completed entry. In-flight computations are
    /// unaffected and repopulate the store as they finish.
    pub async fn clear(&self) {
        self.store.invalidate_all();
        self.store.run_pending_tasks().await;
    }

    /// Run pending maintenance tasks. Forces the store to process
    /// pending evictions and invalidations.
    pub async fn run_pending_tasks(&self) {
        self.store.run_pending_tasks().await;
    }

    /// Current entry count (approximate due to eventual consistency)
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Number of computations currently in flight
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Get cache statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.store.entry_count(), self.capacity)
    }
}
