//! In-memory analytics cache with TTL, proactive refresh, and single-flight
//! computation.
//!
//! The cache stores opaque serialized payloads keyed by
//! `analytics:{user}:{product}:{params}`. Freshness is governed by a
//! [`CachePolicy`] per product:
//!
//! - age below `refresh_threshold`: served directly;
//! - age in `[refresh_threshold, ttl)`: served stale while exactly one
//!   background recompute runs;
//! - age at or past `ttl` (or no entry): the caller computes behind a
//!   single-flight guard; concurrent callers for the same key share one
//!   execution and receive the identical result or error.
//!
//! Failed computations are never cached; the next caller retries. The entry
//! table and the in-flight table are the only shared state, each behind a
//! short-held mutex. No computation happens while a lock is held.

mod codec;

pub use codec::{compress, decompress};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::CachePolicy;
use crate::error::{CacheError, ComputeError};

type FlightResult = Result<Vec<u8>, ComputeError>;
type FlightSender = broadcast::Sender<FlightResult>;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    compressed: bool,
    created_at: Instant,
}

/// Counters exposed by [`CacheManager::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Fresh hits served without recomputation.
    pub hits: u64,
    /// Misses that required a computation.
    pub misses: u64,
    /// Stale hits served while a background refresh was armed.
    pub stale_serves: u64,
    /// Background recomputes completed.
    pub background_refreshes: u64,
    /// Entries removed by invalidation.
    pub invalidations: u64,
    /// Current entry count.
    pub entries: usize,
}

enum EntryState {
    Fresh(Vec<u8>),
    Stale(Vec<u8>),
    Missing,
}

enum FlightRole {
    Leader(FlightSender),
    Follower(broadcast::Receiver<FlightResult>),
}

/// TTL + single-flight cache for serialized analytics products.
///
/// Constructed once per process and shared via [`Arc`]; see the crate-level
/// docs for the ownership model.
#[derive(Default)]
pub struct CacheManager {
    entries: Mutex<HashMap<String, Entry>>,
    in_flight: Mutex<HashMap<String, FlightSender>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    background_refreshes: AtomicU64,
    invalidations: AtomicU64,
}

/// Removes the in-flight registration when the computation finishes or is
/// abandoned; dropping the sender wakes every follower with a closed error
/// instead of leaving them waiting forever.
struct FlightGuard {
    cache: Arc<CacheManager>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.cache
            .lock_flights()
            .remove(&self.key);
    }
}

impl CacheManager {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose a cache key from user, product, and parameters.
    #[must_use]
    pub fn key(user_id: i64, product: &str, params: &str) -> String {
        format!("analytics:{user_id}:{product}:{params}")
    }

    /// Key prefix covering every product cached for a user.
    #[must_use]
    pub fn user_prefix(user_id: i64) -> String {
        format!("analytics:{user_id}:")
    }

    /// Non-computing fast path: returns the cached payload if one can be
    /// served, arming a background recompute when it is stale.
    ///
    /// Returns `None` on a miss; the caller is expected to run
    /// [`Self::get_or_compute`] (typically inside a worker task). The
    /// `refresh` future is only polled, in the background, on the
    /// stale-serve path; otherwise it is dropped unstarted.
    pub fn get_cached<Fut>(
        self: &Arc<Self>,
        key: &str,
        policy: CachePolicy,
        refresh: Fut,
    ) -> Option<Result<Vec<u8>, CacheError>>
    where
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        match self.entry_state(key, policy) {
            EntryState::Fresh(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Ok(bytes))
            }
            EntryState::Stale(bytes) => {
                self.stale_serves.fetch_add(1, Ordering::Relaxed);
                self.spawn_refresh(key, policy, refresh);
                Some(Ok(bytes))
            }
            EntryState::Missing => None,
        }
    }

    /// Full cache-or-compute path.
    ///
    /// Fresh and stale hits behave as in [`Self::get_cached`]; on a miss the
    /// computation runs behind the single-flight guard for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Compute`] if the shared computation failed,
    /// [`CacheError::Codec`] if a stored payload cannot be decompressed, or
    /// [`CacheError::FlightAbandoned`] if the leading computation was
    /// dropped before producing a result.
    pub async fn get_or_compute<Fut>(
        self: &Arc<Self>,
        key: &str,
        policy: CachePolicy,
        compute: Fut,
    ) -> Result<Vec<u8>, CacheError>
    where
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        match self.entry_state(key, policy) {
            EntryState::Fresh(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(bytes);
            }
            EntryState::Stale(bytes) => {
                self.stale_serves.fetch_add(1, Ordering::Relaxed);
                self.spawn_refresh(key, policy, compute);
                return Ok(bytes);
            }
            EntryState::Missing => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.join_flight(key) {
            FlightRole::Follower(mut rx) => match rx.recv().await {
                Ok(result) => result.map_err(CacheError::Compute),
                Err(_) => Err(CacheError::FlightAbandoned),
            },
            FlightRole::Leader(tx) => {
                let guard = FlightGuard {
                    cache: Arc::clone(self),
                    key: key.to_string(),
                };
                let result = compute.await;
                if let Ok(bytes) = &result {
                    self.store(key, policy, bytes);
                }
                let _ = tx.send(result.clone());
                drop(guard);
                result.map_err(CacheError::Compute)
            }
        }
    }

    /// Force a synchronous recompute regardless of current freshness.
    ///
    /// Used to pre-populate caches after a user's data changes. Shares the
    /// single-flight guard: if a computation for `key` is already running,
    /// the warmup joins it instead of starting a second one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_or_compute`].
    pub async fn warmup<Fut>(
        self: &Arc<Self>,
        key: &str,
        policy: CachePolicy,
        compute: Fut,
    ) -> Result<Vec<u8>, CacheError>
    where
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        match self.join_flight(key) {
            FlightRole::Follower(mut rx) => match rx.recv().await {
                Ok(result) => result.map_err(CacheError::Compute),
                Err(_) => Err(CacheError::FlightAbandoned),
            },
            FlightRole::Leader(tx) => {
                let guard = FlightGuard {
                    cache: Arc::clone(self),
                    key: key.to_string(),
                };
                let result = compute.await;
                if let Ok(bytes) = &result {
                    self.store(key, policy, bytes);
                }
                let _ = tx.send(result.clone());
                drop(guard);
                result.map_err(CacheError::Compute)
            }
        }
    }

    /// Remove a single entry immediately.
    ///
    /// Returns true if an entry existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock_entries().remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        drop(entries);
        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.lock_entries().len(),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("cache entry table lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_flights(&self) -> MutexGuard<'_, HashMap<String, FlightSender>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("cache in-flight table lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Classify the entry for `key`, removing it if expired. The payload is
    /// decoded outside the lock.
    fn entry_state(&self, key: &str, policy: CachePolicy) -> EntryState {
        let entry = {
            let mut entries = self.lock_entries();
            match entries.get(key) {
                Some(entry) if entry.created_at.elapsed() < policy.ttl => entry.clone(),
                Some(_) => {
                    entries.remove(key);
                    return EntryState::Missing;
                }
                None => return EntryState::Missing,
            }
        };

        let bytes = if entry.compressed {
            match codec::decompress(&entry.value) {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Undecodable entries are dropped and recomputed.
                    tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                    self.lock_entries().remove(key);
                    return EntryState::Missing;
                }
            }
        } else {
            entry.value
        };

        if entry.created_at.elapsed() < policy.refresh_threshold {
            EntryState::Fresh(bytes)
        } else {
            EntryState::Stale(bytes)
        }
    }

    fn join_flight(&self, key: &str) -> FlightRole {
        let mut flights = self.lock_flights();
        if let Some(tx) = flights.get(key) {
            FlightRole::Follower(tx.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(4);
            flights.insert(key.to_string(), tx.clone());
            FlightRole::Leader(tx)
        }
    }

    fn store(&self, key: &str, policy: CachePolicy, bytes: &[u8]) {
        let value = if policy.compress {
            match codec::compress(bytes) {
                Ok(packed) => packed,
                Err(e) => {
                    tracing::warn!(key, error = %e, "compression failed, caching uncompressed");
                    self.lock_entries().insert(
                        key.to_string(),
                        Entry {
                            value: bytes.to_vec(),
                            compressed: false,
                            created_at: Instant::now(),
                        },
                    );
                    return;
                }
            }
        } else {
            bytes.to_vec()
        };

        self.lock_entries().insert(
            key.to_string(),
            Entry {
                value,
                compressed: policy.compress,
                created_at: Instant::now(),
            },
        );
    }

    /// Arm exactly one background recompute for a stale key. A no-op when a
    /// computation for `key` is already in flight.
    fn spawn_refresh<Fut>(self: &Arc<Self>, key: &str, policy: CachePolicy, refresh: Fut)
    where
        Fut: Future<Output = FlightResult> + Send + 'static,
    {
        let tx = {
            let mut flights = self.lock_flights();
            if flights.contains_key(key) {
                return;
            }
            let (tx, _rx) = broadcast::channel(4);
            flights.insert(key.to_string(), tx.clone());
            tx
        };

        let cache = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            let guard = FlightGuard {
                cache: Arc::clone(&cache),
                key: key.clone(),
            };
            let result = refresh.await;
            match &result {
                Ok(bytes) => {
                    cache.store(&key, policy, bytes);
                    cache.background_refreshes.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "background refresh failed");
                }
            }
            let _ = tx.send(result);
            drop(guard);
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn policy(ttl_ms: u64, refresh_ms: u64) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_millis(ttl_ms),
            refresh_threshold: Duration::from_millis(refresh_ms),
            compress: false,
        }
    }

    #[tokio::test]
    async fn fresh_hit_skips_recompute() {
        let cache = Arc::new(CacheManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let p = policy(60_000, 30_000);

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_compute("k", p, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(b"v".to_vec())
                })
                .await
                .unwrap();
            assert_eq!(value, b"v");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(CacheManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let p = policy(60_000, 30_000);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("shared", p, async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(b"result".to_vec())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), b"result");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_hit_serves_and_arms_one_refresh() {
        let cache = Arc::new(CacheManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let p = policy(60_000, 10);

        {
            let calls = Arc::clone(&calls);
            cache
                .get_or_compute("k", p, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(b"old".to_vec())
                })
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Two stale reads: both get the old value, only one refresh runs.
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_compute("k", p, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(b"new".to_vec())
                })
                .await
                .unwrap();
            assert_eq!(value, b"old");
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().background_refreshes, 1);

        // Refresh result is now served fresh.
        let value = cache
            .get_or_compute("k", p, async move { Ok(b"unused".to_vec()) })
            .await
            .unwrap();
        assert_eq!(value, b"new");
    }

    #[tokio::test]
    async fn errors_are_shared_but_not_cached() {
        let cache = Arc::new(CacheManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let p = policy(60_000, 30_000);

        {
            let calls = Arc::clone(&calls);
            let err = cache
                .get_or_compute("k", p, async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ComputeError::Internal {
                        message: "boom".into(),
                    })
                })
                .await
                .unwrap_err();
            assert!(matches!(err, CacheError::Compute(_)));
        }

        // Next call retries rather than seeing a cached failure.
        let calls2 = Arc::clone(&calls);
        let value = cache
            .get_or_compute("k", p, async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(b"recovered".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(value, b"recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = Arc::new(CacheManager::new());
        let p = policy(20, 10);

        cache
            .get_or_compute("k", p, async { Ok(b"first".to_vec()) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let value = cache
            .get_or_compute("k", p, async { Ok(b"second".to_vec()) })
            .await
            .unwrap();
        assert_eq!(value, b"second");
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn warmup_recomputes_despite_freshness() {
        let cache = Arc::new(CacheManager::new());
        let p = policy(60_000, 30_000);

        cache
            .get_or_compute("k", p, async { Ok(b"old".to_vec()) })
            .await
            .unwrap();
        let value = cache
            .warmup("k", p, async { Ok(b"warm".to_vec()) })
            .await
            .unwrap();
        assert_eq!(value, b"warm");

        let cached = cache
            .get_or_compute("k", p, async { Ok(b"unused".to_vec()) })
            .await
            .unwrap();
        assert_eq!(cached, b"warm");
    }

    #[tokio::test]
    async fn invalidate_prefix_sweeps_user_keys() {
        let cache = Arc::new(CacheManager::new());
        let p = policy(60_000, 30_000);

        for key in [
            CacheManager::key(1, "period_stats", "week"),
            CacheManager::key(1, "recommendations", "all"),
            CacheManager::key(2, "period_stats", "week"),
        ] {
            cache
                .get_or_compute(&key, p, async { Ok(b"v".to_vec()) })
                .await
                .unwrap();
        }

        let removed = cache.invalidate_prefix(&CacheManager::user_prefix(1));
        assert_eq!(removed, 2);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn compressed_policy_round_trips() {
        let cache = Arc::new(CacheManager::new());
        let p = CachePolicy {
            ttl: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(30),
            compress: true,
        };
        let payload = vec![7u8; 10_000];

        let expected = payload.clone();
        cache
            .get_or_compute("big", p, async move { Ok(payload) })
            .await
            .unwrap();
        let value = cache
            .get_or_compute("big", p, async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert_eq!(value, expected);
    }
}
