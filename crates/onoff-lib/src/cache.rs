//! Coalescing, time-bounded memoization for expensive upstream reads
//!
//! A [`TtlCache`] keeps one value per key for a fixed expiry and makes sure
//! that, for a given key, at most one computation is in flight at a time.
//! Concurrent callers for the same key queue on a per-key lock and reuse the
//! value produced by whichever caller got there first.
//!
//! Only the key passed to [`TtlCache::get_or_compute`] identifies an entry.
//! Anything the compute closure captures (clients, collections it reads) is
//! treated as wiring and does not vary the cached result.

use crate::observability::OnOffMetrics;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

/// Single-flight TTL cache.
pub struct TtlCache<K, V> {
    name: &'static str,
    expiry: Duration,
    entries: DashMap<K, CacheEntry<V>>,
    locks: DashMap<K, Arc<Mutex<()>>>,
    /// Held shared by every lookup, exclusively by `clear`.
    gate: RwLock<()>,
    metrics: OnOffMetrics,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, expiry: Duration) -> Self {
        Self {
            name,
            expiry,
            entries: DashMap::new(),
            locks: DashMap::new(),
            gate: RwLock::new(()),
            metrics: OnOffMetrics::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    fn fresh(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        (entry.created_at.elapsed() < self.expiry).then(|| entry.value.clone())
    }

    /// Return the cached value for `key`, or run `compute` to produce it.
    ///
    /// A failed computation is not cached; the error goes to the caller that
    /// ran it and the next waiter in line computes again.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let _gate = self.gate.read().await;

        if let Some(value) = self.fresh(&key) {
            self.metrics.inc_cache_hit(self.name);
            return Ok(value);
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed the entry while we waited.
        if let Some(value) = self.fresh(&key) {
            self.metrics.inc_cache_hit(self.name);
            return Ok(value);
        }

        self.metrics.inc_cache_miss(self.name);
        debug!(cache = self.name, "Cache entry missing or expired, recomputing");

        let value = compute().await?;
        self.entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Drop every entry and every key lock.
    ///
    /// Waits for in-flight computations to finish first.
    pub async fn clear(&self) {
        let _gate = self.gate.write().await;
        self.entries.clear();
        self.locks.clear();
    }

    /// Release expired entries and the locks nobody is holding or waiting on.
    ///
    /// Returns the number of locks released.
    pub fn sweep(&self) -> usize {
        self.entries
            .retain(|_, entry| entry.created_at.elapsed() < self.expiry);

        let before = self.locks.len();
        self.locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || self.entries.contains_key(key));
        let released = before.saturating_sub(self.locks.len());

        if released > 0 {
            debug!(cache = self.name, released, "Released idle cache key locks");
        }
        released
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of key locks currently retained.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    async fn counted(counter: &AtomicUsize) -> Result<usize, Infallible> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(2));
        let counter = AtomicUsize::new(0);

        let results = join_all(
            (0..16).map(|_| cache.get_or_compute((), || counted(&counter))),
        )
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache: TtlCache<&str, usize> = TtlCache::new("test", Duration::from_secs(2));
        let counter = AtomicUsize::new(0);

        cache.get_or_compute("k", || counted(&counter)).await.unwrap();

        tokio::time::advance(Duration::from_millis(1990)).await;
        let value = cache.get_or_compute("k", || counted(&counter)).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(20)).await;
        let value = cache.get_or_compute("k", || counted(&counter)).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let cache: TtlCache<&str, usize> = TtlCache::new("test", Duration::from_secs(60));
        let counter = AtomicUsize::new(0);

        let a = cache.get_or_compute("a", || counted(&counter)).await.unwrap();
        let b = cache.get_or_compute("b", || counted(&counter)).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lock_count(), 2);
    }

    #[tokio::test]
    async fn test_captured_arguments_are_not_part_of_the_key() {
        let cache: TtlCache<(), String> = TtlCache::new("test", Duration::from_secs(60));
        let first_client = "client-a".to_string();
        let second_client = "client-b".to_string();

        let first = cache
            .get_or_compute((), || async { Ok::<_, Infallible>(first_client.clone()) })
            .await
            .unwrap();
        let second = cache
            .get_or_compute((), || async { Ok::<_, Infallible>(second_client.clone()) })
            .await
            .unwrap();

        assert_eq!(first, "client-a");
        assert_eq!(second, "client-a");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(60));

        let err = cache
            .get_or_compute((), || async { Err::<usize, _>("upstream down") })
            .await;
        assert_eq!(err, Err("upstream down"));
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute((), || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_recompute_after_a_failed_computation() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(60));
        let counter = &AtomicUsize::new(0);
        let flaky = move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err("upstream down"),
                n => Ok(n),
            }
        };

        let results = join_all((0..4).map(|_| cache.get_or_compute((), flaky))).await;

        assert_eq!(results[0], Err("upstream down"));
        for result in &results[1..] {
            assert_eq!(*result, Ok(1));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_or_compute((), flaky).await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_waits_for_in_flight_computation() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(60));
        let computed = AtomicBool::new(false);
        let started = Instant::now();

        let compute = cache.get_or_compute((), || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            computed.store(true, Ordering::SeqCst);
            Ok::<_, Infallible>(5)
        });
        let clear = async {
            tokio::task::yield_now().await;
            cache.clear().await;
            (computed.load(Ordering::SeqCst), started.elapsed())
        };

        let (value, (computed_before_clear, cleared_at)) = tokio::join!(compute, clear);

        assert_eq!(value.unwrap(), 5);
        assert!(computed_before_clear);
        assert!(cleared_at >= Duration::from_millis(100));
        assert!(cache.is_empty());
        assert_eq!(cache.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(60));
        let counter = AtomicUsize::new(0);

        cache.get_or_compute((), || counted(&counter)).await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(cache.lock_count(), 0);

        let value = cache.get_or_compute((), || counted(&counter)).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_releases_expired_keys_only() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(2));

        cache
            .get_or_compute(1, || async { Ok::<_, Infallible>(1) })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        cache
            .get_or_compute(2, || async { Ok::<_, Infallible>(2) })
            .await
            .unwrap();

        assert_eq!(cache.lock_count(), 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.lock_count(), 1);
        assert_eq!(cache.len(), 1);
    }
}
