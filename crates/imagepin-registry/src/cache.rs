//! In-memory memoizing cache with per-entry expiry and single-flight
//! computation.
//!
//! Each key is either `Ready` (a stored result plus the instant it was
//! computed) or `InFlight` (a computation is running and callers are parked
//! on it). The entry map is guarded by a `parking_lot` mutex that is only held
//! for bookkeeping; computations run on their own tokio task, so a slow
//! registry call never blocks lookups of other keys, and a caller that stops
//! waiting never cancels the computation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ComputationAbandoned;

/// Configuration for the memoizing cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live for successful results (default: 60 seconds).
    pub success_ttl: Duration,

    /// Time-to-live for failed results (default: 10 seconds).
    pub failure_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl: Duration::from_secs(60),
            failure_ttl: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given success TTL and the default
    /// failure TTL.
    #[must_use]
    pub fn new(success_ttl: Duration) -> Self {
        Self {
            success_ttl,
            ..Default::default()
        }
    }

    /// Sets the TTL for successful results.
    #[must_use]
    pub const fn with_success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    /// Sets the TTL for failed results.
    #[must_use]
    pub const fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// TTL pair applied to new entries.
    #[must_use]
    pub const fn entry_ttl(&self) -> EntryTtl {
        EntryTtl {
            success: self.success_ttl,
            failure: self.failure_ttl,
        }
    }
}

/// TTLs for one computation, split by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTtl {
    /// TTL if the computation succeeds.
    pub success: Duration,

    /// TTL if the computation fails.
    pub failure: Duration,
}

impl EntryTtl {
    /// Same TTL for both outcomes.
    #[must_use]
    pub const fn uniform(ttl: Duration) -> Self {
        Self {
            success: ttl,
            failure: ttl,
        }
    }

    const fn for_result<V, E>(&self, result: &Result<V, E>) -> Duration {
        match result {
            Ok(_) => self.success,
            Err(_) => self.failure,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a fresh entry.
    pub hits: u64,

    /// Lookups that started a computation.
    pub misses: u64,

    /// Lookups that joined a computation already in flight.
    pub coalesced: u64,

    /// Stale entries dropped, lazily or by a purge.
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

struct Entry<V, E> {
    value: Result<V, E>,
    computed_at: Instant,
    ttl: Duration,
}

impl<V, E> Entry<V, E> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.computed_at) <= self.ttl
    }
}

type Waiter<V, E> = oneshot::Sender<Result<V, E>>;

enum Slot<V, E> {
    Ready(Entry<V, E>),
    InFlight(Vec<Waiter<V, E>>),
}

struct Shared<V, E> {
    slots: Mutex<HashMap<String, Slot<V, E>>>,
    counters: Counters,
}

impl<V, E> Shared<V, E> {
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => entry.is_fresh(now),
            Slot::InFlight(_) => true,
        });
        let removed = before - slots.len();
        drop(slots);

        self.counters
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

/// State of a key observed under the lock.
enum Lookup<V, E> {
    Fresh(Result<V, E>),
    Stale,
    InFlight,
    Missing,
}

/// Generic key → result store with expiry and single-flight computation.
///
/// Cloning the cache yields another handle to the same entries.
pub struct MemoizingCache<V, E> {
    shared: Arc<Shared<V, E>>,
    config: CacheConfig,
}

impl<V, E> Clone for MemoizingCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            config: self.config,
        }
    }
}

impl<V, E> fmt::Debug for MemoizingCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizingCache")
            .field("config", &self.config)
            .field("entries", &self.shared.slots.lock().len())
            .finish()
    }
}

impl<V, E> MemoizingCache<V, E>
where
    V: Clone + Send + 'static,
    E: Clone + Send + From<ComputationAbandoned> + 'static,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
            config,
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the stored result for `key`, computing it if absent or stale.
    ///
    /// Uses the configured success and failure TTLs. See
    /// [`get_or_compute_with`](Self::get_or_compute_with).
    ///
    /// # Errors
    ///
    /// Returns the (possibly cached) error produced by `compute`, or
    /// `E::from(ComputationAbandoned)` if the computation died.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_compute_with(key, self.config.entry_ttl(), compute)
            .await
    }

    /// Returns the stored result for `key`, computing it if absent or stale.
    ///
    /// - A fresh entry (age ≤ TTL) is returned without calling `compute`.
    /// - If a computation for `key` is already running, the caller waits for
    ///   it and receives the same result.
    /// - Otherwise `compute` is called outside the lock and its future is
    ///   spawned on the tokio runtime; the result, success or failure, is
    ///   stored with a fresh timestamp and handed to every waiter.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the (possibly cached) error produced by `compute`, or
    /// `E::from(ComputationAbandoned)` if the computation died.
    pub async fn get_or_compute_with<F, Fut>(
        &self,
        key: &str,
        ttl: EntryTtl,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let lead = {
            let mut slots = self.shared.slots.lock();
            let lookup = match slots.get(key) {
                Some(Slot::Ready(entry)) if entry.is_fresh(Instant::now()) => {
                    Lookup::Fresh(entry.value.clone())
                }
                Some(Slot::Ready(_)) => Lookup::Stale,
                Some(Slot::InFlight(_)) => Lookup::InFlight,
                None => Lookup::Missing,
            };

            match lookup {
                Lookup::Fresh(value) => {
                    Counters::bump(&self.shared.counters.hits);
                    return value;
                }
                Lookup::InFlight => {
                    if let Some(Slot::InFlight(waiters)) = slots.get_mut(key) {
                        waiters.push(sender);
                    }
                    Counters::bump(&self.shared.counters.coalesced);
                    false
                }
                Lookup::Stale | Lookup::Missing => {
                    if matches!(lookup, Lookup::Stale) {
                        Counters::bump(&self.shared.counters.evictions);
                    }
                    slots.insert(key.to_string(), Slot::InFlight(vec![sender]));
                    Counters::bump(&self.shared.counters.misses);
                    true
                }
            }
        };

        if lead {
            tracing::trace!(key, "Cache miss, starting computation");
            // Armed before `compute` runs so a panicking closure still
            // releases the slot.
            let guard = InFlightGuard {
                shared: Arc::clone(&self.shared),
                key: key.to_string(),
                completed: false,
            };
            Self::spawn_computation(guard, ttl, compute());
        } else {
            tracing::trace!(key, "Joining in-flight computation");
            drop(compute);
        }

        receiver.await.unwrap_or_else(|_| {
            Err(E::from(ComputationAbandoned {
                key: key.to_string(),
            }))
        })
    }

    /// Drops the stored result for `key`. In-flight computations are left
    /// alone so their waiters still get an answer.
    ///
    /// Returns true if an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.shared.slots.lock();
        if matches!(slots.get(key), Some(Slot::Ready(_))) {
            slots.remove(key);
            true
        } else {
            false
        }
    }

    /// Drops every stored result, keeping in-flight computations.
    pub fn clear(&self) {
        self.shared
            .slots
            .lock()
            .retain(|_, slot| matches!(slot, Slot::InFlight(_)));
    }

    /// Removes stale entries and returns how many were dropped.
    ///
    /// Expiry is otherwise lazy; this only bounds memory for keys that are
    /// never looked up again.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Spawns a task that calls [`purge_expired`](Self::purge_expired)
    /// every `interval`. The task ends once every handle to the cache has
    /// been dropped.
    #[must_use = "dropping the handle detaches the sweeper; keep it to abort it"]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Shared<V, E>> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let removed = shared.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired cache entries");
                }
            }
        })
    }

    /// Number of keys held, in-flight ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.slots.lock().len()
    }

    /// Returns true if the cache holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.shared.counters.snapshot()
    }

    fn spawn_computation<Fut>(guard: InFlightGuard<V, E>, ttl: EntryTtl, future: Fut)
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        tokio::spawn(async move {
            let value = future.await;
            guard.complete(value, ttl);
        });
    }
}

/// Owns an `InFlight` slot for the duration of a computation. If the
/// computation never completes (panic, runtime shutdown) the slot is removed
/// on drop, which wakes the waiters with a closed channel.
struct InFlightGuard<V, E> {
    shared: Arc<Shared<V, E>>,
    key: String,
    completed: bool,
}

impl<V: Clone, E: Clone> InFlightGuard<V, E> {
    fn complete(mut self, value: Result<V, E>, ttl: EntryTtl) {
        let entry = Entry {
            value: value.clone(),
            computed_at: Instant::now(),
            ttl: ttl.for_result(&value),
        };

        let previous = self
            .shared
            .slots
            .lock()
            .insert(self.key.clone(), Slot::Ready(entry));
        self.completed = true;

        if let Some(Slot::InFlight(waiters)) = previous {
            for waiter in waiters {
                // A waiter that gave up has dropped its receiver.
                let _ = waiter.send(value.clone());
            }
        }
    }
}

impl<V, E> Drop for InFlightGuard<V, E> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut slots = self.shared.slots.lock();
        if matches!(slots.get(&self.key), Some(Slot::InFlight(_))) {
            slots.remove(&self.key);
        }
        drop(slots);
        tracing::warn!(key = %self.key, "Cache computation ended without a result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Failed(String),
        Abandoned,
    }

    impl From<ComputationAbandoned> for TestError {
        fn from(_: ComputationAbandoned) -> Self {
            Self::Abandoned
        }
    }

    type TestCache = MemoizingCache<String, TestError>;

    fn cache() -> TestCache {
        MemoizingCache::new(
            CacheConfig::new(Duration::from_secs(60)).with_failure_ttl(Duration::from_secs(5)),
        )
    }

    /// Builds a compute closure that counts invocations and sleeps first.
    fn counting(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        result: Result<&str, &str>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<String, TestError>> + Send>>
    {
        let calls = Arc::clone(calls);
        let result = result
            .map(ToString::to_string)
            .map_err(|e| TestError::Failed(e.to_string()));
        move || {
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result.map(|v| format!("{v}#{n}"))
            })
        }
    }

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.success_ttl, Duration::from_secs(60));
        assert_eq!(config.failure_ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new(Duration::from_secs(300))
            .with_failure_ttl(Duration::from_secs(30));
        assert_eq!(
            config.entry_ttl(),
            EntryTtl {
                success: Duration::from_secs(300),
                failure: Duration::from_secs(30),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_is_a_hit() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("v")))
            .await;
        tokio::time::advance(Duration::from_secs(59)).await;
        let second = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("other")))
            .await;

        assert_eq!(first, Ok("v#1".to_string()));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..16).map(|_| {
            cache.get_or_compute("k", counting(&calls, Duration::from_millis(200), Ok("v")))
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok("v#1".to_string())));
        assert_eq!(cache.stats().coalesced, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recompute_once_after_ttl() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("v")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let lookups = (0..8).map(|_| {
            cache.get_or_compute("k", counting(&calls, Duration::from_millis(50), Ok("v")))
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(results.iter().all(|r| r == &Ok("v#2".to_string())));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_use_failure_ttl() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Err("down")))
            .await;
        tokio::time::advance(Duration::from_secs(4)).await;
        let second = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("up")))
            .await;

        assert_eq!(first, Err(TestError::Failed("down".to_string())));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let third = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("up")))
            .await;
        assert_eq!(third, Ok("up#2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_ttl_overrides_config() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = EntryTtl::uniform(Duration::from_secs(1));

        cache
            .get_or_compute_with("k", ttl, counting(&calls, Duration::ZERO, Ok("v")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        cache
            .get_or_compute_with("k", ttl, counting(&calls, Duration::ZERO, Ok("v")))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_key_does_not_block_other_keys() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let cache = cache.clone();
            let compute = counting(&calls, Duration::from_secs(30), Ok("slow"));
            tokio::spawn(async move { cache.get_or_compute("slow", compute).await })
        };
        tokio::task::yield_now().await;

        let fast = cache
            .get_or_compute("fast", counting(&calls, Duration::ZERO, Ok("fast")))
            .await;

        assert!(fast.is_ok());
        assert!(!slow.is_finished());
        assert_eq!(slow.await.unwrap(), Ok("slow#1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_caller_does_not_cancel_computation() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_compute("k", counting(&calls, Duration::from_secs(1), Ok("v"))),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let later = cache
            .get_or_compute("k", counting(&calls, Duration::ZERO, Ok("again")))
            .await;

        assert_eq!(later, Ok("v#1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_computation_releases_waiters() {
        let cache = cache();

        let result = cache
            .get_or_compute("k", || async {
                if true {
                    panic!("compute exploded");
                }
                Ok::<String, TestError>(String::new())
            })
            .await;
        assert_eq!(result, Err(TestError::Abandoned));
        assert!(cache.is_empty());

        let retry = cache
            .get_or_compute("k", || async { Ok::<_, TestError>("ok".to_string()) })
            .await;
        assert_eq!(retry, Ok("ok".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_closure_releases_key() {
        let cache = cache();

        let leader = tokio::spawn({
            let cache = cache.clone();
            async move {
                cache
                    .get_or_compute("k", || -> std::future::Ready<Result<String, TestError>> {
                        panic!("closure exploded")
                    })
                    .await
            }
        });
        assert!(leader.await.unwrap_err().is_panic());
        assert!(cache.is_empty());

        let retry = tokio::time::timeout(
            Duration::from_secs(2),
            cache.get_or_compute("k", || async { Ok::<_, TestError>("ok".to_string()) }),
        )
        .await
        .expect("key must not stay in flight");
        assert_eq!(retry, Ok("ok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_compute("ok", counting(&calls, Duration::ZERO, Ok("v")))
            .await
            .unwrap();
        cache
            .get_or_compute("err", counting(&calls, Duration::ZERO, Err("x")))
            .await
            .unwrap_err();
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let sweeper = cache.spawn_sweeper(Duration::from_secs(30));

        cache
            .get_or_compute("err", counting(&calls, Duration::ZERO, Err("x")))
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b"] {
            cache
                .get_or_compute(key, counting(&calls, Duration::ZERO, Ok("v")))
                .await
                .unwrap();
        }

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
