//! Read-through caching over an injected upstream source.
//!
//! [`ReadThroughCache`] answers lookups from an in-memory store and falls back
//! to its [`Upstream`] on a miss. A successful fetch is stored forever; an
//! unavailable or failed fetch stores nothing, so the next lookup for that key
//! asks the upstream again.
//!
//! ## Guarantees
//!
//! - At most one upstream fetch per key is in flight at any time. Concurrent
//!   misses on the same key wait for the first fetch and then read its result.
//! - Misses on distinct keys fetch independently of each other.
//! - A resolved key is never fetched again, even if the upstream's answer
//!   changes. Entries are never evicted, expired or refreshed.
//! - No negative caching: "unavailable", timeouts and upstream errors leave the
//!   store untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

mod config;
mod upstream;

pub use config::CacheConfig;
pub use upstream::{BoxFuture, Fetched, FnUpstream, Upstream, upstream_fn};

/// Errors produced by a cache lookup.
#[derive(Debug, Error)]
pub enum CacheError<E>
where
    E: std::error::Error + 'static,
{
    /// The upstream failed with a transport or I/O error. Nothing was stored.
    #[error("upstream fetch for key `{key}` failed: {source}")]
    Upstream {
        key: String,
        #[source]
        source: E,
    },
}

/// The outcome of a single [`ReadThroughCache::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// The key was already stored. The upstream was not contacted.
    Hit(Arc<V>),
    /// The key was missing and the upstream produced a value, now stored.
    Resolved(Arc<V>),
    /// The key was missing and the upstream had nothing (or timed out).
    Unresolved,
}

impl<V> Lookup<V> {
    /// Returns the value, if the lookup produced one.
    pub fn value(&self) -> Option<&Arc<V>> {
        match self {
            Self::Hit(value) | Self::Resolved(value) => Some(value),
            Self::Unresolved => None,
        }
    }

    /// Consumes the lookup, returning the value if there was one.
    pub fn into_value(self) -> Option<Arc<V>> {
        match self {
            Self::Hit(value) | Self::Resolved(value) => Some(value),
            Self::Unresolved => None,
        }
    }

    /// Returns `true` if the value came from the store without an upstream call.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// A point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the store.
    pub hits: u64,
    /// Upstream fetches started.
    pub misses: u64,
    /// Fetches that reported "unavailable".
    pub unresolved: u64,
    /// Fetches abandoned because they exceeded the configured timeout.
    pub timeouts: u64,
    /// Fetches that failed with an upstream error.
    pub errors: u64,
    /// Keys currently stored.
    pub entries: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    unresolved: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// One gate per key with a fetch in progress. Holders of the gate's lock are the
// only callers allowed to contact the upstream for that key.
type Gate = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
struct GateSlot {
    gate: Gate,
    // Callers registered on this gate, queued or fetching.
    holders: usize,
}

/// A read-through cache keyed by string.
///
/// Values are stored as `Arc<V>`: every hit for a key hands out a handle to the
/// very same stored value.
///
/// The cache is `Send + Sync` whenever its upstream is, so it is typically
/// shared behind an [`Arc`] across tasks.
///
/// # Examples
///
/// ```rust,no_run
/// use std::convert::Infallible;
/// use readthru::cache::{Fetched, ReadThroughCache, upstream_fn};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = ReadThroughCache::new(upstream_fn(|id: String| async move {
///         Ok::<_, Infallible>(Fetched::Found(format!("thing {id}")))
///     }));
///
///     let first = cache.get("TheDress").await?;
///     let again = cache.get("TheDress").await?; // served from the store
///     assert_eq!(first, again);
///     Ok(())
/// }
/// ```
pub struct ReadThroughCache<U: Upstream> {
    upstream: U,
    config: CacheConfig,
    entries: RwLock<HashMap<String, Arc<U::Value>>>,
    in_flight: Mutex<HashMap<String, GateSlot>>,
    counters: Counters,
}

impl<U: Upstream> ReadThroughCache<U> {
    /// Creates an empty cache in front of `upstream` with the default configuration.
    pub fn new(upstream: U) -> Self {
        Self::with_config(upstream, CacheConfig::default())
    }

    /// Creates an empty cache in front of `upstream`.
    pub fn with_config(upstream: U, config: CacheConfig) -> Self {
        let entries = HashMap::with_capacity(config.initial_capacity);
        Self {
            upstream,
            config,
            entries: RwLock::new(entries),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Returns the value for `key`, consulting the upstream on a miss.
    ///
    /// Returns `Ok(None)` when the upstream has nothing for the key (or the
    /// fetch timed out). Nothing is stored in that case and a later call will
    /// ask the upstream again.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Upstream`] if the upstream fails. The store is
    /// left untouched and the cache remains usable.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<U::Value>>, CacheError<U::Error>> {
        self.lookup(key).await.map(Lookup::into_value)
    }

    /// Like [`get`](Self::get), but reports whether the value was a hit, a
    /// resolved miss or an unresolved miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Upstream`] if the upstream fails.
    pub async fn lookup(&self, key: &str) -> Result<Lookup<U::Value>, CacheError<U::Error>> {
        if let Some(value) = self.stored_hit(key) {
            return Ok(Lookup::Hit(value));
        }

        let in_flight = InFlight::enter(&self.in_flight, key);
        let _permit = in_flight.gate.lock().await;

        // Another caller may have resolved the key while we queued on the gate.
        if let Some(value) = self.stored_hit(key) {
            return Ok(Lookup::Hit(value));
        }

        self.fetch(key).await
    }

    /// Returns the stored value for `key` without ever contacting the upstream.
    pub fn peek(&self, key: &str) -> Option<Arc<U::Value>> {
        read(&self.entries).get(key).cloned()
    }

    /// Returns `true` if `key` is stored.
    pub fn contains_key(&self, key: &str) -> bool {
        read(&self.entries).contains_key(key)
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    /// Returns `true` if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }

    /// Returns the injected upstream.
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            unresolved: c.unresolved.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn stored_hit(&self, key: &str) -> Option<Arc<U::Value>> {
        let value = self.peek(key)?;
        Counters::bump(&self.counters.hits);
        trace!(key, "cache hit");
        Some(value)
    }

    // Must only be called while holding the key's gate.
    async fn fetch(&self, key: &str) -> Result<Lookup<U::Value>, CacheError<U::Error>> {
        Counters::bump(&self.counters.misses);
        debug!(key, "cache miss — fetching from upstream");

        let fetched = match self.config.timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, self.upstream.try_fetch(key)).await {
                    Ok(result) => result,
                    Err(_) => {
                        Counters::bump(&self.counters.timeouts);
                        warn!(key, timeout = ?limit, "upstream fetch timed out — nothing stored");
                        return Ok(Lookup::Unresolved);
                    }
                }
            }
            None => self.upstream.try_fetch(key).await,
        };

        match fetched {
            Ok(Fetched::Found(value)) => {
                let value = Arc::new(value);
                write(&self.entries).insert(key.to_owned(), Arc::clone(&value));
                debug!(key, "stored upstream value");
                Ok(Lookup::Resolved(value))
            }
            Ok(Fetched::Unavailable) => {
                Counters::bump(&self.counters.unresolved);
                debug!(key, "upstream has no value");
                Ok(Lookup::Unresolved)
            }
            Err(source) => {
                Counters::bump(&self.counters.errors);
                warn!(key, error = %source, "upstream fetch failed");
                Err(CacheError::Upstream {
                    key: key.to_owned(),
                    source,
                })
            }
        }
    }
}

impl<U: Upstream> std::fmt::Debug for ReadThroughCache<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Registration of one caller in the per-key gate table.
///
/// Dropping it (including when the caller's future is cancelled mid-fetch)
/// removes the key's gate once no other caller holds it.
struct InFlight<'a> {
    table: &'a Mutex<HashMap<String, GateSlot>>,
    key: &'a str,
    gate: Gate,
}

impl<'a> InFlight<'a> {
    fn enter(table: &'a Mutex<HashMap<String, GateSlot>>, key: &'a str) -> Self {
        let mut table_guard = lock(table);
        let slot = table_guard.entry(key.to_owned()).or_default();
        slot.holders += 1;
        let gate = Arc::clone(&slot.gate);
        drop(table_guard);
        Self { table, key, gate }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut table = lock(self.table);
        // The holder count is only changed under the table lock, so the last
        // caller out always sees zero.
        let empty = table.get_mut(self.key).is_some_and(|slot| {
            slot.holders = slot.holders.saturating_sub(1);
            slot.holders == 0
        });
        if empty {
            table.remove(self.key);
        }
    }
}

// The guarded maps are only ever touched by single insert/lookup calls, so a
// panic elsewhere cannot leave them half-updated.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Thing {
        id: String,
    }

    impl Thing {
        fn new(id: &str) -> Self {
            Self { id: id.to_owned() }
        }
    }

    #[derive(Debug, Error)]
    #[error("thing service unreachable")]
    struct Unreachable;

    #[derive(Clone)]
    enum Answer {
        Found(Thing),
        Missing,
        Broken,
    }

    /// Scripted upstream that records how often each key was requested.
    /// Keys without a script answer `Missing`.
    #[derive(Default)]
    struct FakeThingService {
        answers: Mutex<HashMap<String, Answer>>,
        calls: Mutex<HashMap<String, usize>>,
        delay: Option<Duration>,
    }

    impl FakeThingService {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn answer(&self, key: &str, answer: Answer) {
            self.answers.lock().unwrap().insert(key.to_owned(), answer);
        }

        fn calls(&self, key: &str) -> usize {
            self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    impl Upstream for FakeThingService {
        type Value = Thing;
        type Error = Unreachable;

        fn try_fetch<'a>(
            &'a self,
            key: &'a str,
        ) -> BoxFuture<'a, Result<Fetched<Thing>, Unreachable>> {
            Box::pin(async move {
                *self.calls.lock().unwrap().entry(key.to_owned()).or_default() += 1;
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                let answer = self.answers.lock().unwrap().get(key).cloned();
                match answer {
                    Some(Answer::Found(thing)) => Ok(Fetched::Found(thing)),
                    Some(Answer::Missing) | None => Ok(Fetched::Unavailable),
                    Some(Answer::Broken) => Err(Unreachable),
                }
            })
        }
    }

    const DRESS: &str = "TheDress";
    const BOOTS: &str = "CoolBoots";

    // ── Single caller ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_cache_miss_returns_none_after_one_call() {
        let cache = ReadThroughCache::new(FakeThingService::default());

        assert_eq!(cache.get(DRESS).await.unwrap(), None);
        assert_eq!(cache.upstream().calls(DRESS), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn resolved_key_is_fetched_exactly_once() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        for _ in 0..5 {
            let thing = cache.get(DRESS).await.unwrap().unwrap();
            assert_eq!(*thing, Thing::new(DRESS));
        }
        assert_eq!(cache.upstream().calls(DRESS), 1);
    }

    #[tokio::test]
    async fn hits_share_the_stored_value() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        let first = cache.lookup(DRESS).await.unwrap();
        let second = cache.lookup(DRESS).await.unwrap();

        assert!(matches!(first, Lookup::Resolved(_)));
        assert!(second.is_hit());
        assert!(Arc::ptr_eq(first.value().unwrap(), second.value().unwrap()));
    }

    #[tokio::test]
    async fn unavailable_is_not_cached_and_retried() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer("X", Answer::Missing);

        assert_eq!(cache.lookup("X").await.unwrap(), Lookup::Unresolved);
        assert!(!cache.contains_key("X"));

        cache.upstream().answer("X", Answer::Found(Thing::new("X")));
        assert!(matches!(cache.lookup("X").await.unwrap(), Lookup::Resolved(_)));
        assert!(cache.lookup("X").await.unwrap().is_hit());

        assert_eq!(cache.upstream().calls("X"), 2);
    }

    #[tokio::test]
    async fn keys_are_fetched_independently() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));
        cache.upstream().answer(BOOTS, Answer::Found(Thing::new(BOOTS)));

        let dress = cache.get(DRESS).await.unwrap().unwrap();
        assert_eq!(cache.upstream().calls(BOOTS), 0);
        let boots = cache.get(BOOTS).await.unwrap().unwrap();

        assert_eq!(dress.id, DRESS);
        assert_eq!(boots.id, BOOTS);
        assert_eq!(cache.upstream().calls(DRESS), 1);
        assert_eq!(cache.upstream().calls(BOOTS), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn call_count_tracks_each_keys_own_misses() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(BOOTS, Answer::Found(Thing::new(BOOTS)));

        for _ in 0..3 {
            cache.get(DRESS).await.unwrap();
            cache.get(BOOTS).await.unwrap();
        }

        assert_eq!(cache.upstream().calls(DRESS), 3);
        assert_eq!(cache.upstream().calls(BOOTS), 1);
    }

    #[tokio::test]
    async fn stored_value_survives_upstream_changes() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer("K", Answer::Found(Thing::new("v1")));
        cache.get("K").await.unwrap();

        cache.upstream().answer("K", Answer::Found(Thing::new("v2")));
        for _ in 0..3 {
            assert_eq!(cache.get("K").await.unwrap().unwrap().id, "v1");
        }
        assert_eq!(cache.upstream().calls("K"), 1);
    }

    #[tokio::test]
    async fn empty_string_is_an_ordinary_key() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer("", Answer::Found(Thing::new("")));

        assert!(cache.get("").await.unwrap().is_some());
        assert!(cache.lookup("").await.unwrap().is_hit());
        assert_eq!(cache.upstream().calls(""), 1);
    }

    #[tokio::test]
    async fn upstream_error_propagates_without_storing() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Broken);

        let err = cache.get(DRESS).await.unwrap_err();
        assert!(matches!(&err, CacheError::Upstream { key, .. } if key == DRESS));
        assert!(err.to_string().contains("thing service unreachable"));
        assert!(cache.is_empty());

        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));
        assert!(cache.get(DRESS).await.unwrap().is_some());
        assert_eq!(cache.upstream().calls(DRESS), 2);
    }

    #[tokio::test]
    async fn peek_never_contacts_upstream() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        assert!(cache.peek(DRESS).is_none());
        assert_eq!(cache.upstream().total_calls(), 0);

        cache.get(DRESS).await.unwrap();
        assert_eq!(cache.peek(DRESS).unwrap().id, DRESS);
        assert_eq!(cache.upstream().total_calls(), 1);
    }

    #[tokio::test]
    async fn stats_count_each_outcome() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));
        cache.upstream().answer(BOOTS, Answer::Broken);

        cache.get(DRESS).await.unwrap();
        cache.get(DRESS).await.unwrap();
        cache.get("nothing").await.unwrap();
        let _ = cache.get(BOOTS).await;

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 3,
                unresolved: 1,
                timeouts: 0,
                errors: 1,
                entries: 1,
            }
        );
    }

    #[tokio::test]
    async fn timed_out_fetch_behaves_like_unavailable() {
        let config = CacheConfig::new().fetch_timeout(Duration::from_millis(20));
        let cache = ReadThroughCache::with_config(
            FakeThingService::slow(Duration::from_secs(5)),
            config,
        );
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        assert_eq!(cache.lookup(DRESS).await.unwrap(), Lookup::Unresolved);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn gate_table_is_emptied_after_fetch() {
        let cache = ReadThroughCache::new(FakeThingService::default());
        cache.get(DRESS).await.unwrap();
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[test]
    fn gate_is_released_whichever_caller_leaves_last() {
        let table = Mutex::new(HashMap::new());

        let first = InFlight::enter(&table, DRESS);
        let second = InFlight::enter(&table, DRESS);
        assert!(Arc::ptr_eq(&first.gate, &second.gate));
        assert_eq!(table.lock().unwrap()[DRESS].holders, 2);

        drop(first);
        assert_eq!(table.lock().unwrap()[DRESS].holders, 1);
        drop(second);
        assert!(table.lock().unwrap().is_empty());

        // Same again, leaving in the opposite order while a third caller
        // still holds its own handle to the gate.
        let first = InFlight::enter(&table, DRESS);
        let second = InFlight::enter(&table, DRESS);
        let handle = Arc::clone(&second.gate);
        drop(second);
        drop(first);
        assert!(table.lock().unwrap().is_empty());
        drop(handle);
    }

    #[test]
    fn late_caller_after_release_gets_a_fresh_gate() {
        let table = Mutex::new(HashMap::new());

        let first = InFlight::enter(&table, DRESS);
        let old = Arc::clone(&first.gate);
        drop(first);

        let second = InFlight::enter(&table, DRESS);
        assert!(!Arc::ptr_eq(&old, &second.gate));
        assert_eq!(table.lock().unwrap()[DRESS].holders, 1);
    }

    #[tokio::test]
    async fn cancelled_fetch_stores_nothing_and_releases_gate() {
        let cache = Arc::new(ReadThroughCache::new(FakeThingService::slow(
            Duration::from_secs(5),
        )));
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        let task = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get(DRESS).await }
        });
        while cache.upstream().calls(DRESS) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(cache.is_empty());
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_caller_fetches_after_first_is_cancelled() {
        let cache = Arc::new(ReadThroughCache::new(FakeThingService::slow(
            Duration::from_millis(300),
        )));
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get(DRESS).await }
        });
        while cache.upstream().calls(DRESS) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get(DRESS).await }
        });
        while cache.in_flight.lock().unwrap().get(DRESS).map(|slot| slot.holders) != Some(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let thing = second.await.unwrap().unwrap().unwrap();
        assert_eq!(thing.id, DRESS);
        assert_eq!(cache.upstream().calls(DRESS), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    // ── Concurrent callers ────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_on_one_key_fetch_once() {
        let cache = Arc::new(ReadThroughCache::new(FakeThingService::slow(
            Duration::from_millis(50),
        )));
        cache.upstream().answer(DRESS, Answer::Found(Thing::new(DRESS)));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(DRESS).await.unwrap() })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().id, DRESS);
        }
        assert_eq!(cache.upstream().calls(DRESS), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_on_distinct_keys_run_in_parallel() {
        use tokio::sync::Barrier;

        // Each fetch waits until both are in flight, so serialized fetching
        // would never finish.
        let barrier = Arc::new(Barrier::new(2));
        let upstream = upstream_fn(move |key: String| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok::<_, Unreachable>(Fetched::Found(key))
            }
        });
        let cache = Arc::new(ReadThroughCache::new(upstream));

        let a = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get("A").await.unwrap() }
        });
        let b = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get("B").await.unwrap() }
        });

        let both = tokio::time::timeout(Duration::from_secs(5), async {
            (a.await.unwrap(), b.await.unwrap())
        })
        .await
        .expect("distinct keys were fetched one after another");

        assert_eq!(both.0.as_deref().map(String::as_str), Some("A"));
        assert_eq!(both.1.as_deref().map(String::as_str), Some("B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_unavailable_is_retried_by_waiters() {
        let cache = Arc::new(ReadThroughCache::new(FakeThingService::slow(
            Duration::from_millis(20),
        )));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("X").await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_none());
        }

        // Every waiter found nothing stored and asked again, one at a time.
        assert_eq!(cache.upstream().calls("X"), 4);
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn contended_keys_leave_no_gates_behind() {
        let cache = Arc::new(ReadThroughCache::new(FakeThingService::default()));

        for round in 0..200 {
            let key = format!("key-{round}");
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let cache = Arc::clone(&cache);
                    let key = key.clone();
                    tokio::spawn(async move { cache.get(&key).await.unwrap() })
                })
                .collect();
            for task in tasks {
                assert!(task.await.unwrap().is_none());
            }
        }

        assert!(cache.in_flight.lock().unwrap().is_empty());
        assert!(cache.is_empty());
    }
}
