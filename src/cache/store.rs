//! Query cache storage.
//!
//! One map from key to entry. Each entry carries the last resolved value, the
//! last error, the time the last attempt settled and the attempt currently in
//! flight, if any.

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::QueryConfig;
use super::error::{FetchError, QueryError};
use super::keys::QueryKey;

const METRIC_FRESH_HIT: &str = "costboard_query_fresh_hit_total";
const METRIC_COALESCED: &str = "costboard_query_coalesced_total";
const METRIC_ATTEMPT: &str = "costboard_query_attempt_total";
const METRIC_FAILURE: &str = "costboard_query_failure_total";
const METRIC_INVALIDATE: &str = "costboard_query_invalidate_total";
const METRIC_ATTEMPT_MS: &str = "costboard_query_attempt_ms";

type ErasedValue = Arc<dyn Any + Send + Sync>;
type AttemptResult = Result<ErasedValue, FetchError>;
type PendingFuture = Shared<BoxFuture<'static, AttemptResult>>;

/// Per-call fetch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Cached data younger than this is returned without calling the fetcher.
    /// `None` or zero always goes to the fetcher (or joins the pending attempt).
    pub stale_time: Option<Duration>,
}

impl FetchOptions {
    pub fn stale_for(stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
        }
    }
}

/// Point-in-time view of one entry, read under a single lock.
#[derive(Debug)]
pub struct EntrySnapshot<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    key: Arc<str>,
    value_type: TypeId,
}

impl SlotKey {
    fn of<T: 'static>(key: &QueryKey<T>) -> Self {
        Self {
            key: key.shared(),
            value_type: TypeId::of::<T>(),
        }
    }
}

/// Outcome of the most recent completed attempt.
///
/// `data` survives a failed attempt; `error` is cleared only by a success.
struct Settled {
    data: Option<ErasedValue>,
    error: Option<FetchError>,
    at: Instant,
}

struct Pending {
    attempt: u64,
    future: PendingFuture,
}

#[derive(Default)]
struct Slot {
    settled: Option<Settled>,
    pending: Option<Pending>,
}

impl Slot {
    fn fresh_data(&self, stale_time: Option<Duration>, now: Instant) -> Option<ErasedValue> {
        let window = stale_time.filter(|window| !window.is_zero())?;
        let settled = self.settled.as_ref()?;
        let data = settled.data.as_ref()?;
        (now.saturating_duration_since(settled.at) < window).then(|| Arc::clone(data))
    }
}

enum Lookup {
    Fresh(ErasedValue),
    Joined(u64, PendingFuture),
    Started(u64, PendingFuture, oneshot::Sender<AttemptResult>),
}

#[derive(Default)]
struct Inner {
    config: QueryConfig,
    slots: DashMap<SlotKey, Slot>,
    attempts: AtomicU64,
}

/// Process-wide query cache.
///
/// Cloning is cheap and every clone shares the same entries. A fresh cache is
/// empty and needs no teardown.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with explicit defaults.
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                ..Inner::default()
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Resolve `key`, going to `fetcher` only when needed.
    ///
    /// Fresh data (younger than `options.stale_time`) is returned as is. An
    /// attempt already in flight for the key is joined instead of starting a
    /// second one. Otherwise `fetcher` runs as a detached task that always
    /// settles into the cache, even if every caller stops waiting.
    ///
    /// The fetcher's error reaches the caller unchanged.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey<T>,
        fetcher: F,
        options: FetchOptions,
    ) -> Result<Arc<T>, FetchError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let slot_key = SlotKey::of(key);

        // The pending check and the registration of a new attempt happen under
        // the same shard lock.
        let lookup = {
            let mut slot = self.inner.slots.entry(slot_key.clone()).or_default();
            if let Some(data) = slot.fresh_data(options.stale_time, Instant::now()) {
                Lookup::Fresh(data)
            } else if let Some(pending) = slot.pending.as_ref() {
                Lookup::Joined(pending.attempt, pending.future.clone())
            } else {
                let attempt = self.inner.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                let (tx, rx) = oneshot::channel();
                let future = waiter(key.as_str(), rx);
                slot.pending = Some(Pending {
                    attempt,
                    future: future.clone(),
                });
                Lookup::Started(attempt, future, tx)
            }
        };

        let pending = match lookup {
            Lookup::Fresh(data) => {
                counter!(METRIC_FRESH_HIT).increment(1);
                debug!(key = %key, "serving fresh cached data");
                return downcast(key, data);
            }
            Lookup::Joined(attempt, future) => {
                counter!(METRIC_COALESCED).increment(1);
                debug!(key = %key, attempt, "joining in-flight fetch");
                future
            }
            Lookup::Started(attempt, future, tx) => {
                self.spawn_attempt(slot_key, attempt, fetcher, tx);
                future
            }
        };

        let value = pending.await?;
        downcast(key, value)
    }

    /// Last successfully resolved value for `key`.
    pub fn peek_data<T: Send + Sync + 'static>(&self, key: &QueryKey<T>) -> Option<Arc<T>> {
        let slot = self.inner.slots.get(&SlotKey::of(key))?;
        let data = slot.settled.as_ref()?.data.clone()?;
        drop(slot);
        data.downcast::<T>().ok()
    }

    /// Error of the last failed attempt for `key`, until a success clears it.
    pub fn peek_error<T: 'static>(&self, key: &QueryKey<T>) -> Option<FetchError> {
        let slot = self.inner.slots.get(&SlotKey::of(key))?;
        slot.settled.as_ref()?.error.clone()
    }

    /// Read data, error, settle time and in-flight state together.
    pub fn snapshot<T: Send + Sync + 'static>(&self, key: &QueryKey<T>) -> Option<EntrySnapshot<T>> {
        let slot = self.inner.slots.get(&SlotKey::of(key))?;
        let is_fetching = slot.pending.is_some();
        let (data, error, updated_at) = match slot.settled.as_ref() {
            Some(settled) => (settled.data.clone(), settled.error.clone(), Some(settled.at)),
            None => (None, None, None),
        };
        drop(slot);

        Some(EntrySnapshot {
            data: data.and_then(|data| data.downcast::<T>().ok()),
            error,
            updated_at,
            is_fetching,
        })
    }

    /// Data for `key` if it is younger than `stale_time`, without fetching.
    pub fn peek_fresh<T: Send + Sync + 'static>(
        &self,
        key: &QueryKey<T>,
        stale_time: Option<Duration>,
    ) -> Option<Arc<T>> {
        let slot = self.inner.slots.get(&SlotKey::of(key))?;
        let data = slot.fresh_data(stale_time, Instant::now())?;
        drop(slot);
        data.downcast::<T>().ok()
    }

    /// Drop the entry for `key`, including its pending marker.
    ///
    /// An attempt already in flight keeps running and settles into a new entry.
    pub fn invalidate(&self, key: &str) {
        let before = self.inner.slots.len();
        self.inner.slots.retain(|slot_key, _| slot_key.key.as_ref() != key);
        let removed = before.saturating_sub(self.inner.slots.len());
        counter!(METRIC_INVALIDATE, "scope" => "key").increment(1);
        debug!(key, removed, "invalidated cache key");
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.inner.slots.clear();
        counter!(METRIC_INVALIDATE, "scope" => "all").increment(1);
        debug!("invalidated entire query cache");
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    fn spawn_attempt<T, F, Fut>(
        &self,
        slot_key: SlotKey,
        attempt: u64,
        fetcher: F,
        tx: oneshot::Sender<AttemptResult>,
    ) where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        counter!(METRIC_ATTEMPT).increment(1);
        debug!(key = %slot_key.key, attempt, "starting fetch attempt");

        let mut guard = AttemptGuard {
            cache: self.clone(),
            slot_key,
            attempt,
            tx: Some(tx),
        };
        tokio::spawn(async move {
            let started_at = Instant::now();
            let result = fetcher()
                .await
                .map(|value| Arc::new(value) as ErasedValue);
            histogram!(METRIC_ATTEMPT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
            guard.complete(result);
        });
    }

    /// Record the outcome of `attempt`.
    ///
    /// Data, error and timestamp change together with the pending marker, which
    /// is cleared only if it still belongs to this attempt.
    fn settle(&self, slot_key: &SlotKey, attempt: u64, result: &AttemptResult) {
        {
            let mut slot = self.inner.slots.entry(slot_key.clone()).or_default();
            let previous = slot.settled.take();
            let at = Instant::now();
            slot.settled = Some(match result {
                Ok(value) => Settled {
                    data: Some(Arc::clone(value)),
                    error: None,
                    at,
                },
                Err(error) => Settled {
                    data: previous.and_then(|settled| settled.data),
                    error: Some(Arc::clone(error)),
                    at,
                },
            });
            if slot
                .pending
                .as_ref()
                .is_some_and(|pending| pending.attempt == attempt)
            {
                slot.pending = None;
            }
        }

        match result {
            Ok(_) => debug!(key = %slot_key.key, attempt, "fetch attempt settled"),
            Err(error) => {
                counter!(METRIC_FAILURE).increment(1);
                warn!(key = %slot_key.key, attempt, error = %error, "fetch attempt failed");
            }
        }
    }
}

/// Settles its attempt exactly once, including when the fetch task unwinds or
/// is dropped before finishing.
struct AttemptGuard {
    cache: QueryCache,
    slot_key: SlotKey,
    attempt: u64,
    tx: Option<oneshot::Sender<AttemptResult>>,
}

impl AttemptGuard {
    fn complete(&mut self, result: AttemptResult) {
        self.cache.settle(&self.slot_key, self.attempt, &result);
        if let Some(tx) = self.tx.take() {
            // Nobody waiting is fine; the entry already holds the outcome.
            let _ = tx.send(result);
        }
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let error = QueryError::abandoned(self.slot_key.key.as_ref()).shared();
            self.complete(Err(error));
        }
    }
}

fn waiter(key: &str, rx: oneshot::Receiver<AttemptResult>) -> PendingFuture {
    let key = key.to_string();
    async move {
        rx.await
            .unwrap_or_else(|_| Err(QueryError::abandoned(key).shared()))
    }
    .boxed()
    .shared()
}

fn downcast<T: Send + Sync + 'static>(
    key: &QueryKey<T>,
    value: ErasedValue,
) -> Result<Arc<T>, FetchError> {
    value
        .downcast::<T>()
        .map_err(|_| QueryError::type_mismatch(key.as_str()).shared())
}
