//! Consumer binding over the query cache.
//!
//! A [`QueryObserver`] follows one query for one consumer. It projects the
//! cache into `{data, error, is_loading}`, re-fetches when the query's key or
//! options change, and drops results that arrive after it moved on.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::error::{FetchError, QueryError};
use super::keys::QueryKey;
use super::liveness::{Activation, ActivationToken};
use super::store::{FetchOptions, QueryCache};

/// Zero-argument function producing one fetch attempt.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// Options of an observed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserveOptions {
    pub enabled: bool,
    /// `None` uses the cache's configured default; zero always refetches.
    pub stale_time: Option<Duration>,
    /// Changing any of these re-runs the fetch sequence.
    pub deps: Vec<String>,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
            deps: Vec::new(),
        }
    }
}

/// Query descriptor: what to fetch, how, and under which options.
pub struct Query<T> {
    pub key: QueryKey<T>,
    pub fetcher: Fetcher<T>,
    pub options: ObserveOptions,
}

impl<T: Send + 'static> Query<T> {
    pub fn new<F, Fut>(key: QueryKey<T>, fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self {
            key,
            fetcher: Arc::new(move || fetcher().boxed()),
            options: ObserveOptions::default(),
        }
    }
}

impl<T> Query<T> {
    pub fn with_options(mut self, options: ObserveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.options.stale_time = Some(stale_time);
        self
    }

    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.deps = deps.into_iter().map(Into::into).collect();
        self
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: Arc::clone(&self.fetcher),
            options: self.options.clone(),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// What a consumer sees of its query.
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    pub is_loading: bool,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("data", &self.data)
            .field("error", &self.error.as_ref().map(ToString::to_string))
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

/// Binds one query to one consumer's lifecycle.
///
/// Each activation owns an [`Activation`]; background fetches write the
/// projection only while their token is live. Re-activating, deactivating or
/// dropping the observer kills the previous token. The cache entry is still
/// updated by those fetches.
///
/// Constructing or re-activating an observer spawns onto the current Tokio
/// runtime.
pub struct QueryObserver<T> {
    cache: QueryCache,
    query: Query<T>,
    state: Arc<watch::Sender<QueryState<T>>>,
    activation: Option<Activation>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub fn new(cache: QueryCache, query: Query<T>) -> Self {
        let (state, _) = watch::channel(cached_state(&cache, &query));
        let mut observer = Self {
            cache,
            query,
            state: Arc::new(state),
            activation: None,
        };
        observer.activate();
        observer
    }

    /// Re-declare the query. A new key, new options or a previously
    /// deactivated observer re-runs the fetch sequence; otherwise only the
    /// fetcher is replaced.
    pub fn observe(&mut self, query: Query<T>) -> QueryState<T> {
        let key_changed = query.key != self.query.key;
        let restart =
            key_changed || query.options != self.query.options || self.activation.is_none();
        self.query = query;

        if key_changed {
            self.activation = None;
            self.state.send_replace(cached_state(&self.cache, &self.query));
        }
        if restart {
            self.activate();
        }
        self.state()
    }

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub fn query(&self) -> &Query<T> {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        self.activation.is_some()
    }

    /// Wait until no attempt is outstanding for this observer.
    pub async fn settled(&self) -> QueryState<T> {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.is_loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Invalidate the key and fetch it again.
    ///
    /// The fetch and the projection run on their own task, so dropping this
    /// future still settles the observer. A disabled query returns what it
    /// already shows without touching the cache.
    pub async fn refetch(&self) -> Result<Option<Arc<T>>, FetchError> {
        if !self.query.options.enabled {
            return Ok(self.state.borrow().data.clone());
        }

        let key = self.query.key.clone();
        self.cache.invalidate(key.as_str());

        let token = self.activation.as_ref().map(Activation::token);
        if let Some(token) = &token {
            self.state.send_if_modified(|state| {
                token.is_live() && !std::mem::replace(&mut state.is_loading, true)
            });
        }

        let cache = self.cache.clone();
        let fetcher = Arc::clone(&self.query.fetcher);
        let state = Arc::clone(&self.state);
        let options = self.fetch_options();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = cache
                .fetch(&task_key, move || (*fetcher)(), options)
                .await;
            if let Some(token) = &token {
                project(&state, token, &task_key, result.clone());
            }
            result
        });

        match handle.await {
            Ok(result) => result.map(Some),
            Err(err) => {
                debug!(key = %key, error = %err, "refetch task did not finish");
                Err(QueryError::abandoned(key.as_str()).shared())
            }
        }
    }

    /// Stop writing results into the projection until the next `observe`.
    pub fn deactivate(&mut self) {
        if self.activation.take().is_some() {
            self.state
                .send_if_modified(|state| std::mem::replace(&mut state.is_loading, false));
            debug!(key = %self.query.key, "observer deactivated");
        }
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            stale_time: self
                .query
                .options
                .stale_time
                .or_else(|| self.cache.config().default_stale_time()),
        }
    }

    fn activate(&mut self) {
        let activation = Activation::new();
        let token = activation.token();
        self.activation = Some(activation);

        if !self.query.options.enabled {
            self.state
                .send_if_modified(|state| std::mem::replace(&mut state.is_loading, false));
            trace!(key = %self.query.key, "query disabled");
            return;
        }

        let options = self.fetch_options();
        if let Some(data) = self.cache.peek_fresh(&self.query.key, options.stale_time) {
            self.state.send_modify(|state| {
                state.data = Some(data);
                state.error = None;
                state.is_loading = false;
            });
            return;
        }

        self.state
            .send_if_modified(|state| !std::mem::replace(&mut state.is_loading, true));

        let cache = self.cache.clone();
        let key = self.query.key.clone();
        let fetcher = Arc::clone(&self.query.fetcher);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let result = cache.fetch(&key, move || (*fetcher)(), options).await;
            project(&state, &token, &key, result);
        });
    }
}

/// Projection a consumer starts from before any fetch of its own.
fn cached_state<T: Send + Sync + 'static>(cache: &QueryCache, query: &Query<T>) -> QueryState<T> {
    if !query.options.enabled {
        return QueryState::default();
    }
    QueryState {
        data: cache.peek_data(&query.key),
        error: cache.peek_error(&query.key),
        is_loading: false,
    }
}

/// Apply a settled attempt if `token` is still live. The check and the write
/// happen under the channel's lock.
fn project<T>(
    state: &watch::Sender<QueryState<T>>,
    token: &ActivationToken,
    key: &QueryKey<T>,
    result: Result<Arc<T>, FetchError>,
) -> bool {
    let mut applied = false;
    state.send_if_modified(|current| {
        if !token.is_live() {
            return false;
        }
        match &result {
            Ok(data) => {
                current.data = Some(Arc::clone(data));
                current.error = None;
            }
            Err(error) => current.error = Some(Arc::clone(error)),
        }
        current.is_loading = false;
        applied = true;
        true
    });

    if !applied {
        debug!(key = %key, "discarding result for inactive observer");
    }
    applied
}
