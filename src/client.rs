//! # Query Cache and Subscription Broker
//!
//! This module implements the central [`QueryClient`]: a shared, in-memory
//! cache of query state keyed by [`QueryKey`], supporting:
//! - **Staleness**: Cached data is served without refetching until the
//!   configured stale time elapses.
//! - **Request de-duplication**: Concurrent fetches for one key collapse into
//!   a single shared in-flight future.
//! - **Invalidation**: Entries matching a key prefix are marked stale so the
//!   next fetch hits the network again.
//! - **Subscriptions**: Per-key listeners are notified on every state change.
//!
//! Entries are created lazily on first access and live for the lifetime of
//! the client; there is no eviction. The client is a cheap `Clone` handle,
//! safe to share across tasks.
//!
//! ## Example
//! ```rust,no_run
//! use query_broker::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> QueryResult<()> {
//! let client = QueryClient::with_defaults(QueryOptions::new(Duration::from_secs(60)));
//! let tasks: Vec<u64> = client
//!     .fetch_query(query_key!["tasks", "tok1"], || async { Ok(vec![1, 2, 3]) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    errors::{QueryError, QueryResult},
    key::QueryKey,
    state::{ErasedData, QuerySnapshot, QueryStatus},
};

/// A callback subscribed to one key's state changes
pub type QueryListener = Arc<dyn Fn(QuerySnapshot) + Send + Sync>;

/// The in-flight promise slot: every concurrent caller awaits the same
/// shared future and receives the same settlement.
type SharedFetch = Shared<BoxFuture<'static, Result<ErasedData, QueryError>>>;

type Notification = (Vec<QueryListener>, QuerySnapshot);

/// Per-query configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a successful fetch stays fresh. `Duration::ZERO` means data
    /// is always refetched on access; `Duration::MAX` means it never goes
    /// stale once fetched.
    pub stale_time: Duration,
}

impl QueryOptions {
    /// Data is refetched on every access
    pub const ALWAYS_STALE: Self = Self {
        stale_time: Duration::ZERO,
    };

    /// Data never goes stale once successfully fetched
    pub const NEVER_STALE: Self = Self {
        stale_time: Duration::MAX,
    };

    /// Options with the given stale time
    pub fn new(stale_time: Duration) -> Self {
        Self { stale_time }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::ALWAYS_STALE
    }
}

/// One cache entry: the owning key, the last result, subscribers, and the
/// in-flight promise slot.
struct QueryEntry {
    key: QueryKey,
    status: QueryStatus,
    data: Option<ErasedData>,
    error: Option<QueryError>,
    updated_at: Option<Instant>,
    listeners: Vec<(u64, QueryListener)>,
    promise: Option<SharedFetch>,
    fetch_generation: u64,
}

impl QueryEntry {
    fn new(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            listeners: Vec::new(),
            promise: None,
            fetch_generation: 0,
        }
    }

    /// Fresh means: last fetch succeeded, the entry has not been invalidated,
    /// and less than `stale_time` has elapsed since completion.
    fn is_fresh(&self, stale_time: Duration) -> bool {
        self.status == QueryStatus::Success
            && self
                .updated_at
                .is_some_and(|updated_at| updated_at.elapsed() < stale_time)
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            key: self.key.clone(),
            status: self.status,
            error: self.error.clone(),
            updated_at: self.updated_at,
            data: self.data.clone(),
        }
    }

    fn listener_handles(&self) -> Vec<QueryListener> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

enum FetchPlan {
    /// Fresh cached data, no fetch needed
    Cached(ErasedData),
    /// Await a fetch (newly started or already in flight)
    Join(SharedFetch),
}

/// Central authority over cached query state
///
/// All mutations of cache entries go through this type; listeners registered
/// via [`subscribe`](QueryClient::subscribe) observe every change. Cloning
/// produces another handle to the same cache.
#[derive(Clone, Default)]
pub struct QueryClient {
    cache: Arc<Mutex<HashMap<QueryKey, QueryEntry>>>,
    listener_seq: Arc<AtomicU64>,
    defaults: QueryOptions,
}

impl QueryClient {
    /// Creates a client whose default options consider data always stale
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client with the given default query options
    pub fn with_defaults(defaults: QueryOptions) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    /// The client-wide default options configured at construction
    pub fn default_options(&self) -> QueryOptions {
        self.defaults
    }

    /// Fetches a query using the client's default options
    ///
    /// See [`fetch_query_with`](QueryClient::fetch_query_with).
    pub async fn fetch_query<T, F, Fut>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
    ) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        self.fetch_inner(key.into(), query_fn, self.defaults.stale_time, false)
            .await
    }

    /// Fetches a query, serving cached data when it is still fresh
    ///
    /// # Arguments
    ///
    /// * `key` - The query key identifying the cache entry.
    /// * `query_fn` - Async producer of the data; invoked only when a fetch
    ///   is actually started.
    /// * `options` - Staleness configuration for this call.
    ///
    /// # Returns
    ///
    /// The cached or freshly fetched data, or the producer's error.
    ///
    /// # Behavior
    ///
    /// - If a fetch is already in flight for `key`, awaits it instead of
    ///   starting another (`query_fn` is not invoked).
    /// - If cached data exists and is not stale, returns it without invoking
    ///   `query_fn`.
    /// - Otherwise marks the entry `Loading`, notifies subscribers, runs
    ///   `query_fn`, stores the result, and notifies subscribers exactly once
    ///   more after settling. The producer's failure is propagated to every
    ///   caller awaiting the shared fetch; prior data is retained on failure.
    pub async fn fetch_query_with<T, F, Fut>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: QueryOptions,
    ) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        self.fetch_inner(key.into(), query_fn, options.stale_time, false)
            .await
    }

    /// Forces a fetch, bypassing both the staleness check and the in-flight
    /// promise slot
    pub async fn refetch_query<T, F, Fut>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
    ) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        self.fetch_inner(key.into(), query_fn, self.defaults.stale_time, true)
            .await
    }

    /// Forced variant of [`fetch_query_with`](QueryClient::fetch_query_with)
    pub async fn refetch_query_with<T, F, Fut>(
        &self,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: QueryOptions,
    ) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        self.fetch_inner(key.into(), query_fn, options.stale_time, true)
            .await
    }

    async fn fetch_inner<T, F, Fut>(
        &self,
        key: QueryKey,
        query_fn: F,
        stale_time: Duration,
        force: bool,
    ) -> QueryResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        let mut loading_notification = None;
        let plan = {
            let Ok(mut cache) = self.cache.lock() else {
                return Err(QueryError::Cache("query cache lock poisoned".to_string()));
            };
            let entry = cache
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(key.clone()));

            'plan: {
                if !force {
                    if let Some(promise) = entry.promise.clone() {
                        debug!("⏳ [QUERY-DEDUP] joining in-flight fetch for key: {key}");
                        break 'plan FetchPlan::Join(promise);
                    }
                    if entry.is_fresh(stale_time) {
                        if let Some(data) = entry.data.clone() {
                            debug!("📦 [QUERY-CACHE] serving fresh data for key: {key}");
                            break 'plan FetchPlan::Cached(data);
                        }
                    }
                }

                entry.status = QueryStatus::Loading;
                entry.fetch_generation = entry.fetch_generation.wrapping_add(1);
                let generation = entry.fetch_generation;

                let client = self.clone();
                let fetch_key = key.clone();
                // The producer runs at the shared future's first poll, never
                // under the cache lock; its closure body may use the client.
                let shared: SharedFetch = async move {
                    let result = query_fn().await.map(|value| Arc::new(value) as ErasedData);
                    client.settle(&fetch_key, generation, result)
                }
                .boxed()
                .shared();

                entry.promise = Some(shared.clone());
                loading_notification = Some((entry.listener_handles(), entry.snapshot()));
                debug!("🚀 [QUERY-FETCH] starting fetch for key: {key} (force: {force})");
                FetchPlan::Join(shared)
            }
        };

        if let Some((listeners, snapshot)) = loading_notification {
            Self::dispatch(listeners, snapshot);
        }

        let erased = match plan {
            FetchPlan::Cached(data) => Ok(data),
            FetchPlan::Join(shared) => shared.await,
        }?;

        match erased.downcast::<T>() {
            Ok(data) => Ok((*data).clone()),
            Err(_) => Err(QueryError::Cache(format!(
                "cached value for key {key} does not match the requested type"
            ))),
        }
    }

    /// Writes the fetch result into the entry and notifies subscribers.
    /// Runs exactly once per started fetch, inside the shared future, so
    /// every awaiter observes the same settlement.
    fn settle(
        &self,
        key: &QueryKey,
        generation: u64,
        result: Result<ErasedData, QueryError>,
    ) -> Result<ErasedData, QueryError> {
        let notification = {
            let Ok(mut cache) = self.cache.lock() else {
                warn!("⚠️ [QUERY-FETCH] cache lock poisoned while settling key: {key}");
                return result;
            };
            match cache.get_mut(key) {
                Some(entry) => {
                    match &result {
                        Ok(data) => {
                            entry.data = Some(Arc::clone(data));
                            entry.error = None;
                            entry.status = QueryStatus::Success;
                            entry.updated_at = Some(Instant::now());
                            debug!("✅ [QUERY-FETCH] fetch succeeded for key: {key}");
                        }
                        Err(error) => {
                            entry.error = Some(error.clone());
                            entry.status = QueryStatus::Error;
                            debug!("❌ [QUERY-FETCH] fetch failed for key: {key}: {error}");
                        }
                    }
                    // A forced refetch may have replaced the slot; only the
                    // fetch that owns it clears it.
                    if entry.fetch_generation == generation {
                        entry.promise = None;
                    }
                    Some((entry.listener_handles(), entry.snapshot()))
                }
                None => None,
            }
        };

        if let Some((listeners, snapshot)) = notification {
            Self::dispatch(listeners, snapshot);
        }

        result
    }

    /// Directly overwrites the cached data for a key
    ///
    /// Clears any error, sets status to `Success`, stamps the update time,
    /// and notifies subscribers. Applies synchronously: a `get_query_data`
    /// immediately after returns the new value.
    pub fn set_query_data<T>(&self, key: impl Into<QueryKey>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.update_query_data(key, move |_previous: Option<T>| value);
    }

    /// Overwrites the cached data for a key via an updater function
    ///
    /// The updater receives the previous value (if one of type `T` is
    /// cached) and produces the new one. Same effects as
    /// [`set_query_data`](QueryClient::set_query_data).
    pub fn update_query_data<T, F>(&self, key: impl Into<QueryKey>, updater: F)
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Option<T>) -> T,
    {
        let key = key.into();
        let notification = {
            let Ok(mut cache) = self.cache.lock() else {
                return;
            };
            let entry = cache
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(key.clone()));
            let previous = entry
                .data
                .as_ref()
                .and_then(|data| data.downcast_ref::<T>().cloned());
            entry.data = Some(Arc::new(updater(previous)));
            entry.error = None;
            entry.status = QueryStatus::Success;
            entry.updated_at = Some(Instant::now());
            debug!("📊 [QUERY-STORE] stored data for key: {key}");
            (entry.listener_handles(), entry.snapshot())
        };
        Self::dispatch(notification.0, notification.1);
    }

    /// Marks every entry whose key starts with `prefix` as stale
    ///
    /// Invalidated entries keep their data but lose their freshness: the
    /// next `fetch_query` for them runs the producer again. Subscribers of
    /// each affected entry are notified. This never refetches by itself.
    pub fn invalidate_queries(&self, prefix: impl Into<QueryKey>) {
        let prefix = prefix.into();
        let count = self.invalidate_matching(|key| key.starts_with(&prefix));
        debug!("🗑️ [QUERY-INVALIDATE] invalidated {count} entries matching prefix: {prefix}");
    }

    /// Marks every cached entry as stale
    pub fn invalidate_all(&self) {
        let count = self.invalidate_matching(|_| true);
        debug!("🗑️ [QUERY-INVALIDATE] invalidated all {count} entries");
    }

    fn invalidate_matching(&self, matches: impl Fn(&QueryKey) -> bool) -> usize {
        let notifications: Vec<Notification> = {
            let Ok(mut cache) = self.cache.lock() else {
                return 0;
            };
            cache
                .values_mut()
                .filter(|entry| matches(&entry.key))
                .map(|entry| {
                    entry.updated_at = None;
                    (entry.listener_handles(), entry.snapshot())
                })
                .collect()
        };
        let count = notifications.len();
        for (listeners, snapshot) in notifications {
            Self::dispatch(listeners, snapshot);
        }
        count
    }

    /// Synchronous read of the cached data for a key, without side effects
    pub fn get_query_data<T>(&self, key: impl Into<QueryKey>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = key.into();
        let cache = self.cache.lock().ok()?;
        cache.get(&key)?.data.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Synchronous read of the full state snapshot for a key
    pub fn get_query_state(&self, key: impl Into<QueryKey>) -> Option<QuerySnapshot> {
        let key = key.into();
        let cache = self.cache.lock().ok()?;
        Some(cache.get(&key)?.snapshot())
    }

    /// Registers a listener for one key's state changes
    ///
    /// The entry is created if absent, so a consumer can subscribe before any
    /// fetch occurs. Listeners fire in subscription order; a panicking
    /// listener is isolated and logged without stopping the others. The
    /// returned [`QuerySubscription`] removes the listener when dropped.
    pub fn subscribe<F>(&self, key: impl Into<QueryKey>, listener: F) -> QuerySubscription
    where
        F: Fn(QuerySnapshot) + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.listener_seq.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut cache) = self.cache.lock() {
            let entry = cache
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(key.clone()));
            entry.listeners.push((id, Arc::new(listener)));
        }
        QuerySubscription {
            cache: Arc::clone(&self.cache),
            key,
            id,
            detached: false,
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(listeners: Vec<QueryListener>, snapshot: QuerySnapshot) {
        for listener in listeners {
            let snap = snapshot.clone();
            if catch_unwind(AssertUnwindSafe(|| listener(snap))).is_err() {
                warn!(
                    "⚠️ [QUERY-NOTIFY] listener panicked for key: {}",
                    snapshot.key
                );
            }
        }
    }
}

/// Handle to one registered listener
///
/// Dropping the handle removes the listener; [`forget`](QuerySubscription::forget)
/// keeps it registered for the lifetime of the client instead.
pub struct QuerySubscription {
    cache: Arc<Mutex<HashMap<QueryKey, QueryEntry>>>,
    key: QueryKey,
    id: u64,
    detached: bool,
}

impl QuerySubscription {
    /// The key this subscription observes
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Removes the listener now
    pub fn unsubscribe(self) {}

    /// Keeps the listener registered for the client's lifetime
    pub fn forget(mut self) {
        self.detached = true;
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(entry) = cache.get_mut(&self.key) {
                entry.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
