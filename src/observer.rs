//! # Query Observers
//!
//! A [`QueryObserver`] gives a consumer a live view of one query: it
//! subscribes to the key, triggers fetch-on-construction when enabled, and
//! exposes a derived read-only [`QueryView`] with first-load and
//! background-refresh flags.
//!
//! Instead of a UI framework's re-render mechanism, change propagation uses a
//! `tokio::sync::watch` channel: every notification for the observed key
//! bumps the channel, and consumers await [`updates`](QueryObserver::updates)
//! to re-read the view.
//!
//! An observer is bound to one key and stale time for its lifetime; observing
//! a different key means constructing a new observer (the old subscription is
//! removed when the observer drops).

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    client::{QueryClient, QueryOptions, QuerySubscription},
    errors::{QueryError, QueryResult},
    key::QueryKey,
    state::QueryStatus,
};

/// Shared async producer for one query's data
pub type QueryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, QueryResult<T>> + Send + Sync>;

type Selector<T, S> = Arc<dyn Fn(T) -> QueryResult<S> + Send + Sync>;

/// Configuration for a [`QueryObserver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverOptions {
    /// When false, no fetch is triggered, but the subscription stays live so
    /// external writes and a later enable are still observed
    pub enabled: bool,
    /// Per-observer stale time; `None` uses the client default
    pub stale_time: Option<Duration>,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
        }
    }
}

/// Derived read-only view of one query's state
#[derive(Debug, Clone)]
pub struct QueryView<S> {
    /// Current status of the underlying entry
    pub status: QueryStatus,
    /// Selected data, if any is cached and the selector succeeded
    pub data: Option<S>,
    /// Last fetch failure, if the entry is in the error state
    pub error: Option<QueryError>,
    /// True only while fetching with no data ever cached (first-load spinner)
    pub is_loading: bool,
    /// True while fetching, even when stale data is being shown
    pub is_fetching: bool,
    /// True when the last fetch succeeded
    pub is_success: bool,
    /// True when the last fetch failed
    pub is_error: bool,
}

impl<S> QueryView<S> {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_loading: false,
            is_fetching: false,
            is_success: false,
            is_error: false,
        }
    }
}

/// A live, subscribed view of one query
///
/// `T` is the fetched data type; `S` is the selected view type (`T` unless a
/// selector is installed).
pub struct QueryObserver<T, S = T> {
    client: QueryClient,
    key: QueryKey,
    query_fn: QueryFn<T>,
    select: Selector<T, S>,
    stale_time: Duration,
    enabled: Arc<AtomicBool>,
    updates: watch::Sender<u64>,
    _subscription: QuerySubscription,
}

impl<T> QueryObserver<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an observer that exposes the fetched data unchanged
    pub fn new<F, Fut>(
        client: &QueryClient,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: ObserverOptions,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        Self::with_select(client, key, query_fn, options, Ok)
    }
}

impl<T, S> QueryObserver<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    /// Creates an observer whose view derives from the cached data through
    /// `select`
    ///
    /// A failing selector is logged and yields `None` data; it does not flip
    /// the query into the error state.
    pub fn with_select<F, Fut, Sel>(
        client: &QueryClient,
        key: impl Into<QueryKey>,
        query_fn: F,
        options: ObserverOptions,
        select: Sel,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
        Sel: Fn(T) -> QueryResult<S> + Send + Sync + 'static,
    {
        let key = key.into();
        let (updates, _) = watch::channel(0u64);

        // Subscribe before the first fetch so no update between subscription
        // and settlement is missed.
        let subscription = client.subscribe(key.clone(), {
            let updates = updates.clone();
            move |_snapshot| {
                updates.send_modify(|version| *version = version.wrapping_add(1));
            }
        });

        let observer = Self {
            client: client.clone(),
            key,
            query_fn: Arc::new(move || query_fn().boxed()),
            select: Arc::new(select),
            stale_time: options
                .stale_time
                .unwrap_or(client.default_options().stale_time),
            enabled: Arc::new(AtomicBool::new(options.enabled)),
            updates,
            _subscription: subscription,
        };

        if options.enabled {
            observer.spawn_fetch();
        }
        observer
    }

    /// The observed key
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Whether fetching is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enables or disables fetching; flipping to enabled triggers a fetch
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        if enabled && !was_enabled {
            self.spawn_fetch();
        }
    }

    /// A channel that changes on every state notification for the observed
    /// key; await `changed()` and re-read [`view`](QueryObserver::view)
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// The current derived view of the query
    pub fn view(&self) -> QueryView<S> {
        let Some(snapshot) = self.client.get_query_state(self.key.clone()) else {
            return QueryView::idle();
        };

        let has_data = snapshot.has_data();
        let data = snapshot.data::<T>().and_then(|value| {
            match (self.select)(value) {
                Ok(selected) => Some(selected),
                Err(error) => {
                    warn!(
                        "⚠️ [QUERY-SELECT] selector failed for key {}: {error}",
                        self.key
                    );
                    None
                }
            }
        });

        QueryView {
            status: snapshot.status,
            is_loading: snapshot.status.is_loading() && !has_data,
            is_fetching: snapshot.status.is_loading(),
            is_success: snapshot.status.is_success(),
            is_error: snapshot.status.is_error(),
            error: snapshot.error,
            data,
        }
    }

    /// Forces a fetch, bypassing the staleness check, and returns its result
    pub async fn refetch(&self) -> QueryResult<T> {
        let query_fn = Arc::clone(&self.query_fn);
        self.client
            .refetch_query_with(
                self.key.clone(),
                move || query_fn(),
                QueryOptions::new(self.stale_time),
            )
            .await
    }

    /// Fire-and-forget fetch; overlapping triggers collapse via the client's
    /// in-flight de-duplication. Errors land in the cache entry and reach the
    /// view through the error state.
    fn spawn_fetch(&self) {
        let client = self.client.clone();
        let key = self.key.clone();
        let query_fn = Arc::clone(&self.query_fn);
        let options = QueryOptions::new(self.stale_time);
        tokio::spawn(async move {
            let result = client
                .fetch_query_with(key.clone(), move || query_fn(), options)
                .await;
            if let Err(error) = result {
                debug!("❌ [QUERY-OBSERVE] background fetch failed for key {key}: {error}");
            }
        });
    }
}
