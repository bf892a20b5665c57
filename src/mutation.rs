//! # Mutation Tracking
//!
//! This module wraps imperative async actions (state-changing requests) with
//! local status tracking and lifecycle callbacks. Mutations are independent
//! of the query cache: they never populate it themselves. Callers reconcile
//! from `on_success` using
//! [`set_query_data`](crate::client::QueryClient::set_query_data) or
//! [`invalidate_queries`](crate::client::QueryClient::invalidate_queries).
//!
//! Clones of a [`Mutation`] share state, so a handle can be passed to the
//! code that triggers the action while another observes its progress.

use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use futures::{FutureExt, future::BoxFuture};
use tracing::debug;

use crate::errors::{QueryError, QueryResult};

/// Represents the state of a mutation operation
#[derive(Clone, PartialEq)]
pub enum MutationState<T> {
    /// The mutation is idle (not running)
    Idle,
    /// The mutation is currently running
    Loading,
    /// The mutation completed successfully
    Success(T),
    /// The mutation failed with an error
    Error(QueryError),
}

impl<T> MutationState<T> {
    /// Returns true if the mutation is idle
    pub fn is_idle(&self) -> bool {
        matches!(self, MutationState::Idle)
    }

    /// Returns true if the mutation is currently running
    pub fn is_loading(&self) -> bool {
        matches!(self, MutationState::Loading)
    }

    /// Returns true if the mutation completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, MutationState::Success(_))
    }

    /// Returns true if the mutation failed
    pub fn is_error(&self) -> bool {
        matches!(self, MutationState::Error(_))
    }

    /// Returns the success data if available
    pub fn data(&self) -> Option<&T> {
        match self {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if available
    pub fn error(&self) -> Option<&QueryError> {
        match self {
            MutationState::Error(error) => Some(error),
            _ => None,
        }
    }
}

type MutationFn<V, T> = Arc<dyn Fn(V) -> BoxFuture<'static, QueryResult<T>> + Send + Sync>;
type SuccessCallback<V, T> = Arc<dyn Fn(&T, &V) + Send + Sync>;
type ErrorCallback<V> = Arc<dyn Fn(&QueryError, &V) + Send + Sync>;
type SettledCallback<V, T> = Arc<dyn Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync>;

/// A one-shot asynchronous action with lifecycle callbacks
///
/// `V` is the variables type passed to the action; `T` is its output.
///
/// ## Example
///
/// ```rust,no_run
/// use query_broker::prelude::*;
///
/// # async fn run(client: QueryClient) -> QueryResult<()> {
/// let claim_reward = Mutation::new(|day: u32| async move {
///     // Make the API call to claim the daily reward
///     Ok(format!("claimed day {day}"))
/// })
/// .on_success({
///     let client = client.clone();
///     move |_receipt: &String, _day: &u32| {
///         client.invalidate_queries(query_key!["rewards"]);
///     }
/// });
///
/// let _receipt = claim_reward.mutate_async(3).await?;
/// assert!(claim_reward.is_success());
/// # Ok(())
/// # }
/// ```
pub struct Mutation<V, T> {
    mutation_fn: MutationFn<V, T>,
    on_success: Option<SuccessCallback<V, T>>,
    on_error: Option<ErrorCallback<V>>,
    on_settled: Option<SettledCallback<V, T>>,
    state: Arc<Mutex<MutationState<T>>>,
}

impl<V, T> Clone for Mutation<V, T> {
    fn clone(&self) -> Self {
        Self {
            mutation_fn: Arc::clone(&self.mutation_fn),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<V, T> Mutation<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wraps an async action into a tracked mutation
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        Self {
            mutation_fn: Arc::new(move |variables| mutation_fn(variables).boxed()),
            on_success: None,
            on_error: None,
            on_settled: None,
            state: Arc::new(Mutex::new(MutationState::Idle)),
        }
    }

    /// Called with the data and variables after a successful run
    pub fn on_success(mut self, callback: impl Fn(&T, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Called with the error and variables after a failed run
    pub fn on_error(mut self, callback: impl Fn(&QueryError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Called after every run, success or failure, with whichever of
    /// data/error applies plus the variables
    pub fn on_settled(
        mut self,
        callback: impl Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(callback));
        self
    }

    /// Runs the mutation and returns its result
    ///
    /// Sets status to loading (clearing any previous error), awaits the
    /// action, then stores the outcome and fires `on_success`/`on_error`
    /// followed by `on_settled`. Failures are rethrown to the caller after
    /// the callbacks have run.
    pub async fn mutate_async(&self, variables: V) -> QueryResult<T> {
        self.set_state(MutationState::Loading);
        debug!("🔄 [MUTATION] starting mutation");

        match (self.mutation_fn)(variables.clone()).await {
            Ok(data) => {
                self.set_state(MutationState::Success(data.clone()));
                debug!("✅ [MUTATION] mutation succeeded");
                if let Some(callback) = &self.on_success {
                    callback(&data, &variables);
                }
                if let Some(callback) = &self.on_settled {
                    callback(Some(&data), None, &variables);
                }
                Ok(data)
            }
            Err(error) => {
                self.set_state(MutationState::Error(error.clone()));
                debug!("❌ [MUTATION] mutation failed: {error}");
                if let Some(callback) = &self.on_error {
                    callback(&error, &variables);
                }
                if let Some(callback) = &self.on_settled {
                    callback(None, Some(&error), &variables);
                }
                Err(error)
            }
        }
    }

    /// Fire-and-forget variant of [`mutate_async`](Mutation::mutate_async)
    ///
    /// Must be called from within a tokio runtime. Failures still reach
    /// `on_error`/`on_settled` and the mutation state; they are never thrown
    /// into the caller's context.
    pub fn mutate(&self, variables: V) {
        let this = self.clone();
        tokio::spawn(async move {
            // The rejection is observed here so the discarded future never
            // surfaces it elsewhere.
            let _ = this.mutate_async(variables).await;
        });
    }

    /// Returns the mutation to idle with cleared data and error
    pub fn reset(&self) {
        self.set_state(MutationState::Idle);
        debug!("🔁 [MUTATION] mutation reset");
    }

    /// The current mutation state
    pub fn state(&self) -> MutationState<T> {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or(MutationState::Idle)
    }

    /// The success data, if the last run succeeded
    pub fn data(&self) -> Option<T> {
        self.state().data().cloned()
    }

    /// The error, if the last run failed
    pub fn error(&self) -> Option<QueryError> {
        self.state().error().cloned()
    }

    /// Returns true if the mutation is idle
    pub fn is_idle(&self) -> bool {
        self.state().is_idle()
    }

    /// Returns true if the mutation is currently running
    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    /// Returns true if the last run succeeded
    pub fn is_success(&self) -> bool {
        self.state().is_success()
    }

    /// Returns true if the last run failed
    pub fn is_error(&self) -> bool {
        self.state().is_error()
    }

    fn set_state(&self, state: MutationState<T>) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }
}
