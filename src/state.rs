//! Query status and read-only state snapshots
//!
//! The cache stores type-erased values (`Arc<dyn Any + Send + Sync>`) so one
//! map can hold entries of different data types; typed reads downcast on the
//! way out. [`QuerySnapshot`] is the immutable view of one entry handed to
//! listeners and returned by
//! [`QueryClient::get_query_state`](crate::client::QueryClient::get_query_state).

use std::{any::Any, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{errors::QueryError, key::QueryKey};

/// Type-erased cached value
pub type ErasedData = Arc<dyn Any + Send + Sync>;

/// Represents the state of a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// No fetch has been attempted yet
    Idle,
    /// A fetch is currently in flight
    Loading,
    /// The last fetch completed successfully
    Success,
    /// The last fetch failed
    Error,
}

impl QueryStatus {
    /// Returns true if no fetch has been attempted
    pub fn is_idle(&self) -> bool {
        matches!(self, QueryStatus::Idle)
    }

    /// Returns true if a fetch is currently in flight
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryStatus::Loading)
    }

    /// Returns true if the last fetch succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, QueryStatus::Success)
    }

    /// Returns true if the last fetch failed
    pub fn is_error(&self) -> bool {
        matches!(self, QueryStatus::Error)
    }
}

/// A read-only snapshot of one cache entry
///
/// Snapshots are cheap to clone: the data slot is a shared `Arc`, not a deep
/// copy. A snapshot reflects the entry at the moment it was taken; it is not
/// updated afterwards.
#[derive(Clone)]
pub struct QuerySnapshot {
    /// The key owning this entry
    pub key: QueryKey,
    /// Current status of the entry
    pub status: QueryStatus,
    /// Last failure, if the most recent fetch failed
    pub error: Option<QueryError>,
    /// Completion time of the last successful fetch; `None` if the entry has
    /// never fetched successfully or has been invalidated
    pub updated_at: Option<Instant>,
    pub(crate) data: Option<ErasedData>,
}

impl QuerySnapshot {
    /// Retrieves the cached data as `T`
    ///
    /// Returns `None` if no data is cached or if the stored value is of a
    /// different type.
    pub fn data<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.data.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Whether any data is cached, regardless of its type
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether a fetch is in flight for this entry
    pub fn is_fetching(&self) -> bool {
        self.status.is_loading()
    }

    /// Whether this entry would be considered stale under the given stale time
    ///
    /// An entry is stale if its status is [`QueryStatus::Idle`] or
    /// [`QueryStatus::Error`], if it has been invalidated, or if `stale_time`
    /// has elapsed since its last successful fetch. `Duration::MAX` means
    /// successfully fetched data never goes stale.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        match (self.status, self.updated_at) {
            (QueryStatus::Idle | QueryStatus::Error, _) => true,
            (_, None) => true,
            (_, Some(updated_at)) => updated_at.elapsed() >= stale_time,
        }
    }
}

impl fmt::Debug for QuerySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySnapshot")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("updated_at", &self.updated_at)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
