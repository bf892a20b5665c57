//! # Global Client Management
//!
//! Explicit handle passing is the primary way to share a [`QueryClient`];
//! this module provides the opt-in alternative: one application-wide client
//! behind a `OnceLock`, initialized once at startup.

use std::sync::OnceLock;

use crate::client::{QueryClient, QueryOptions};

/// Error type for global client operations
#[derive(Debug, thiserror::Error)]
pub enum GlobalClientError {
    #[error("Global query client not initialized. Call init_global_client() first.")]
    NotInitialized,
}

/// Global singleton instance of the query client
static GLOBAL_CLIENT: OnceLock<QueryClient> = OnceLock::new();

/// Initialize the global query client
///
/// This should be called once at the start of your application, typically in
/// your main function. Subsequent calls are no-ops and keep the options of
/// the first call.
///
/// ## Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use query_broker::global::{global_client, init_global_client};
/// use query_broker::client::QueryOptions;
///
/// fn main() {
///     init_global_client(QueryOptions::new(Duration::from_secs(60)));
///
///     let client = global_client().unwrap();
///     // hand `client` to whatever constructs your app
/// }
/// ```
pub fn init_global_client(defaults: QueryOptions) {
    GLOBAL_CLIENT.get_or_init(|| QueryClient::with_defaults(defaults));
}

/// Get the global query client instance
///
/// Returns the client that persists across the entire application lifecycle.
///
/// ## Errors
///
/// Returns `GlobalClientError::NotInitialized` if `init_global_client()` has
/// not been called yet.
pub fn global_client() -> Result<&'static QueryClient, GlobalClientError> {
    GLOBAL_CLIENT.get().ok_or(GlobalClientError::NotInitialized)
}

/// Check if the global client has been initialized
pub fn is_initialized() -> bool {
    GLOBAL_CLIENT.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_client_initialization() {
        init_global_client(QueryOptions::default());

        assert!(is_initialized());
        let _client = global_client().unwrap();
    }

    #[test]
    fn test_init_is_idempotent() {
        init_global_client(QueryOptions::NEVER_STALE);
        init_global_client(QueryOptions::ALWAYS_STALE);

        // The first initialization wins; later calls never replace the client
        let first = global_client().unwrap().default_options();
        init_global_client(QueryOptions::ALWAYS_STALE);
        assert_eq!(global_client().unwrap().default_options(), first);
    }
}
