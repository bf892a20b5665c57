//! # Structured Error Types
//!
//! This module provides structured error types for query and mutation
//! operations. Using structured errors instead of generic `String` errors
//! provides better error handling, debugging, and type safety.
//!
//! Query and mutation functions return [`QueryResult<T>`]; errors are cloned
//! into the cache entry and handed to every caller awaiting the same fetch.
//!
//! ## Examples
//!
//! ### Using QueryError for fetch failures:
//! ```rust
//! use query_broker::errors::{QueryError, QueryResult};
//!
//! async fn fetch_tasks(token: &str) -> QueryResult<Vec<String>> {
//!     if token.is_empty() {
//!         return Err(QueryError::Generic("missing access token".to_string()));
//!     }
//!
//!     Err(QueryError::ExternalService {
//!         service: "TaskAPI".to_string(),
//!         error: "503 Service Unavailable".to_string(),
//!     })
//! }
//! ```

use thiserror::Error;

/// Common error types for query and mutation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Network or HTTP errors
    #[error("Network error: {0}")]
    Network(String),

    /// External service errors
    #[error("External service '{service}' error: {error}")]
    ExternalService { service: String, error: String },

    /// Data parsing or serialization errors
    #[error("Data parsing error: {0}")]
    DataParsing(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Cache errors, including typed reads that do not match the stored value
    #[error("Cache error: {0}")]
    Cache(String),

    /// Generic query errors for cases not covered above
    #[error("Query error: {0}")]
    Generic(String),
}

/// Convenience type alias for Results with QueryError
pub type QueryResult<T> = Result<T, QueryError>;

impl From<String> for QueryError {
    fn from(error: String) -> Self {
        QueryError::Generic(error)
    }
}

impl From<&str> for QueryError {
    fn from(error: &str) -> Self {
        QueryError::Generic(error.to_string())
    }
}

impl From<QueryError> for String {
    fn from(error: QueryError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display() {
        let error = QueryError::Network("connection refused".to_string());
        assert_eq!(error.to_string(), "Network error: connection refused");
    }

    #[test]
    fn test_external_service_error_display() {
        let error = QueryError::ExternalService {
            service: "TaskAPI".to_string(),
            error: "503 Service Unavailable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "External service 'TaskAPI' error: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_generic_error_from_str() {
        let error: QueryError = "boom".into();
        assert_eq!(error, QueryError::Generic("boom".to_string()));
        assert_eq!(error.to_string(), "Query error: boom");
    }

    #[test]
    fn test_error_round_trips_into_string() {
        let message: String = QueryError::Cache("type mismatch".to_string()).into();
        assert_eq!(message, "Cache error: type mismatch");
    }
}
