//! # Error Handling
//!
//! Centralized error types for Strata core.
//! Uses `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a guarded operation stopped before completing
///
/// Produced by [`crate::ExecutionContext::run`] when the request-scoped
/// cancellation signal fires or its deadline elapses.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionError {
    /// The client went away and the request was cancelled
    #[error("request cancelled by client")]
    Cancelled,
    /// The request deadline elapsed
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Core error types for the Strata runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Router failed to match the requested path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The same method and path were registered twice in one registry
    #[error("Duplicate route: {method} {path} is already registered")]
    DuplicateRoute {
        /// HTTP method of the rejected route
        method: String,
        /// Path pattern of the rejected route
        path: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error reported by the SIMD parser
    #[error("JSON parse error: {reason}")]
    JsonParse {
        /// Parser message
        reason: String,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the SQL driver
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database error without a driver source
    #[error("Database error: {message}")]
    Database {
        /// Error message
        message: String,
    },

    /// A query expected exactly one row and found none
    #[error("Query returned no rows")]
    RowNotFound,

    /// Transaction rollback failed after the transaction body failed
    #[error("transaction failed: {original}, rollback failed: {source}")]
    Rollback {
        /// Rendered error of the transaction body
        original: String,
        /// Error raised by the rollback itself
        #[source]
        source: sqlx::Error,
    },

    /// Invalid configuration, detected before any resource is acquired
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// Metric registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Token signing or validation failed
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// The guarded operation was interrupted
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The execution interruption behind this error, if any
    #[must_use]
    pub const fn execution(&self) -> Option<ExecutionError> {
        match self {
            Self::Execution(err) => Some(*err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }

    #[test]
    fn test_duplicate_route_error() {
        let err = Error::DuplicateRoute {
            method: "GET".to_string(),
            path: "/users/{id}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate route: GET /users/{id} is already registered"
        );
    }

    #[test]
    fn test_execution_error_is_transparent() {
        let err = Error::from(ExecutionError::DeadlineExceeded);
        assert_eq!(err.to_string(), "request deadline exceeded");
        assert_eq!(err.execution(), Some(ExecutionError::DeadlineExceeded));
        assert_eq!(Error::RowNotFound.execution(), None);
    }
}
