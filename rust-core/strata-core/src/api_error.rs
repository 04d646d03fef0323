//! # API Errors
//!
//! [`ApiError`] is the client-facing error carried through handlers and
//! middleware and written as `{"error": {...}}`. [`HandlerError`] is the error
//! type every handler returns; the adapter classifies it to decide what the
//! client sees.

use crate::error::{Error, ExecutionError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Client-facing error with status code, message and optional detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// HTTP status code
    pub code: u16,
    /// Human-readable message
    pub message: String,
    /// Extra detail for the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Per-field messages
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl ApiError {
    /// Create an error with the given status and message
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            fields: BTreeMap::new(),
        }
    }

    /// Attach a detail string
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a field message, appending with ` || ` when the field already has one
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add_field(field, message);
        self
    }

    /// Add a field message in place
    pub fn add_field(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        self.fields
            .entry(field.into())
            .and_modify(|existing| {
                existing.push_str(" || ");
                existing.push_str(&message);
            })
            .or_insert(message);
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// 400 carrying per-field validation messages
    pub fn validation(message: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            fields,
            ..Self::bad_request(message)
        }
    }

    /// 401
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    /// 403
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    /// 409
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    /// 422
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(422, message)
    }

    /// 500
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }

    /// 504
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(504, message)
    }

    /// Whether this is a 5xx error
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.code >= 500
    }

    /// Whether this is a 4xx error
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// Map a database failure to a client error
    ///
    /// Unique violations become 409, foreign key violations 400, a missing
    /// row 404 and an elapsed deadline 504. Everything else is 500 with a
    /// generic message. Use [`HandlerError::from_database`] when a cancelled
    /// request must stay silent.
    #[must_use]
    pub fn from_database(err: &Error) -> Self {
        if err.execution() == Some(ExecutionError::DeadlineExceeded) {
            Self::gateway_timeout("Request timeout")
        } else if err.is_unique_violation("") {
            Self::conflict("Resource already exists")
        } else if err.is_foreign_key_violation("") {
            Self::bad_request("Referenced resource does not exist")
        } else if matches!(err, Error::RowNotFound) {
            Self::not_found("Resource not found")
        } else {
            Self::internal("Database error")
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API Error {}: {}", self.code, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " - {detail}")?;
        }
        if !self.fields.is_empty() {
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(field, message)| format!("{field}={message}"))
                .collect();
            write!(f, " [fields: {}]", fields.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// JSON envelope wrapping an [`ApiError`]
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    /// The wrapped error
    pub error: &'a ApiError,
}

/// Error returned by handlers and middleware
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request was cancelled; nothing is written
    #[error("request cancelled by client")]
    Cancelled,
    /// The request deadline elapsed; answered with 504
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    /// Written to the client verbatim
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Anything else; answered with a generic 500
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// How the adapter should treat a [`HandlerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass<'a> {
    /// Client gone, write nothing
    Cancelled,
    /// Deadline elapsed, write 504
    DeadlineExceeded,
    /// Write the client error as is
    Api(&'a ApiError),
    /// Log and write a generic 500
    Unclassified,
}

impl HandlerError {
    /// Wrap any error as an unclassified failure
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(anyhow::Error::new(err))
    }

    /// Map a database failure, keeping interruption as its own variant
    ///
    /// Cancellation and deadlines become [`HandlerError::Cancelled`] and
    /// [`HandlerError::DeadlineExceeded`]; every other failure goes through
    /// [`ApiError::from_database`].
    #[must_use]
    pub fn from_database(err: &Error) -> Self {
        err.execution()
            .map_or_else(|| Self::Api(ApiError::from_database(err)), Self::from)
    }

    /// Classify the error, looking through wrapped causes
    ///
    /// Interruption is checked before client errors anywhere in the chain.
    #[must_use]
    pub fn classify(&self) -> ErrorClass<'_> {
        match self {
            Self::Cancelled => ErrorClass::Cancelled,
            Self::DeadlineExceeded => ErrorClass::DeadlineExceeded,
            Self::Api(api) => ErrorClass::Api(api),
            Self::Other(err) => {
                for cause in err.chain() {
                    let execution = cause
                        .downcast_ref::<ExecutionError>()
                        .copied()
                        .or_else(|| cause.downcast_ref::<Error>().and_then(Error::execution));
                    match execution {
                        Some(ExecutionError::Cancelled) => return ErrorClass::Cancelled,
                        Some(ExecutionError::DeadlineExceeded) => {
                            return ErrorClass::DeadlineExceeded
                        }
                        None => {}
                    }
                }
                err.chain()
                    .find_map(|cause| cause.downcast_ref::<ApiError>())
                    .map_or(ErrorClass::Unclassified, ErrorClass::Api)
            }
        }
    }
}

impl From<ExecutionError> for HandlerError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Cancelled => Self::Cancelled,
            ExecutionError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        match err {
            Error::Execution(execution) => execution.into(),
            other => Self::Other(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_display_with_detail_and_fields() {
        let err = ApiError::bad_request("Validation failed")
            .with_detail("check input")
            .with_field("email", "required");
        assert_eq!(
            err.to_string(),
            "API Error 400: Validation failed - check input [fields: email=required]"
        );
    }

    #[test]
    fn test_add_field_appends() {
        let err = ApiError::bad_request("Validation failed")
            .with_field("name", "too short")
            .with_field("name", "invalid characters");
        assert_eq!(err.fields["name"], "too short || invalid characters");
    }

    #[test]
    fn test_envelope_omits_empty_parts() {
        let err = ApiError::not_found("User not found");
        let json = serde_json::to_value(ErrorEnvelope { error: &err }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": {"code": 404, "message": "User not found"}})
        );
    }

    #[test]
    fn test_classify_direct_variants() {
        assert_eq!(HandlerError::Cancelled.classify(), ErrorClass::Cancelled);
        let api = HandlerError::from(ApiError::forbidden("no"));
        assert!(matches!(api.classify(), ErrorClass::Api(e) if e.code == 403));
    }

    #[test]
    fn test_classify_wrapped_causes() {
        let wrapped: anyhow::Result<()> =
            Err(ApiError::not_found("User not found")).context("loading user");
        let err = HandlerError::from(wrapped.unwrap_err());
        assert!(matches!(err.classify(), ErrorClass::Api(e) if e.message == "User not found"));

        let timeout: anyhow::Result<()> =
            Err(Error::from(ExecutionError::DeadlineExceeded)).context("query");
        let err = HandlerError::from(timeout.unwrap_err());
        assert_eq!(err.classify(), ErrorClass::DeadlineExceeded);
    }

    #[test]
    fn test_classify_unknown() {
        let err = HandlerError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.classify(), ErrorClass::Unclassified);
    }

    #[test]
    fn test_framework_error_conversion() {
        let err = HandlerError::from(Error::from(ExecutionError::Cancelled));
        assert!(matches!(err, HandlerError::Cancelled));
        let err = HandlerError::from(Error::RowNotFound);
        assert_eq!(err.classify(), ErrorClass::Unclassified);
    }

    #[test]
    fn test_from_database_mapping() {
        assert_eq!(ApiError::from_database(&Error::RowNotFound).code, 404);
        let generic = Error::Database {
            message: "connection reset".to_string(),
        };
        assert_eq!(ApiError::from_database(&generic).code, 500);
    }

    #[test]
    fn test_from_database_deadline_is_gateway_timeout() {
        let err = Error::from(ExecutionError::DeadlineExceeded);
        let api = ApiError::from_database(&err);
        assert_eq!(api.code, 504);
        assert_eq!(api.message, "Request timeout");
    }

    #[test]
    fn test_handler_error_from_database_keeps_interruption() {
        let cancelled = HandlerError::from_database(&Error::from(ExecutionError::Cancelled));
        assert_eq!(cancelled.classify(), ErrorClass::Cancelled);

        let timeout = HandlerError::from_database(&Error::from(ExecutionError::DeadlineExceeded));
        assert_eq!(timeout.classify(), ErrorClass::DeadlineExceeded);

        let missing = HandlerError::from_database(&Error::RowNotFound);
        assert!(matches!(missing.classify(), ErrorClass::Api(e) if e.code == 404));
    }
}
