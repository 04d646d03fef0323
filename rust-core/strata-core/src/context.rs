//! # Handler Context
//!
//! [`HandlerContext`] is the single value threaded through a composed
//! handler: middleware fill its slots, the base handler reads them.
//!
//! Slots that middleware populate are [`Optional`]; the request-scoped
//! execution handle, logger span and response writer are always present.

use crate::adapter::Dependencies;
use crate::api_error::ApiError;
use crate::database::DatabasePool;
use crate::execution::ExecutionContext;
use crate::optional::Optional;
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::router::Method;
use crate::state::TypeState;
use hyper::body::Bytes;
use hyper::HeaderMap;
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

/// Per-request state for a handler with params `P` and body `B`
pub struct HandlerContext<P, B> {
    /// Cancellation and deadline of the request
    pub execution: ExecutionContext,
    /// Logger span; middleware may replace it with an enriched child
    pub span: Span,
    /// Database pool, if the application configured one
    pub db: Option<DatabasePool>,
    /// Shared application state
    pub state: TypeState,
    /// The incoming request
    pub request: Arc<Request>,
    /// Where the response goes
    pub writer: ResponseWriter,
    /// Parsed parameters
    pub params: Optional<P>,
    /// Parsed body
    pub body: Optional<B>,
    /// Raw body bytes, when a body was sent
    pub body_raw: Optional<Bytes>,
    /// Request headers, when copied by `parse_headers`
    pub headers: Optional<HeaderMap>,
    /// Correlation ID, when set by `with_request_id`
    pub request_id: Optional<String>,
    /// Authenticated user
    pub user: Optional<Uuid>,
    /// Company of the authenticated user
    pub company: Optional<Uuid>,
}

impl<P, B> HandlerContext<P, B> {
    /// Fresh context for `request`, with every optional slot empty
    pub fn new(request: Arc<Request>, writer: ResponseWriter, deps: &Dependencies) -> Self {
        Self {
            execution: request.execution().clone(),
            span: deps.span.clone(),
            db: deps.db.clone(),
            state: deps.state.clone(),
            request,
            writer,
            params: Optional::empty(),
            body: Optional::empty(),
            body_raw: Optional::empty(),
            headers: Optional::empty(),
            request_id: Optional::empty(),
            user: Optional::empty(),
            company: Optional::empty(),
        }
    }

    /// The database pool
    ///
    /// # Errors
    ///
    /// Returns a 500 `ApiError` when no database is configured.
    pub fn db(&self) -> Result<&DatabasePool, ApiError> {
        self.db
            .as_ref()
            .ok_or_else(|| ApiError::internal("Database not configured"))
    }

    /// A shared value of type `T`
    #[must_use]
    pub fn state<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.state.get::<T>()
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> Method {
        self.request.method
    }

    /// Request path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.path
    }
}

impl<P, B> std::fmt::Debug for HandlerContext<P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params.is_present())
            .field("body", &self.body.is_present())
            .field("request_id", &self.request_id.get())
            .field("user", &self.user.get())
            .finish_non_exhaustive()
    }
}
