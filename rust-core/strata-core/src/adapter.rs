//! # Adapter
//!
//! Turns a composed [`Handler`] into a [`BoundaryHandler`] the router can
//! dispatch to. Per request the adapter builds a fresh [`HandlerContext`]
//! carrying the request's execution handle and the injected
//! [`Dependencies`], runs the handler inside the dependency span and maps
//! any error to a response:
//!
//! | error | response |
//! |---|---|
//! | cancelled | none (client is gone) |
//! | deadline exceeded | 504 envelope |
//! | [`ApiError`] | its status and envelope |
//! | anything else | 500 envelope, detail only in verbose mode |
//!
//! Success responses are written by middleware such as `response_json`.

use crate::api_error::{ApiError, ErrorClass};
use crate::context::HandlerContext;
use crate::database::DatabasePool;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::{write_api_error, ResponseWriter};
use crate::router::BoundaryHandler;
use crate::state::TypeState;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{error, info, Instrument, Span};

/// How much of an unclassified error the client sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Put the raw error text into the 500 envelope's `detail`
    pub verbose: bool,
}

impl ErrorPolicy {
    /// Expose raw error text to clients
    #[must_use]
    pub const fn verbose() -> Self {
        Self { verbose: true }
    }
}

/// Shared, read-only resources injected into every handler context
#[derive(Debug, Clone)]
pub struct Dependencies {
    /// Database pool
    pub db: Option<DatabasePool>,
    /// Parent span of every request
    pub span: Span,
    /// Application state
    pub state: TypeState,
    /// Error exposure policy
    pub policy: ErrorPolicy,
}

impl Default for Dependencies {
    fn default() -> Self {
        Self {
            db: None,
            span: tracing::info_span!("strata"),
            state: TypeState::new(),
            policy: ErrorPolicy::default(),
        }
    }
}

impl Dependencies {
    /// Default dependencies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a database pool
    #[must_use]
    pub fn with_db(mut self, db: DatabasePool) -> Self {
        self.db = Some(db);
        self
    }

    /// Use `span` as the parent span
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Inject application state
    #[must_use]
    pub fn with_state(mut self, state: TypeState) -> Self {
        self.state = state;
        self
    }

    /// Set the error policy
    #[must_use]
    pub const fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Adapt `handler` to the boundary signature
pub fn adapt_handler<P, B, R>(deps: Dependencies, handler: Handler<P, B, R>) -> BoundaryHandler
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Arc::new(move |req: Request, writer: ResponseWriter| -> BoxFuture<'static, ()> {
        let request = Arc::new(req);
        let ctx = HandlerContext::<P, B>::new(Arc::clone(&request), writer.clone(), &deps);
        let span = deps.span.clone();
        let policy = deps.policy;
        let handler = handler.clone();

        Box::pin(
            async move {
                let Err(err) = handler.call(ctx).await else {
                    return;
                };
                match err.classify() {
                    ErrorClass::Cancelled => {
                        info!(
                            method = %request.method,
                            path = %request.path,
                            "Request cancelled by client"
                        );
                    }
                    ErrorClass::DeadlineExceeded => {
                        write_api_error(&writer, &request, &ApiError::gateway_timeout("Request timeout"));
                    }
                    ErrorClass::Api(api) => write_api_error(&writer, &request, api),
                    ErrorClass::Unclassified => {
                        error!(
                            method = %request.method,
                            path = %request.path,
                            error = %format!("{err:#}"),
                            "Unhandled error"
                        );
                        let mut api = ApiError::internal("Internal server error");
                        if policy.verbose {
                            api = api.with_detail(format!("{err:#}"));
                        }
                        write_api_error(&writer, &request, &api);
                    }
                }
            }
            .instrument(span),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_error::HandlerError;
    use crate::error::{Error, ExecutionError};
    use crate::handler::HandlerResult;
    use serde_json::Value;

    fn failing(err: fn() -> HandlerError) -> Handler<(), (), ()> {
        Handler::new(move |_ctx: HandlerContext<(), ()>| async move {
            let result: HandlerResult<()> = Err(err());
            result
        })
    }

    async fn run(deps: Dependencies, handler: Handler<(), (), ()>) -> ResponseWriter {
        let boundary = adapt_handler(deps, handler);
        let writer = ResponseWriter::new();
        boundary(Request::get("/users/42"), writer.clone()).await;
        writer
    }

    fn body(writer: &ResponseWriter) -> Value {
        let response = writer.snapshot().unwrap();
        serde_json::from_slice(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_cancelled_writes_nothing() {
        let writer = run(Dependencies::default(), failing(|| HandlerError::Cancelled)).await;
        assert!(!writer.is_written());
        assert_eq!(writer.status(), None);
    }

    #[tokio::test]
    async fn test_wrapped_cancellation_writes_nothing() {
        let handler = failing(|| {
            anyhow::Error::new(Error::from(ExecutionError::Cancelled))
                .context("loading user")
                .into()
        });
        let writer = run(Dependencies::default(), handler).await;
        assert!(!writer.is_written());
    }

    #[tokio::test]
    async fn test_deadline_is_gateway_timeout() {
        let writer = run(Dependencies::default(), failing(|| HandlerError::DeadlineExceeded)).await;
        assert_eq!(writer.status(), Some(504));
        assert_eq!(body(&writer)["error"]["code"], 504);
    }

    #[tokio::test]
    async fn test_api_error_written_verbatim() {
        let handler = failing(|| ApiError::not_found("User not found").into());
        let writer = run(Dependencies::default(), handler).await;
        assert_eq!(writer.status(), Some(404));
        assert_eq!(body(&writer)["error"]["message"], "User not found");
    }

    #[tokio::test]
    async fn test_unclassified_hides_detail() {
        let handler = failing(|| anyhow::anyhow!("connection refused to 10.0.0.3").into());
        let writer = run(Dependencies::default(), handler).await;
        assert_eq!(writer.status(), Some(500));
        let json = body(&writer);
        assert_eq!(json["error"]["message"], "Internal server error");
        assert!(json["error"].get("detail").is_none());
    }

    #[tokio::test]
    async fn test_verbose_policy_exposes_detail() {
        let handler = failing(|| anyhow::anyhow!("connection refused").into());
        let deps = Dependencies::default().with_policy(ErrorPolicy::verbose());
        let writer = run(deps, handler).await;
        assert_eq!(body(&writer)["error"]["detail"], "connection refused");
    }

    #[tokio::test]
    async fn test_success_writes_nothing_itself() {
        let handler = Handler::new(|_ctx: HandlerContext<(), ()>| async { Ok(()) });
        let writer = run(Dependencies::default(), handler).await;
        assert!(!writer.is_written());
    }
}
