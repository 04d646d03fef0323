//! Per-route request/response logging.

use crate::context::HandlerContext;
use crate::handler::Handler;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Log request start and completion with its duration
///
/// Events are emitted under `ctx.span`, so list this after
/// [`with_request_id`](super::with_request_id) to have the request id on them.
pub fn with_logging<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |ctx: HandlerContext<P, B>| {
        let next = next.clone();
        let request = Arc::clone(&ctx.request);
        let span = ctx.span.clone();
        async move {
            let start = Instant::now();
            let remote_addr = request.remote_addr().map(|a| a.to_string()).unwrap_or_default();
            info!(
                parent: &span,
                method = %request.method,
                path = %request.path,
                remote_addr = %remote_addr,
                user_agent = request.header("user-agent").unwrap_or_default(),
                "HTTP request"
            );

            let result = next.call(ctx).await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match &result {
                Ok(_) => info!(
                    parent: &span,
                    method = %request.method,
                    path = %request.path,
                    duration_ms,
                    "HTTP response success"
                ),
                Err(e) => error!(
                    parent: &span,
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    duration_ms,
                    "HTTP response error"
                ),
            }
            result
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Dependencies;
    use crate::api_error::{ApiError, HandlerError};
    use crate::handler::{compose, Middleware};
    use crate::request::Request;
    use crate::response::ResponseWriter;

    fn context() -> HandlerContext<(), ()> {
        HandlerContext::new(Arc::new(Request::get("/")), ResponseWriter::new(), &Dependencies::default())
    }

    #[tokio::test]
    async fn test_result_is_passed_through() {
        let ok = Handler::new(|_ctx: HandlerContext<(), ()>| async { Ok(5_u8) });
        let handler = compose(ok, &[Middleware::from_fn(with_logging)]);
        assert_eq!(handler.call(context()).await.unwrap(), 5);

        let failing = Handler::new(|_ctx: HandlerContext<(), ()>| async {
            Err::<u8, HandlerError>(ApiError::bad_request("nope").into())
        });
        let handler = compose(failing, &[Middleware::from_fn(with_logging)]);
        assert!(handler.call(context()).await.is_err());
    }
}
