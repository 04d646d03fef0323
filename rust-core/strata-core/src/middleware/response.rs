//! Success-path response writing.

use crate::api_error::ApiError;
use crate::context::HandlerContext;
use crate::handler::Handler;
use crate::response::{write_json, write_json_file};
use crate::router::Method;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

const fn success_status(method: Method) -> u16 {
    match method {
        Method::Post => 201,
        _ => 200,
    }
}

/// Write the handler's result as JSON
///
/// 201 for POST, 200 otherwise. Errors pass through untouched for the
/// adapter; a serialization failure becomes 500 `Failed to write response`.
pub fn response_json<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Serialize + Send + 'static,
{
    Handler::new(move |ctx: HandlerContext<P, B>| {
        let next = next.clone();
        let writer = ctx.writer.clone();
        let request = Arc::clone(&ctx.request);
        let span = ctx.span.clone();
        async move {
            let data = next.call(ctx).await?;
            if let Err(e) = write_json(&writer, success_status(request.method), &data) {
                error!(parent: &span, error = %e, path = %request.path, "Failed to write JSON response");
                return Err(ApiError::internal("Failed to write response").into());
            }
            Ok(data)
        }
    })
}

/// Like [`response_json`] but served as a download named `filename`
pub fn response_json_file<P, B, R>(
    filename: impl Into<String>,
) -> impl Fn(Handler<P, B, R>) -> Handler<P, B, R> + Clone + Send + Sync + 'static
where
    P: Send + 'static,
    B: Send + 'static,
    R: Serialize + Send + 'static,
{
    let filename: Arc<str> = Arc::from(filename.into());
    move |next: Handler<P, B, R>| {
        let filename = Arc::clone(&filename);
        Handler::new(move |ctx: HandlerContext<P, B>| {
            let next = next.clone();
            let filename = Arc::clone(&filename);
            let writer = ctx.writer.clone();
            let request = Arc::clone(&ctx.request);
            let span = ctx.span.clone();
            async move {
                let data = next.call(ctx).await?;
                let status = success_status(request.method);
                if let Err(e) = write_json_file(&writer, status, &data, &filename) {
                    error!(
                        parent: &span,
                        error = %e,
                        path = %request.path,
                        filename = %filename,
                        "Failed to write JSON file response"
                    );
                    return Err(ApiError::internal("Failed to write response").into());
                }
                Ok(data)
            }
        })
    }
}
