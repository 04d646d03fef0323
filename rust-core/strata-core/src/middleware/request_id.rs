//! Request correlation.

use crate::context::HandlerContext;
use crate::handler::Handler;
use crate::optional::Optional;
use crate::request::REQUEST_ID_HEADER;

/// Copy the `X-Request-ID` header into `ctx.request_id`
///
/// The span is replaced by a child carrying `request_id`. Without the
/// header (no [`RequestIdLayer`](crate::layer::RequestIdLayer) in front)
/// the context is left as is.
pub fn with_request_id<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, B>| {
        let request_id = ctx
            .request
            .header(REQUEST_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if let Some(request_id) = request_id {
            ctx.span = tracing::info_span!(parent: &ctx.span, "request", request_id = %request_id);
            ctx.request_id = Optional::of(request_id);
        }
        next.call(ctx)
    })
}
