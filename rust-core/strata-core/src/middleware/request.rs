//! Request parsing: path/query parameters, JSON body, headers.

use crate::api_error::ApiError;
use crate::context::HandlerContext;
use crate::error::Error;
use crate::handler::Handler;
use crate::json::parse_json_bytes;
use crate::optional::Optional;
use crate::params::{FromParams, ParamSource};
use crate::validation::Validate;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Build `ctx.params` from path and query parameters
///
/// Handlers over `P = ()` pass through with `params` left empty.
///
/// Errors (all 400):
/// - `Required parameter 'id' is missing` (`query parameter` for query)
/// - `Invalid parameter 'id': ...` when the value does not parse
/// - `Parameter validation failed` with per-field messages
pub fn parse_params<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: FromParams + Validate + Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, B>| {
        let next = next.clone();
        async move {
            if <P as FromParams>::EXPECTED {
                let request = Arc::clone(&ctx.request);
                let source = ParamSource::new(request.path_params(), request.query_map());
                let params = P::from_params(&source)?;
                params
                    .validate()
                    .map_err(|errors| errors.into_api_error("Parameter validation failed"))?;
                ctx.params = Optional::of(params);
            }
            next.call(ctx).await
        }
    })
}

/// Decode the JSON request body into `ctx.body`
///
/// Non-empty bodies are always kept in `ctx.body_raw`. Handlers over
/// `B = ()` pass through with `body` left empty.
///
/// Errors (all 400):
/// - `Request body is required` for an empty body
/// - `Invalid JSON format: ...` for malformed JSON
/// - `Validation failed` with per-field messages
pub fn parse_body<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: DeserializeOwned + Validate + Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, B>| {
        let next = next.clone();
        async move {
            let raw = ctx.request.body().clone();
            if !raw.is_empty() {
                ctx.body_raw = Optional::of(raw.clone());
            }

            if <B as Validate>::EXPECTED {
                if raw.is_empty() {
                    return Err(ApiError::bad_request("Request body is required").into());
                }
                let mut bytes = raw.to_vec();
                let body: B = parse_json_bytes(&mut bytes).map_err(|e| {
                    let reason = match e {
                        Error::JsonParse { reason } => reason,
                        other => other.to_string(),
                    };
                    ApiError::bad_request(format!("Invalid JSON format: {reason}"))
                })?;
                body.validate()
                    .map_err(|errors| errors.into_api_error("Validation failed"))?;
                ctx.body = Optional::of(body);
            }
            next.call(ctx).await
        }
    })
}

/// Copy the request headers into `ctx.headers`
pub fn parse_headers<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    Handler::new(move |mut ctx: HandlerContext<P, B>| {
        ctx.headers = Optional::of(ctx.request.headers().clone());
        next.call(ctx)
    })
}
