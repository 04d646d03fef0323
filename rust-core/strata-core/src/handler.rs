//! # Handlers & Middleware Composition
//!
//! A [`Handler<P, B, R>`] turns a [`HandlerContext<P, B>`] into `R` or a
//! [`HandlerError`]. A [`Middleware<P, B, R>`] wraps one handler into another
//! of the same type, so any number of them compose by plain function
//! application.
//!
//! ## Ordering
//!
//! [`compose`] applies the list front to back, each middleware wrapping the
//! result so far. The **last-listed** middleware is therefore outermost:
//! for `[a, b]` execution runs `b` pre, `a` pre, handler, `a` post, `b` post.
//!
//! [`make_handler`] composes and also records the route in a [`Registry`].

use crate::api_error::HandlerError;
use crate::context::HandlerContext;
use crate::error::Result;
use crate::params::FromParams;
use crate::registry::{Registry, RouteInfo};
use crate::schema::ApiSchema;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Result type of every handler
pub type HandlerResult<R> = std::result::Result<R, HandlerError>;

type HandlerFn<P, B, R> =
    dyn Fn(HandlerContext<P, B>) -> BoxFuture<'static, HandlerResult<R>> + Send + Sync;

/// Type-erased async handler
pub struct Handler<P, B, R> {
    inner: Arc<HandlerFn<P, B, R>>,
}

impl<P, B, R> Clone for Handler<P, B, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, B, R> std::fmt::Debug for Handler<P, B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

impl<P, B, R> Handler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    /// Wrap an async function or closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HandlerContext<P, B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        let inner: Arc<HandlerFn<P, B, R>> =
            Arc::new(move |ctx: HandlerContext<P, B>| -> BoxFuture<'static, HandlerResult<R>> {
                Box::pin(f(ctx))
            });
        Self { inner }
    }
}

impl<P, B, R> Handler<P, B, R> {
    /// Invoke the handler
    pub fn call(&self, ctx: HandlerContext<P, B>) -> BoxFuture<'static, HandlerResult<R>> {
        (self.inner)(ctx)
    }
}

type WrapFn<P, B, R> = dyn Fn(Handler<P, B, R>) -> Handler<P, B, R> + Send + Sync;

/// A named handler transformer
pub struct Middleware<P, B, R> {
    name: String,
    wrap: Arc<WrapFn<P, B, R>>,
}

impl<P, B, R> Clone for Middleware<P, B, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            wrap: Arc::clone(&self.wrap),
        }
    }
}

impl<P, B, R> std::fmt::Debug for Middleware<P, B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<P, B, R> Middleware<P, B, R> {
    /// Wrap a transformer, naming it after its function
    ///
    /// For `parse_params` the name is `"parse_params"`; for the closure
    /// returned by `require_auth(..)` it is `"require_auth"`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Handler<P, B, R>) -> Handler<P, B, R> + Send + Sync + 'static,
    {
        Self {
            name: middleware_name::<F>(),
            wrap: Arc::new(f),
        }
    }

    /// Wrap a transformer under an explicit name
    pub fn named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Handler<P, B, R>) -> Handler<P, B, R> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            wrap: Arc::new(f),
        }
    }

    /// The recorded name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `next`
    #[must_use]
    pub fn wrap(&self, next: Handler<P, B, R>) -> Handler<P, B, R> {
        (self.wrap)(next)
    }
}

/// Build a `Vec<Middleware<_, _, _>>` from transformer functions
///
/// ```ignore
/// let chain = middleware![parse_params, parse_body, response_json];
/// ```
#[macro_export]
macro_rules! middleware {
    ($($mw:expr),* $(,)?) => {
        ::std::vec![$($crate::Middleware::from_fn($mw)),*]
    };
}

/// Name recorded for middleware written as an inline closure
pub const ANONYMOUS: &str = "anonymous";

/// Short identifier of `F` for diagnostics and documentation
///
/// Strips generic arguments, the module path and closure markers from
/// `std::any::type_name`. A closure returned by a generic middleware
/// factory takes the factory's name; a closure written inline is
/// `"anonymous"`. Falls back to `"unknown"` for other unnamed types.
#[must_use]
pub fn middleware_name<F: ?Sized>() -> String {
    short_type_name(std::any::type_name::<F>())
}

fn short_type_name(full: &str) -> String {
    const CLOSURE: &str = "::{{closure}}";
    let mut owner = full;
    while let Some(rest) = owner.strip_suffix(CLOSURE) {
        owner = rest;
    }
    // A generic owner is a factory; a plain function merely encloses the closure
    if owner.len() != full.len() && !owner.ends_with('>') {
        return ANONYMOUS.to_string();
    }
    let mut depth = 0usize;
    let mut prev = ' ';
    let mut stripped = String::with_capacity(full.len());
    for c in full.chars() {
        match c {
            '<' => depth += 1,
            // `->` inside a fn pointer type is not a closing bracket
            '>' if prev != '-' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
        prev = c;
    }
    if stripped.contains('(') || stripped.contains('&') || stripped.contains(' ') {
        return "unknown".to_string();
    }
    stripped
        .rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

/// Apply `middleware` to `base`, the last entry becoming outermost
pub fn compose<P, B, R>(base: Handler<P, B, R>, middleware: &[Middleware<P, B, R>]) -> Handler<P, B, R> {
    middleware.iter().fold(base, |handler, mw| mw.wrap(handler))
}

/// Compose `base` with `middleware` and record the route in `registry`
///
/// The registry entry keeps the route metadata, the middleware names in
/// list order and the parameter, body and response schemas.
///
/// # Errors
///
/// Returns `Error::DuplicateRoute` when the registry already has a route
/// with the same method and path.
pub fn make_handler<P, B, R, F, Fut, I>(
    registry: &Registry,
    route: RouteInfo,
    base: F,
    middleware: I,
) -> Result<Handler<P, B, R>>
where
    P: FromParams + Send + 'static,
    B: ApiSchema + Send + 'static,
    R: ApiSchema + Send + 'static,
    F: Fn(HandlerContext<P, B>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    I: IntoIterator<Item = Middleware<P, B, R>>,
{
    let middleware: Vec<Middleware<P, B, R>> = middleware.into_iter().collect();
    let names = middleware.iter().map(|mw| mw.name().to_string()).collect();
    let handler = compose(Handler::new(base), &middleware);
    registry.register(route, handler.clone(), names)?;
    Ok(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Dependencies;
    use crate::request::Request;
    use crate::response::ResponseWriter;
    use std::sync::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn ctx() -> HandlerContext<(), ()> {
        HandlerContext::new(
            Arc::new(Request::get("/")),
            ResponseWriter::new(),
            &Dependencies::default(),
        )
    }

    fn tracing_mw(label: &'static str, trace: Trace) -> Middleware<(), (), String> {
        Middleware::named(label, move |next: Handler<(), (), String>| {
            let trace = Arc::clone(&trace);
            Handler::new(move |ctx: HandlerContext<(), ()>| {
                let next = next.clone();
                let trace = Arc::clone(&trace);
                async move {
                    trace.lock().unwrap().push(format!("{label}-pre"));
                    let out = next.call(ctx).await;
                    trace.lock().unwrap().push(format!("{label}-post"));
                    out
                }
            })
        })
    }

    #[tokio::test]
    async fn test_last_listed_is_outermost() {
        let trace: Trace = Arc::default();
        let base_trace = Arc::clone(&trace);
        let base = Handler::new(move |_ctx: HandlerContext<(), ()>| {
            let trace = Arc::clone(&base_trace);
            async move {
                trace.lock().unwrap().push("H".to_string());
                Ok("done".to_string())
            }
        });

        let chain = vec![
            tracing_mw("A", Arc::clone(&trace)),
            tracing_mw("B", Arc::clone(&trace)),
        ];
        let handler = compose(base, &chain);
        assert_eq!(handler.call(ctx()).await.unwrap(), "done");
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["B-pre", "A-pre", "H", "A-post", "B-post"]
        );
    }

    #[tokio::test]
    async fn test_compose_without_middleware_is_base() {
        let base = Handler::new(|_ctx: HandlerContext<(), ()>| async { Ok(7_u32) });
        let handler = compose(base, &[]);
        assert_eq!(handler.call(ctx()).await.unwrap(), 7);
    }

    fn passthrough<P, B, R>(next: Handler<P, B, R>) -> Handler<P, B, R> {
        next
    }

    #[test]
    fn test_name_from_function() {
        let mw: Middleware<(), (), ()> = Middleware::from_fn(passthrough);
        assert_eq!(mw.name(), "passthrough");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(
            short_type_name("strata_core::middleware::request::parse_params<(), (), ()>"),
            "parse_params"
        );
        assert_eq!(
            short_type_name("strata_core::middleware::auth::require_auth<A, B, C>::{{closure}}"),
            "require_auth"
        );
        assert_eq!(short_type_name("fn(Handler<(), (), ()>) -> Handler<(), (), ()>"), "unknown");
    }

    #[test]
    fn test_inline_closure_is_anonymous() {
        assert_eq!(short_type_name("app::routes::my_route::{{closure}}"), ANONYMOUS);
        assert_eq!(
            short_type_name("app::routes::my_route::{{closure}}::{{closure}}"),
            ANONYMOUS
        );

        let inline: Middleware<(), (), ()> = Middleware::from_fn(|next: Handler<(), (), ()>| next);
        assert_eq!(inline.name(), ANONYMOUS);
        let named: Middleware<(), (), ()> = Middleware::named("audit", |next: Handler<(), (), ()>| next);
        assert_eq!(named.name(), "audit");
    }

    #[test]
    fn test_make_handler_registers_route() {
        let registry = Registry::new();
        let mw: Middleware<(), (), ()> = Middleware::from_fn(passthrough);
        make_handler(
            &registry,
            RouteInfo::get("/ping"),
            |_ctx: HandlerContext<(), ()>| async { Ok(()) },
            vec![mw],
        )
        .unwrap();

        let routes = registry.get_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].info.path, "/ping");
        assert_eq!(routes[0].middleware_names, vec!["passthrough".to_string()]);
    }
}
