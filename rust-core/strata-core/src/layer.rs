//! # Boundary Layers
//!
//! Request/response interception at the server boundary, before routing
//! and after the handler: request IDs, access logging, content type, CORS.
//! Typed, per-route behaviour lives in [`crate::middleware`] instead.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Each layer has a single responsibility
//! - **O**: Extensible via the `Layer` trait
//! - **D**: Server depends on the trait, not concrete layers

use crate::request::{Request, REQUEST_ID_HEADER};
use crate::response::Response;
use crate::router::Method;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Boundary interception hook
///
/// Layers run in registration order before the handler and in reverse
/// order after it. Every layer whose `before_request` ran also gets
/// `after_response`, and no other layer does.
pub trait Layer: Send + Sync {
    /// Called before routing; may rewrite the request or answer directly
    fn before_request(&self, _req: &mut Request) -> LayerResult {
        LayerResult::Continue
    }

    /// Called after the handler (or a short-circuiting layer) produced a response
    fn after_response(&self, _req: &Request, _res: &mut Response) {}

    /// Layer name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Result of a layer's `before_request`
#[derive(Debug)]
pub enum LayerResult {
    /// Continue to next layer/handler
    Continue,
    /// Short-circuit with this response (skip handler)
    Respond(Response),
}

/// Ordered set of layers
#[derive(Default, Clone)]
pub struct LayerChain {
    layers: Vec<Arc<dyn Layer>>,
}

impl LayerChain {
    /// Create a new empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer
    pub fn add<L: Layer + 'static>(&mut self, layer: L) {
        self.layers.push(Arc::new(layer));
    }

    /// Run `before_request` of every layer until one responds
    ///
    /// On a short-circuit, `after_response` runs right away for the layers
    /// that saw the request, the responding one included, and the finished
    /// response is returned.
    pub fn run_before(&self, req: &mut Request) -> LayerResult {
        for (index, layer) in self.layers.iter().enumerate() {
            if let LayerResult::Respond(mut response) = layer.before_request(req) {
                debug!(layer = layer.name(), status = response.status, "Layer short-circuited request");
                for seen in self.layers[..=index].iter().rev() {
                    seen.after_response(req, &mut response);
                }
                return LayerResult::Respond(response);
            }
        }
        LayerResult::Continue
    }

    /// Run `after_response` of every layer in reverse order
    pub fn run_after(&self, req: &Request, res: &mut Response) {
        for layer in self.layers.iter().rev() {
            layer.after_response(req, res);
        }
    }

    /// Names of the layers, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Get the number of layers
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Propagates or generates `X-Request-ID` and echoes it on the response
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdLayer;

impl Layer for RequestIdLayer {
    fn before_request(&self, req: &mut Request) -> LayerResult {
        if req.header(REQUEST_ID_HEADER).map_or(true, str::is_empty) {
            req.set_header(REQUEST_ID_HEADER, &Uuid::new_v4().to_string());
        }
        LayerResult::Continue
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        if let Some(request_id) = req.header(REQUEST_ID_HEADER) {
            res.set_header(REQUEST_ID_HEADER, request_id);
        }
    }

    fn name(&self) -> &'static str {
        "RequestIdLayer"
    }
}

/// Logs every request and its response status
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLayer;

impl Layer for LoggingLayer {
    fn before_request(&self, req: &mut Request) -> LayerResult {
        let request_id = req.header(REQUEST_ID_HEADER).unwrap_or("-");
        info!(
            method = %req.method,
            path = %req.path,
            request_id = %request_id,
            "Request received"
        );
        LayerResult::Continue
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        let request_id = req.header(REQUEST_ID_HEADER).unwrap_or("-");
        info!(
            method = %req.method,
            path = %req.path,
            status = res.status,
            request_id = %request_id,
            "Response sent"
        );
    }

    fn name(&self) -> &'static str {
        "LoggingLayer"
    }
}

/// Sets a content type on responses that carry a body but none yet
#[derive(Debug, Clone)]
pub struct ContentTypeLayer {
    content_type: String,
}

impl Default for ContentTypeLayer {
    fn default() -> Self {
        Self::new(crate::response::JSON_CONTENT_TYPE)
    }
}

impl ContentTypeLayer {
    /// Use `content_type` as the fallback
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }
}

impl Layer for ContentTypeLayer {
    fn after_response(&self, _req: &Request, res: &mut Response) {
        if res.content_type.is_none() && !res.body.is_empty() {
            res.content_type = Some(self.content_type.clone());
        }
    }

    fn name(&self) -> &'static str {
        "ContentTypeLayer"
    }
}

/// Cross-Origin Resource Sharing
///
/// Denies every origin until origins are allowed explicitly; `"*"` allows all.
/// Preflight `OPTIONS` requests are answered with 204 directly.
#[derive(Debug, Clone)]
pub struct CorsLayer {
    allowed_origins: Vec<String>,
    allow_methods: String,
    allow_headers: String,
    max_age: u32,
}

impl Default for CorsLayer {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization, X-Request-ID".to_string(),
            max_age: 300,
        }
    }
}

impl CorsLayer {
    /// Create a CORS layer that allows no origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow an origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Set preflight cache lifetime in seconds
    #[must_use]
    pub const fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    /// The `Access-Control-Allow-Origin` value for `origin`, if allowed
    #[must_use]
    pub fn allowed_origin<'a>(&self, origin: &'a str) -> Option<&'a str> {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
            .then_some(origin)
    }

    fn apply(&self, origin: &str, res: &mut Response) {
        res.set_header("access-control-allow-origin", origin);
        res.set_header("access-control-allow-methods", &self.allow_methods);
        res.set_header("access-control-allow-headers", &self.allow_headers);
        res.set_header("access-control-max-age", &self.max_age.to_string());
        res.set_header("vary", "Origin");
    }
}

impl Layer for CorsLayer {
    fn before_request(&self, req: &mut Request) -> LayerResult {
        let is_preflight = req.method == Method::Options
            && req.header("access-control-request-method").is_some();
        if !is_preflight {
            return LayerResult::Continue;
        }
        let mut response = Response::empty().with_status(204);
        if let Some(origin) = req.header("origin").and_then(|o| self.allowed_origin(o)) {
            self.apply(origin, &mut response);
        }
        LayerResult::Respond(response)
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        if res.header("access-control-allow-origin").is_some() {
            return;
        }
        if let Some(origin) = req.header("origin").and_then(|o| self.allowed_origin(o)) {
            self.apply(origin, res);
        }
    }

    fn name(&self) -> &'static str {
        "CorsLayer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Deny;

    impl Layer for Deny {
        fn before_request(&self, _req: &mut Request) -> LayerResult {
            LayerResult::Respond(Response::text("no").with_status(403))
        }
    }

    #[test]
    fn test_layer_chain_add() {
        let mut chain = LayerChain::new();
        assert!(chain.is_empty());
        chain.add(RequestIdLayer);
        chain.add(LoggingLayer);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.names(), vec!["RequestIdLayer", "LoggingLayer"]);
    }

    #[test]
    fn test_short_circuit() {
        let mut chain = LayerChain::new();
        chain.add(Deny);
        let mut req = Request::get("/");
        match chain.run_before(&mut req) {
            LayerResult::Respond(resp) => assert_eq!(resp.status, 403),
            LayerResult::Continue => panic!("expected short-circuit"),
        }
    }

    struct Tally(Arc<std::sync::Mutex<Vec<&'static str>>>, &'static str);

    impl Layer for Tally {
        fn after_response(&self, _req: &Request, _res: &mut Response) {
            self.0.lock().unwrap().push(self.1);
        }
    }

    #[test]
    fn test_short_circuit_skips_unseen_layers() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut chain = LayerChain::new();
        chain.add(Tally(Arc::clone(&seen), "outer"));
        chain.add(Deny);
        chain.add(Tally(Arc::clone(&seen), "inner"));

        let mut req = Request::get("/");
        assert!(matches!(chain.run_before(&mut req), LayerResult::Respond(_)));
        assert_eq!(*seen.lock().unwrap(), vec!["outer"]);
    }

    #[test]
    fn test_request_id_generated_and_echoed() {
        let layer = RequestIdLayer;
        let mut req = Request::get("/");
        layer.before_request(&mut req);
        let id = req.header(REQUEST_ID_HEADER).unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());

        let mut res = Response::empty();
        layer.after_response(&req, &mut res);
        assert_eq!(res.header(REQUEST_ID_HEADER), Some(id.as_str()));
    }

    #[test]
    fn test_request_id_propagated() {
        let mut req = Request::get("/").with_header("X-Request-ID", "upstream-1");
        RequestIdLayer.before_request(&mut req);
        assert_eq!(req.header(REQUEST_ID_HEADER), Some("upstream-1"));
    }

    #[test]
    fn test_content_type_fallback() {
        let layer = ContentTypeLayer::default();
        let req = Request::get("/");
        let mut res = Response::empty().with_status(200);
        res.body = "{}".into();
        layer.after_response(&req, &mut res);
        assert_eq!(res.header("content-type"), Some("application/json"));

        let mut empty = Response::empty().with_status(204);
        layer.after_response(&req, &mut empty);
        assert_eq!(empty.content_type, None);
    }

    #[test]
    fn test_cors_denies_by_default() {
        let layer = CorsLayer::new();
        let req = Request::get("/").with_header("Origin", "https://evil.example");
        let mut res = Response::empty();
        layer.after_response(&req, &mut res);
        assert_eq!(res.header("access-control-allow-origin"), None);
    }

    #[test]
    fn test_cors_preflight_for_allowed_origin() {
        let layer = CorsLayer::new().allow_origin("https://app.example");
        let headers = HashMap::from([
            ("origin".to_string(), "https://app.example".to_string()),
            ("access-control-request-method".to_string(), "POST".to_string()),
        ]);
        let mut req = Request::new(Method::Options, "/users", headers, None);
        match layer.before_request(&mut req) {
            LayerResult::Respond(resp) => {
                assert_eq!(resp.status, 204);
                assert_eq!(
                    resp.header("access-control-allow-origin"),
                    Some("https://app.example")
                );
            }
            LayerResult::Continue => panic!("expected preflight response"),
        }
    }
}
