//! # HTTP Request
//!
//! Request wrapper handed to boundary handlers.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Request only handles request data, not response
//! - **O**: Extensible via new methods without breaking changes
//! - **D**: Handlers never see hyper's streaming body, only collected bytes

use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Header carrying the request correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP request with collected body and parsed query
///
/// - Body is collected once, up to the configured limit
/// - Query string is parsed on construction
/// - Path parameters are filled in by the router after matching
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Parsed query parameters
    query_params: HashMap<String, String>,
    /// Parameters captured by the matched route pattern
    path_params: HashMap<String, String>,
    /// Request headers
    headers: HeaderMap,
    /// Request body (empty when none was sent)
    body: Bytes,
    /// Peer address, when served over a socket
    remote_addr: Option<SocketAddr>,
    /// Cancellation and deadline for this request
    execution: ExecutionContext,
    /// Pattern of the matched route, once routed
    route: Option<String>,
    /// When the request was received
    received_at: Instant,
}

impl Request {
    /// Create a request manually (for testing/internal use)
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let query_params = parse_query_string(query_string.as_deref());

        let mut headers = HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self {
            method,
            path,
            query_string,
            query_params,
            path_params: HashMap::new(),
            headers,
            body: body.unwrap_or_default(),
            remote_addr: None,
            execution: ExecutionContext::background(),
            route: None,
            received_at: Instant::now(),
        }
    }

    /// Shorthand for a bodiless request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, HashMap::new(), None)
    }

    /// Create from a hyper request with a body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual body size
    /// exceeds `max_body_size`, `Error::Http` when the body cannot be read and
    /// `Error::InvalidRoutePattern` for methods the router does not serve.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let method = Method::from_hyper(req.method()).ok_or_else(|| Error::InvalidRoutePattern {
            pattern: req.uri().path().to_string(),
            reason: format!("unsupported method {}", req.method()),
        })?;

        let uri = req.uri();
        let path = uri.path().to_string();
        let query_string = uri.query().map(String::from);
        let query_params = parse_query_string(query_string.as_deref());

        let headers = req.headers().clone();
        let declared = headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok());
        if let Some(content_len) = declared {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let body = BodyExt::collect(req.into_body()).await?.to_bytes();
        if body.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: body.len(),
            });
        }

        Ok(Self {
            method,
            path,
            query_string,
            query_params,
            path_params: HashMap::new(),
            headers,
            body,
            remote_addr: None,
            execution: ExecutionContext::background(),
            route: None,
            received_at: Instant::now(),
        })
    }

    /// Attach the request's execution context
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionContext) -> Self {
        self.execution = execution;
        self
    }

    /// Attach the peer address
    #[must_use]
    pub const fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set a header, builder style
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the body, builder style
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Cancellation and deadline for this request
    #[must_use]
    pub const fn execution(&self) -> &ExecutionContext {
        &self.execution
    }

    /// Peer address, when known
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// All request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single query parameter
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    /// Get query parameters as a `HashMap`
    #[must_use]
    pub const fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// A single path parameter
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Parameters captured by the matched route
    #[must_use]
    pub const fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Replace the captured path parameters
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Pattern of the matched route (`/users/{id}`), `None` before routing
    /// or when nothing matched
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Record the matched route pattern
    pub fn set_route(&mut self, pattern: impl Into<String>) {
        self.route = Some(pattern.into());
    }

    /// When the request was received
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// The request body
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Parse query string into `HashMap`
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Percent-decoding with `+` as space; malformed escapes are kept literally
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let decoded = bytes
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = decoded {
                    out.push(byte);
                    i += 2;
                } else {
                    out.push(b'%');
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
