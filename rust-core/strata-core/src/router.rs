//! # Router
//!
//! Radix-trie based router using `matchit`, one trie per HTTP method.
//! This is the host router the registry binds adapted handlers onto.
//!
//! ## Features
//!
//! - Path parameter extraction (`/users/{id}`)
//! - Catch-all routes (`/files/{*path}`)
//! - Duplicate and conflicting patterns rejected at registration

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::ResponseWriter;
use futures_util::future::BoxFuture;
use matchit::Router as MatchitRouter;
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    #[default]
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Map a hyper method; `None` for methods the router does not serve
    #[must_use]
    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        match *method {
            hyper::Method::GET => Some(Self::Get),
            hyper::Method::POST => Some(Self::Post),
            hyper::Method::PUT => Some(Self::Put),
            hyper::Method::DELETE => Some(Self::Delete),
            hyper::Method::PATCH => Some(Self::Patch),
            hyper::Method::HEAD => Some(Self::Head),
            hyper::Method::OPTIONS => Some(Self::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(Error::InvalidRoutePattern {
                pattern: s.to_string(),
                reason: "unknown HTTP method".to_string(),
            }),
        }
    }
}

/// Untyped handler at the router boundary
///
/// Receives the request (path parameters already filled in) and the
/// writer the response goes to.
pub type BoundaryHandler =
    Arc<dyn Fn(Request, ResponseWriter) -> BoxFuture<'static, ()> + Send + Sync>;

/// Matched route with extracted parameters
pub struct Match<'a> {
    /// The handler for this route
    pub handler: &'a BoundaryHandler,
    /// The registered pattern that matched
    pub pattern: &'a str,
    /// Extracted path parameters
    pub params: HashMap<String, String>,
}

impl std::fmt::Debug for Match<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Match")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct RouteEntry {
    pattern: String,
    handler: BoundaryHandler,
}

/// Per-method storage for routes
#[derive(Clone, Default)]
struct MethodRoutes {
    /// Matchit router mapping patterns to indices into `routes`
    router: MatchitRouter<usize>,
    routes: Vec<RouteEntry>,
}

/// HTTP router using one radix trie per method
#[derive(Clone, Default)]
pub struct Router {
    method_routes: HashMap<Method, MethodRoutes>,
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` and `path`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed or
    /// conflicts with an existing one.
    pub fn route(&mut self, method: Method, path: &str, handler: BoundaryHandler) -> Result<()> {
        let method_routes = self.method_routes.entry(method).or_default();
        let index = method_routes.routes.len();

        method_routes
            .router
            .insert(path, index)
            .map_err(|e| Error::InvalidRoutePattern {
                pattern: path.to_string(),
                reason: e.to_string(),
            })?;

        method_routes.routes.push(RouteEntry {
            pattern: path.to_string(),
            handler,
        });
        Ok(())
    }

    /// Register several routes at once, all or none
    ///
    /// The routes are inserted into a copy of this router, which replaces it
    /// only when every insertion succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first `Error::InvalidRoutePattern`; the router is left
    /// unchanged.
    pub fn route_all<I>(&mut self, routes: I) -> Result<()>
    where
        I: IntoIterator<Item = (Method, String, BoundaryHandler)>,
    {
        let mut scratch = self.clone();
        for (method, path, handler) in routes {
            scratch.route(method, &path, handler)?;
        }
        *self = scratch;
        Ok(())
    }

    /// Match a request path against registered routes
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` if no matching route exists
    pub fn match_route(&self, method: Method, path: &str) -> Result<Match<'_>> {
        let not_found = || Error::RouteNotFound {
            path: path.to_string(),
        };
        let method_routes = self.method_routes.get(&method).ok_or_else(not_found)?;
        let matched = method_routes.router.at(path).map_err(|_| not_found())?;
        let entry = method_routes.routes.get(*matched.value).ok_or_else(not_found)?;

        Ok(Match {
            handler: &entry.handler,
            pattern: &entry.pattern,
            params: matched
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// All registered `(method, pattern)` pairs
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut routes: Vec<(Method, String)> = self
            .method_routes
            .iter()
            .flat_map(|(method, routes)| {
                routes
                    .routes
                    .iter()
                    .map(move |entry| (*method, entry.pattern.clone()))
            })
            .collect();
        routes.sort();
        routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.method_routes.values().map(|r| r.routes.len()).sum()
    }

    /// Whether no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convenience method to add a GET route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn get(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Get, path, handler)
    }

    /// Convenience method to add a POST route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn post(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Post, path, handler)
    }

    /// Convenience method to add a PUT route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn put(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Put, path, handler)
    }

    /// Convenience method to add a DELETE route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn delete(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Delete, path, handler)
    }

    /// Convenience method to add a PATCH route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn patch(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Patch, path, handler)
    }

    /// Convenience method to add a HEAD route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn head(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Head, path, handler)
    }

    /// Convenience method to add an OPTIONS route
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub fn options(&mut self, path: &str, handler: BoundaryHandler) -> Result<()> {
        self.route(Method::Options, path, handler)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .finish()
    }
}
