//! # Route Registry
//!
//! A [`Registry`] accumulates the routes of one logical server. Routes are
//! recorded by [`crate::make_handler`] and later bound onto a boundary
//! [`Router`] with [`Registry::bind_to`].
//!
//! Registries are plain values: several may coexist in one process (public
//! and admin APIs on different ports, say) without sharing anything.

use crate::adapter::{adapt_handler, Dependencies};
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::params::{FromParams, ParamDescriptor};
use crate::router::{BoundaryHandler, Method, Router};
use crate::schema::{ApiSchema, Schema};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Route metadata supplied at registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteInfo {
    /// HTTP method
    pub method: Method,
    /// Path pattern, e.g. `/users/{id}`
    pub path: String,
    /// Short summary for documentation
    pub summary: Option<String>,
    /// Long description for documentation
    pub description: Option<String>,
    /// Documentation tags
    pub tags: Vec<String>,
}

impl RouteInfo {
    /// Route for `method` and `path`
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// GET route
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST route
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// PUT route
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// DELETE route
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// PATCH route
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Set the summary
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Parameter, body and response shapes of a route
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSchema {
    /// Path and query parameters
    pub params: Vec<ParamDescriptor>,
    /// Request body, `None` when the handler takes none
    pub body: Option<Schema>,
    /// Response body, `None` when the handler returns none
    pub response: Option<Schema>,
}

impl RouteSchema {
    /// Shapes of a handler over `P`, `B` and `R`
    #[must_use]
    pub fn of<P: FromParams, B: ApiSchema, R: ApiSchema>() -> Self {
        let present = |schema: Schema| (!schema.is_unit()).then_some(schema);
        Self {
            params: P::describe(),
            body: present(B::schema()),
            response: present(R::schema()),
        }
    }
}

/// A composed handler that can be turned into a boundary handler
pub trait Adaptable: Send + Sync {
    /// Adapt to the boundary signature with `deps` injected
    fn adapt(&self, deps: Dependencies) -> BoundaryHandler;
}

struct TypedHandler<P, B, R> {
    handler: Handler<P, B, R>,
}

impl<P, B, R> Adaptable for TypedHandler<P, B, R>
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    fn adapt(&self, deps: Dependencies) -> BoundaryHandler {
        adapt_handler(deps, self.handler.clone())
    }
}

/// One registered endpoint
#[derive(Clone)]
pub struct RouteDefinition {
    /// Route metadata
    pub info: RouteInfo,
    /// Middleware names, in list order
    pub middleware_names: Vec<String>,
    /// Shapes captured at composition time
    pub schema: RouteSchema,
    /// The composed handler
    pub handler: Arc<dyn Adaptable>,
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("info", &self.info)
            .field("middleware_names", &self.middleware_names)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Thread-safe list of route definitions for one server
///
/// Share it across threads with `Arc<Registry>`.
#[derive(Default)]
pub struct Registry {
    routes: RwLock<Vec<RouteDefinition>>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a composed handler
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateRoute` if a route with the same method and
    /// path (parameter names ignored) is already registered.
    pub fn register<P, B, R>(
        &self,
        info: RouteInfo,
        handler: Handler<P, B, R>,
        middleware_names: Vec<String>,
    ) -> Result<()>
    where
        P: FromParams + Send + 'static,
        B: ApiSchema + Send + 'static,
        R: ApiSchema + Send + 'static,
    {
        let definition = RouteDefinition {
            schema: RouteSchema::of::<P, B, R>(),
            info,
            middleware_names,
            handler: Arc::new(TypedHandler { handler }),
        };

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let key = normalize_path(&definition.info.path);
        if routes
            .iter()
            .any(|r| r.info.method == definition.info.method && normalize_path(&r.info.path) == key)
        {
            return Err(Error::DuplicateRoute {
                method: definition.info.method.to_string(),
                path: definition.info.path,
            });
        }
        debug!(
            method = %definition.info.method,
            path = %definition.info.path,
            middleware = ?definition.middleware_names,
            "Route registered"
        );
        routes.push(definition);
        Ok(())
    }

    /// Copy of the current route list
    #[must_use]
    pub fn get_routes(&self) -> Vec<RouteDefinition> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adapt every route and register it on `router`
    ///
    /// Binding is all or nothing: on error no route of this registry is
    /// left on `router`.
    ///
    /// # Errors
    ///
    /// Returns the router's error if a pattern is invalid or conflicts with
    /// a route already on the router.
    pub fn bind_to(&self, router: &mut Router, deps: &Dependencies) -> Result<()> {
        let routes = self.get_routes();
        let adapted: Vec<_> = routes
            .iter()
            .map(|route| {
                debug!(method = %route.info.method, path = %route.info.path, "Route adapted");
                (
                    route.info.method,
                    route.info.path.clone(),
                    route.handler.adapt(deps.clone()),
                )
            })
            .collect();
        router.route_all(adapted)?;
        info!(routes = routes.len(), "Registry bound to router");
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("routes", &self.len())
            .finish()
    }
}

/// Replace every `{name}` segment with `{}`
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                if segment.starts_with("{*") {
                    "{*}"
                } else {
                    "{}"
                }
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
