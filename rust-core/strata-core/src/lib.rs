//! # Strata Core
//!
//! Core library for building typed JSON APIs on Hyper and Tokio.
//!
//! A handler is a function of a [`HandlerContext<P, B>`] returning
//! `HandlerResult<R>`: `P` are the path/query parameters, `B` the request
//! body and `R` the response. Middleware wraps handlers of the same three
//! types, so parsing, authentication and response writing compose without
//! losing those types. [`make_handler`] composes a handler with its
//! middleware and records it in a [`Registry`], which later binds every
//! route onto a [`Router`] and feeds the OpenAPI generator.
//!
//! ```ignore
//! use strata_core::middleware::{parse_params, response_json};
//! use strata_core::{make_handler, middleware, FromParams, HandlerContext, Registry, RouteInfo, Validate};
//!
//! #[derive(FromParams)]
//! struct UserPath {
//!     #[param(path)]
//!     id: u32,
//! }
//!
//! impl Validate for UserPath {}
//!
//! let registry = Registry::new();
//! make_handler(
//!     &registry,
//!     RouteInfo::get("/users/{id}"),
//!     |ctx: HandlerContext<UserPath, ()>| async move { Ok(ctx.params.get().map(|p| p.id)) },
//!     middleware![parse_params, response_json],
//! )?;
//! ```
//!
//! ## Modules
//!
//! - `handler` - Typed handlers, middleware and composition
//! - `registry` - Per-server route bookkeeping
//! - `adapter` - Typed handler to boundary handler, error classification
//! - `context` - Per-request handler context
//! - `optional` - Present/absent slots of the context
//! - `execution` - Request cancellation and deadlines
//! - `middleware` - Built-in typed middleware
//! - `server` - HTTP server built on Hyper
//! - `router` - Routing using matchit (radix trie)
//! - `layer` - Boundary request/response layers
//! - `metrics` - Prometheus request metrics
//! - `request` / `response` - HTTP request and response types
//! - `params` / `schema` / `validation` - Parameter extraction, schema
//!   descriptors and structured validation errors
//! - `openapi` - OpenAPI document generation
//! - `database` - SQLx database helpers (SQLite, PostgreSQL)
//! - `auth` - Bearer token issue and validation
//! - `json` - JSON parsing with simd-json
//! - `state` - Type-keyed shared state
//! - `telemetry` - Log subscriber setup
//! - `error` / `api_error` - Error types

extern crate self as strata_core;

pub mod adapter;
pub mod api_error;
pub mod auth;
pub mod context;
pub mod database;
pub mod error;
pub mod execution;
pub mod handler;
pub mod json;
pub mod layer;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod optional;
pub mod params;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod schema;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod validation;

pub use adapter::{Dependencies, ErrorPolicy};
pub use api_error::{ApiError, HandlerError};
pub use auth::{AuthConfig, Claims};
pub use context::HandlerContext;
pub use database::{DatabaseConfig, DatabasePool, DbValue, NullKind, PoolConfig, Querier, Transaction};
pub use error::{Error, ExecutionError, Result};
pub use execution::ExecutionContext;
pub use handler::{compose, make_handler, Handler, HandlerResult, Middleware};
pub use layer::{Layer, LayerChain, LayerResult};
pub use metrics::MetricsLayer;
pub use openapi::ApiInfo;
pub use optional::Optional;
pub use params::FromParams;
pub use registry::{Registry, RouteDefinition, RouteInfo};
pub use request::Request;
pub use response::{Response, ResponseWriter};
pub use router::{Method, Router};
pub use schema::{ApiSchema, Schema};
pub use server::{Server, ServerConfig};
pub use state::TypeState;
pub use validation::{FieldError, Validate, ValidationCode, ValidationErrors};

pub use strata_macros::{ApiSchema, FromParams};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
