//! # Typed Middleware
//!
//! Ready-made transformers over [`Handler<P, B, R>`](crate::Handler). Each
//! is an ordinary `Fn(Handler<P, B, R>) -> Handler<P, B, R>`, so it can be
//! listed in [`middleware!`](crate::middleware!) and composed by
//! [`make_handler`](crate::make_handler):
//!
//! ```ignore
//! let handler = make_handler(
//!     &registry,
//!     RouteInfo::post("/users"),
//!     create_user,
//!     middleware![parse_body, response_json, with_logging, with_request_id],
//! )?;
//! ```
//!
//! The last-listed middleware runs first, so parsing belongs at the front
//! of the list and request-scoped concerns (request id, logging, auth) at
//! the back.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: One concern per middleware
//! - **O**: New middleware are plain functions, no registration needed
//! - **L**: Every middleware preserves the handler's type

mod auth;
mod file;
mod logging;
mod request;
mod request_id;
mod response;

pub use auth::{require_auth, skip_identity_check, IdentityCheck};
pub use file::{parse_csv, parse_json_file, FILE_FIELD};
pub use logging::with_logging;
pub use request::{parse_body, parse_headers, parse_params};
pub use request_id::with_request_id;
pub use response::{response_json, response_json_file};
