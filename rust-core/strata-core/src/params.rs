//! # Parameter Extraction
//!
//! [`FromParams`] builds a typed parameter struct from the matched path
//! parameters and the query string. Derive it with `#[derive(FromParams)]`:
//!
//! ```ignore
//! #[derive(FromParams)]
//! struct GetUser {
//!     #[param(path)]
//!     id: i64,
//!     #[param(query, rename = "include")]
//!     include_deleted: Option<bool>,
//! }
//! ```
//!
//! Fields without `#[param]` are read from the query string under their own
//! name. `Option<T>` fields are optional, `#[param(default)]` falls back to
//! `T::default()`, every other field is required.

use crate::api_error::ApiError;
use crate::schema::Schema;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Where a parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    /// Matched path segment
    Path,
    /// Query string
    Query,
}

impl ParamLocation {
    /// Label used in client-facing messages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Path => "parameter",
            Self::Query => "query parameter",
        }
    }
}

/// Raw parameter values of one request
#[derive(Debug, Clone, Copy)]
pub struct ParamSource<'a> {
    path: &'a HashMap<String, String>,
    query: &'a HashMap<String, String>,
}

impl<'a> ParamSource<'a> {
    /// Wrap matched path parameters and parsed query parameters
    #[must_use]
    pub const fn new(path: &'a HashMap<String, String>, query: &'a HashMap<String, String>) -> Self {
        Self { path, query }
    }

    /// Raw value at `location`; empty strings count as missing
    #[must_use]
    pub fn get(&self, location: ParamLocation, name: &str) -> Option<&'a str> {
        let map = match location {
            ParamLocation::Path => self.path,
            ParamLocation::Query => self.query,
        };
        map.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Static description of one parameter, for OpenAPI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
    /// Wire name
    pub name: String,
    /// Where it is read from
    #[serde(rename = "in")]
    pub location: ParamLocation,
    /// Whether a missing value is rejected
    pub required: bool,
    /// Value schema
    pub schema: Schema,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Types built from path and query parameters
pub trait FromParams: Sized {
    /// Whether parameters are expected at all; `false` only for `()`
    const EXPECTED: bool = true;

    /// Extract and convert every field
    ///
    /// # Errors
    ///
    /// Returns a 400 `ApiError` naming the first missing or malformed parameter.
    fn from_params(source: &ParamSource<'_>) -> Result<Self, ApiError>;

    /// Describe the parameters this type reads
    fn describe() -> Vec<ParamDescriptor> {
        Vec::new()
    }
}

impl FromParams for () {
    const EXPECTED: bool = false;

    fn from_params(_source: &ParamSource<'_>) -> Result<Self, ApiError> {
        Ok(())
    }
}

fn convert<T>(location: ParamLocation, name: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|err| {
        ApiError::bad_request(format!("Invalid {} '{name}': {err}", location.label()))
    })
}

/// Extract a required parameter
///
/// # Errors
///
/// Returns 400 when the parameter is missing or cannot be parsed.
pub fn extract_required<T>(source: &ParamSource<'_>, location: ParamLocation, name: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = source.get(location, name).ok_or_else(|| {
        ApiError::bad_request(format!("Required {} '{name}' is missing", location.label()))
    })?;
    convert(location, name, raw)
}

/// Extract an optional parameter
///
/// # Errors
///
/// Returns 400 when the parameter is present but cannot be parsed.
pub fn extract_optional<T>(source: &ParamSource<'_>, location: ParamLocation, name: &str) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    source
        .get(location, name)
        .map(|raw| convert(location, name, raw))
        .transpose()
}

/// Extract a parameter, using `T::default()` when missing
///
/// # Errors
///
/// Returns 400 when the parameter is present but cannot be parsed.
pub fn extract_or_default<T>(source: &ParamSource<'_>, location: ParamLocation, name: &str) -> Result<T, ApiError>
where
    T: FromStr + Default,
    T::Err: Display,
{
    Ok(extract_optional(source, location, name)?.unwrap_or_default())
}
