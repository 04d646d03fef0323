//! # Strata Macros
//!
//! Derive macros for the Strata framework.
//!
//! - `#[derive(FromParams)]` builds a parameter struct from path and query values
//! - `#[derive(ApiSchema)]` describes a type's JSON shape for OpenAPI
//!
//! Both expand to paths under `::strata_core`.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod attrs;
mod params;
mod schema;

/// Derive `strata_core::params::FromParams`
///
/// # Usage
///
/// ```ignore
/// #[derive(FromParams)]
/// struct GetUser {
///     #[param(path)]
///     id: i64,
///     #[param(query, rename = "include", description = "Include deleted rows")]
///     include_deleted: Option<bool>,
///     #[param(query, default)]
///     page: u32,
/// }
/// ```
#[proc_macro_derive(FromParams, attributes(param))]
pub fn derive_from_params(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    params::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive `strata_core::schema::ApiSchema`
///
/// Honours `#[serde(rename, rename_all, skip, default)]` so the schema
/// matches the serialized form. Descriptions come from
/// `#[schema(description = "...")]` or doc comments.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, ApiSchema)]
/// #[serde(rename_all = "camelCase")]
/// struct User {
///     /// Primary key
///     id: i64,
///     display_name: Option<String>,
/// }
/// ```
#[proc_macro_derive(ApiSchema, attributes(schema, serde))]
pub fn derive_api_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    schema::expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
