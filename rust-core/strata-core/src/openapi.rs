//! # OpenAPI Generation
//!
//! Builds an OpenAPI 3.0 document from the routes of a [`Registry`]. All
//! shapes come from the [`RouteSchema`](crate::registry::RouteSchema)
//! captured when each handler was composed.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only turns route definitions into a document; serving it is one
//!   boundary handler registered by [`mount`]
//! - **O**: Naming defaults (summary, tags) apply only where the route
//!   metadata leaves a gap

use crate::error::Result;
use crate::json::to_json_pretty;
use crate::params::ParamLocation;
use crate::registry::{Registry, RouteDefinition};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::router::{BoundaryHandler, Method, Router};
use futures_util::future::{ready, BoxFuture};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// OpenAPI version emitted
pub const OPENAPI_VERSION: &str = "3.0.3";

const AUTH_MIDDLEWARE: &str = "require_auth";
const JSON_MIDDLEWARE: &str = "response_json";
const SECURITY_SCHEME: &str = "bearerAuth";

/// Top-level document metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    /// API title
    pub title: String,
    /// API description
    pub description: String,
    /// API version
    pub version: String,
    /// Server URLs
    pub servers: Vec<String>,
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self {
            title: "API".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            servers: Vec::new(),
        }
    }
}

impl ApiInfo {
    /// Metadata with `title` and `version`
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a server URL
    #[must_use]
    pub fn with_server(mut self, url: impl Into<String>) -> Self {
        self.servers.push(url.into());
        self
    }
}

/// Build the OpenAPI document for every route in `registry`
#[must_use]
pub fn generate(registry: &Registry, info: &ApiInfo) -> Value {
    let routes = registry.get_routes();
    let mut paths: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut secured = false;

    for route in &routes {
        secured |= requires_auth(route);
        paths
            .entry(openapi_path(&route.info.path))
            .or_default()
            .insert(route.info.method.as_str().to_lowercase(), operation(route));
    }

    let mut document = json!({
        "openapi": OPENAPI_VERSION,
        "info": {
            "title": info.title,
            "version": info.version,
        },
        "paths": paths,
    });
    if !info.description.is_empty() {
        document["info"]["description"] = json!(info.description);
    }
    if !info.servers.is_empty() {
        document["servers"] = info.servers.iter().map(|url| json!({ "url": url })).collect();
    }
    if secured {
        document["components"] = json!({
            "securitySchemes": {
                SECURITY_SCHEME: {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                    "description": "JWT Authorization header using the Bearer scheme",
                }
            }
        });
    }
    debug!(routes = routes.len(), "OpenAPI document generated");
    document
}

/// [`generate`] rendered as pretty-printed JSON
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn generate_json(registry: &Registry, info: &ApiInfo) -> Result<String> {
    to_json_pretty(&generate(registry, info))
}

/// Serve the document at `GET {base_path}/openapi.json`
///
/// The document is regenerated per request, so routes registered after
/// mounting still show up.
///
/// # Errors
///
/// Returns the router's error if the route conflicts with an existing one.
pub fn mount(router: &mut Router, registry: Arc<Registry>, info: ApiInfo, base_path: &str) -> Result<()> {
    let path = format!("{}/openapi.json", base_path.trim_end_matches('/'));
    let info = Arc::new(info);
    let handler: BoundaryHandler = Arc::new(move |_req: Request, writer: ResponseWriter| -> BoxFuture<'static, ()> {
        let response = match generate_json(&registry, &info) {
            Ok(body) => Response::json(body),
            Err(e) => {
                error!(error = %e, "Failed to generate API specification");
                Response::text("Failed to generate API specification").with_status(500)
            }
        };
        writer.write(response);
        Box::pin(ready(()))
    });
    router.route(Method::Get, &path, handler)
}

fn operation(route: &RouteDefinition) -> Value {
    let mut op = json!({
        "summary": summary(route),
        "description": description(route),
        "tags": tags(route),
        "operationId": operation_id(route),
        "parameters": parameters(route),
        "responses": responses(route),
    });

    if let Some(body) = &route.schema.body {
        op["requestBody"] = json!({
            "required": true,
            "content": { "application/json": { "schema": body } },
        });
    }
    if requires_auth(route) {
        op["security"] = json!([{ SECURITY_SCHEME: [] }]);
    }
    if !route.middleware_names.is_empty() {
        op["x-middleware"] = json!(route.middleware_names);
    }
    op
}

fn requires_auth(route: &RouteDefinition) -> bool {
    route.middleware_names.iter().any(|name| name == AUTH_MIDDLEWARE)
}

fn summary(route: &RouteDefinition) -> String {
    if let Some(summary) = &route.info.summary {
        return summary.clone();
    }
    let last = segments(&route.info.path)
        .filter(|segment| !is_param(segment))
        .last();
    match last {
        Some(segment) => format!("{} {}", verb(route.info.method), title_case(segment)),
        None => format!("{} {}", route.info.method, route.info.path),
    }
}

fn description(route: &RouteDefinition) -> String {
    route
        .info
        .description
        .clone()
        .unwrap_or_else(|| format!("{} endpoint for {}", route.info.method, route.info.path))
}

fn tags(route: &RouteDefinition) -> Vec<String> {
    if !route.info.tags.is_empty() {
        return route.info.tags.clone();
    }
    let tag = segments(&route.info.path)
        .find(|segment| !is_param(segment) && *segment != "api" && *segment != "v1")
        .map_or_else(|| "API".to_string(), title_case);
    vec![tag]
}

fn operation_id(route: &RouteDefinition) -> String {
    let mut id = route.info.method.as_str().to_lowercase();
    for segment in segments(&route.info.path) {
        let name = segment.trim_start_matches('{').trim_start_matches('*').trim_end_matches('}');
        id.push('_');
        id.extend(name.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }));
    }
    id
}

fn parameters(route: &RouteDefinition) -> Vec<Value> {
    let mut out: Vec<Value> = route
        .schema
        .params
        .iter()
        .map(|p| {
            let mut param = json!(p);
            if p.location == ParamLocation::Path {
                param["required"] = json!(true);
            }
            param
        })
        .collect();

    for name in path_params(&route.info.path) {
        let declared = route
            .schema
            .params
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == name);
        if !declared {
            out.push(json!({
                "name": name,
                "in": "path",
                "required": true,
                "schema": { "type": "string" },
            }));
        }
    }
    out
}

fn responses(route: &RouteDefinition) -> Value {
    let status = if route.info.method == Method::Post
        && route.middleware_names.iter().any(|name| name == JSON_MIDDLEWARE)
    {
        "201"
    } else {
        "200"
    };
    let success = route.schema.response.as_ref().map_or_else(
        || json!({ "description": "Success" }),
        |schema| {
            json!({
                "description": "Success",
                "content": { "application/json": { "schema": schema } },
            })
        },
    );

    json!({
        status: success,
        "400": { "description": "Bad Request - Validation Error" },
        "401": { "description": "Unauthorized - Invalid or Missing JWT" },
        "403": { "description": "Forbidden - User or Company Not Found" },
        "500": { "description": "Internal Server Error" },
    })
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn is_param(segment: &str) -> bool {
    segment.starts_with('{')
}

/// Parameter names in a route pattern, catch-alls included
fn path_params(path: &str) -> impl Iterator<Item = &str> {
    segments(path)
        .filter(|s| is_param(s))
        .map(|s| s.trim_start_matches('{').trim_start_matches('*').trim_end_matches('}'))
}

/// `/files/{*rest}` becomes `/files/{rest}`
fn openapi_path(path: &str) -> String {
    path.replace("{*", "{")
}

fn verb(method: Method) -> String {
    match method {
        Method::Get => "Get".to_string(),
        Method::Post => "Create".to_string(),
        Method::Put => "Update".to_string(),
        Method::Delete => "Delete".to_string(),
        Method::Patch => "Patch".to_string(),
        other => title_case(&other.as_str().to_lowercase()),
    }
}

/// Upper-case the first letter of every word, words split on non-alphanumerics
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start = !c.is_alphanumeric();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Dependencies;
    use crate::auth::AuthConfig;
    use crate::context::HandlerContext;
    use crate::handler::{make_handler, Middleware};
    use crate::middleware::{require_auth, response_json, skip_identity_check};
    use crate::registry::RouteInfo;
    use crate::schema::Schema;
    use crate::{ApiSchema, FromParams};
    use serde::Serialize;

    #[derive(Debug, FromParams)]
    struct UserPath {
        #[param(path)]
        id: u32,
        verbose: Option<bool>,
    }

    #[derive(Debug, Serialize, ApiSchema)]
    struct User {
        id: u32,
        name: String,
    }

    fn sample_registry() -> Registry {
        let registry = Registry::new();
        make_handler(
            &registry,
            RouteInfo::get("/api/v1/users/{id}"),
            |_ctx: HandlerContext<UserPath, ()>| async {
                Ok(User {
                    id: 1,
                    name: "a".to_string(),
                })
            },
            [
                Middleware::from_fn(response_json),
                Middleware::from_fn(require_auth(AuthConfig::new("s"), skip_identity_check)),
            ],
        )
        .unwrap();
        make_handler(
            &registry,
            RouteInfo::post("/api/v1/users").with_summary("Add a user").with_tag("Accounts"),
            |_ctx: HandlerContext<(), User>| async { Ok(()) },
            [Middleware::from_fn(response_json)],
        )
        .unwrap();
        make_handler(
            &registry,
            RouteInfo::get("/files/{*rest}"),
            |_ctx: HandlerContext<(), ()>| async { Ok(()) },
            Vec::new(),
        )
        .unwrap();
        registry
    }

    #[test]
    fn test_document_shape() {
        let doc = generate(&sample_registry(), &ApiInfo::new("Users", "2.0").with_server("http://localhost"));

        assert_eq!(doc["openapi"], OPENAPI_VERSION);
        assert_eq!(doc["info"]["title"], "Users");
        assert_eq!(doc["servers"][0]["url"], "http://localhost");

        let get = &doc["paths"]["/api/v1/users/{id}"]["get"];
        assert_eq!(get["summary"], "Get Users");
        assert_eq!(get["description"], "GET endpoint for /api/v1/users/{id}");
        assert_eq!(get["tags"], json!(["Users"]));
        assert_eq!(get["security"], json!([{ "bearerAuth": [] }]));
        assert_eq!(get["x-middleware"], json!(["response_json", "require_auth"]));
        assert_eq!(
            get["responses"]["200"]["content"]["application/json"]["schema"],
            json!(User::schema())
        );
        for code in ["400", "401", "403", "500"] {
            assert!(get["responses"][code].is_object(), "missing {code}");
        }
        assert!(doc["components"]["securitySchemes"]["bearerAuth"].is_object());
    }

    #[test]
    fn test_parameters() {
        let doc = generate(&sample_registry(), &ApiInfo::default());

        let params = &doc["paths"]["/api/v1/users/{id}"]["get"]["parameters"];
        assert_eq!(params[0]["name"], "id");
        assert_eq!(params[0]["in"], "path");
        assert_eq!(params[0]["required"], true);
        assert_eq!(params[1]["name"], "verbose");
        assert_eq!(params[1]["in"], "query");
        assert_eq!(params[1]["required"], false);

        let files = &doc["paths"]["/files/{rest}"]["get"];
        assert_eq!(files["parameters"], json!([{
            "name": "rest",
            "in": "path",
            "required": true,
            "schema": { "type": "string" },
        }]));
        assert!(files.get("x-middleware").is_none());
        assert!(files.get("security").is_none());
    }

    #[test]
    fn test_explicit_metadata_and_body() {
        let doc = generate(&sample_registry(), &ApiInfo::default());
        let post = &doc["paths"]["/api/v1/users"]["post"];

        assert_eq!(post["summary"], "Add a user");
        assert_eq!(post["tags"], json!(["Accounts"]));
        assert_eq!(
            post["requestBody"]["content"]["application/json"]["schema"],
            json!(User::schema())
        );
        assert_eq!(post["responses"]["201"]["description"], "Success");
        assert!(post["responses"].get("200").is_none());
    }

    #[test]
    fn test_naming_defaults() {
        assert_eq!(title_case("user-profiles"), "User-Profiles");
        assert_eq!(verb(Method::Delete), "Delete");
        assert_eq!(verb(Method::Head), "Head");
        assert_eq!(openapi_path("/a/{*b}"), "/a/{b}");
        assert_eq!(path_params("/a/{id}/b/{*rest}").collect::<Vec<_>>(), ["id", "rest"]);
    }

    #[test]
    fn test_tag_fallback() {
        let registry = Registry::new();
        make_handler(
            &registry,
            RouteInfo::delete("/api/v1/{id}"),
            |_ctx: HandlerContext<(), ()>| async { Ok(()) },
            Vec::new(),
        )
        .unwrap();
        let doc = generate(&registry, &ApiInfo::default());
        let op = &doc["paths"]["/api/v1/{id}"]["delete"];
        assert_eq!(op["tags"], json!(["API"]));
        assert_eq!(op["summary"], "Delete V1");
        assert!(doc.get("components").is_none());
        assert_eq!(Schema::string(), <String as ApiSchema>::schema());
    }

    #[tokio::test]
    async fn test_mount_serves_document() {
        let registry = Arc::new(sample_registry());
        let mut router = Router::new();
        registry.bind_to(&mut router, &Dependencies::default()).unwrap();
        mount(&mut router, Arc::clone(&registry), ApiInfo::new("Users", "1"), "/docs/").unwrap();

        let matched = router.match_route(Method::Get, "/docs/openapi.json").unwrap();
        let writer = ResponseWriter::new();
        (matched.handler)(Request::get("/docs/openapi.json"), writer.clone()).await;

        let response = writer.take().unwrap();
        assert_eq!(response.status, 200);
        let doc: Value = serde_json::from_str(response.body_str().unwrap()).unwrap();
        assert_eq!(doc["info"]["title"], "Users");
        assert_eq!(doc["paths"].as_object().unwrap().len(), 3);
    }
}
