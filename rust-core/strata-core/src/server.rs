//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio that dispatches to a [`Router`].
//!
//! ## Key Features
//!
//! - Boundary [`Layer`]s before routing and after the handler
//! - One [`ExecutionContext`] per request, cancelled when the client goes
//!   away, with an optional deadline
//! - Handlers run on their own task so a panic becomes a 500
//! - Graceful shutdown on CTRL+C with a drain timeout

use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use crate::layer::{Layer, LayerChain, LayerResult};
use crate::request::Request;
use crate::response::{write_error, Response, ResponseWriter};
use crate::router::{Method, Router};
use http_body_util::Full;
pub use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Deadline attached to every request, if any
    pub request_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            request_timeout: None,
        }
    }
}

/// Everything a connection task needs, shared across connections
struct Shared {
    router: Router,
    layers: LayerChain,
    request_timeout: Option<Duration>,
}

/// HTTP server over one router
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
}

impl Server {
    /// Serve `router` with the default configuration
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    /// Serve `router` with `config`
    #[must_use]
    pub fn with_config(router: Router, config: ServerConfig) -> Self {
        let shared = Shared {
            router,
            layers: LayerChain::new(),
            request_timeout: config.request_timeout,
        };
        Self {
            config,
            shared: Arc::new(shared),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub const fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Append a boundary layer
    ///
    /// Layers must be added before the server starts; once serving, the
    /// chain is shared with connection tasks and further additions are
    /// ignored with a warning.
    pub fn add_layer<L: Layer + 'static>(&mut self, layer: L) {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.layers.add(layer),
            None => warn!(layer = layer.name(), "Server already running, layer ignored"),
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The router being served
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.shared.router
    }

    /// Serve until CTRL+C, then drain connections
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound and
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` completes, then drain connections
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound and
    /// `Error::Io` if accepting connections fails.
    pub async fn serve_with_shutdown<S: Future<Output = ()>>(&self, signal: S) -> Result<()> {
        let addr = self.config.address;
        let bind_error = |source: std::io::Error| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true).map_err(bind_error)?;
        }
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(1024).map_err(bind_error)?;

        info!(address = %addr, "Server listening");

        let active = Arc::new(AtomicUsize::new(0));
        let keep_alive = self.config.keep_alive;
        let max_body_size = self.config.max_body_size;
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let shared = Arc::clone(&self.shared);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);
                        let service = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move {
                                Ok::<_, hyper::Error>(
                                    handle_request(req, &shared, remote_addr, max_body_size).await,
                                )
                            }
                        });
                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!(remote_addr = %remote_addr, error = %err, "Error serving connection");
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = &mut signal => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                connections = active.load(Ordering::Relaxed),
                "Shutdown timeout elapsed with connections still open"
            );
        }
        Ok(())
    }

    /// Execute a test request directly without network stack
    pub async fn test_request(
        &self,
        method: Method,
        path: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        if body.as_ref().is_some_and(|b| b.len() > self.config.max_body_size) {
            return payload_too_large(&Request::new(method, path, HashMap::new(), None));
        }
        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();
        let req = Request::new(method, path, headers, body).with_execution(ExecutionContext::new(token));
        process_request(req, &self.shared).await
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("router", &self.shared.router)
            .field("layers", &self.shared.layers.names())
            .finish()
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to install CTRL+C handler, shutdown only by process exit");
        std::future::pending::<()>().await;
    }
}

/// Core request processing logic (network agnostic)
async fn process_request(mut req: Request, shared: &Shared) -> Response {
    if let LayerResult::Respond(response) = shared.layers.run_before(&mut req) {
        return response;
    }

    let matched = match shared.router.match_route(req.method, &req.path) {
        Ok(m) => m,
        Err(_) => {
            let writer = ResponseWriter::new();
            write_error(&writer, &req, 404, "Route not found");
            let mut response = writer.take().unwrap_or_default();
            shared.layers.run_after(&req, &mut response);
            return response;
        }
    };

    req.set_route(matched.pattern);
    req.set_path_params(matched.params);
    if let Some(timeout) = shared.request_timeout {
        let execution = req.execution().clone().with_timeout(timeout);
        req = req.with_execution(execution);
    }

    let writer = ResponseWriter::new();
    let task = tokio::spawn((matched.handler)(req.clone(), writer.clone()));
    if let Err(err) = task.await {
        error!(
            method = %req.method,
            path = %req.path,
            error = %err,
            "Handler task failed"
        );
        write_error(&writer, &req, 500, "Internal server error");
    }

    let mut response = writer.take().unwrap_or_else(Response::empty);
    shared.layers.run_after(&req, &mut response);
    response
}

fn payload_too_large(req: &Request) -> Response {
    let writer = ResponseWriter::new();
    write_error(&writer, req, 413, "Payload too large");
    writer.take().unwrap_or_default()
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    shared: &Shared,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(Error::PayloadTooLarge { limit, actual }) => {
            warn!(%remote_addr, %method, %path, limit, actual, "Payload too large");
            let fallback = Request::get(path).with_remote_addr(remote_addr);
            return payload_too_large(&fallback).into_hyper();
        }
        Err(e) => {
            error!(%remote_addr, %method, %path, error = %e, "Failed to parse request");
            return Response::text("Bad Request").with_status(400).into_hyper();
        }
    };

    // Dropped with this future when the client disconnects mid-request.
    let token = CancellationToken::new();
    let _guard = token.clone().drop_guard();
    let request = request
        .with_remote_addr(remote_addr)
        .with_execution(ExecutionContext::new(token));

    let response = process_request(request, shared).await;
    info!(%remote_addr, %method, %path, status = response.status, "Request served");
    response.into_hyper()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Dependencies;
    use crate::api_error::HandlerError;
    use crate::context::HandlerContext;
    use crate::handler::{make_handler, Middleware};
    use crate::layer::{CorsLayer, RequestIdLayer};
    use crate::middleware::response_json;
    use crate::registry::{Registry, RouteInfo};
    use serde_json::Value;

    fn server(config: ServerConfig) -> Server {
        let registry = Registry::new();
        make_handler(
            &registry,
            RouteInfo::get("/users/{id}"),
            |ctx: HandlerContext<(), ()>| async move {
                Ok(ctx.request.path_param("id").unwrap_or_default().to_string())
            },
            [Middleware::from_fn(response_json)],
        )
        .unwrap();
        make_handler(
            &registry,
            RouteInfo::get("/panic"),
            |_ctx: HandlerContext<(), ()>| async move {
                if Method::Get.as_str() == "GET" {
                    panic!("handler bug");
                }
                Ok(())
            },
            Vec::new(),
        )
        .unwrap();
        make_handler(
            &registry,
            RouteInfo::get("/slow"),
            |ctx: HandlerContext<(), ()>| async move {
                ctx.execution
                    .run(tokio::time::sleep(Duration::from_secs(5)))
                    .await
                    .map_err(HandlerError::from)?;
                Ok(())
            },
            Vec::new(),
        )
        .unwrap();

        let mut router = Router::new();
        registry.bind_to(&mut router, &Dependencies::default()).unwrap();
        let mut server = Server::with_config(router, config);
        server.add_layer(RequestIdLayer);
        server
    }

    async fn get(server: &Server, path: &str) -> Response {
        server.test_request(Method::Get, path, HashMap::new(), None).await
    }

    fn error_message(response: &Response) -> String {
        let body: Value = serde_json::from_str(response.body_str().unwrap_or_default()).unwrap();
        body["error"]["message"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.max_body_size, 1024 * 1024);
        assert_eq!(config.request_timeout, None);
    }

    #[tokio::test]
    async fn test_routes_to_handler() {
        let server = server(ServerConfig::default());
        let response = get(&server, "/users/42").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), Some("\"42\""));
        assert!(response.header("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = get(&server(ServerConfig::default()), "/nope").await;
        assert_eq!(response.status, 404);
        assert_eq!(error_message(&response), "Route not found");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let config = ServerConfig {
            max_body_size: 4,
            ..ServerConfig::default()
        };
        let response = server(config)
            .test_request(Method::Get, "/users/1", HashMap::new(), Some(Bytes::from_static(b"too long")))
            .await;
        assert_eq!(response.status, 413);
    }

    #[tokio::test]
    async fn test_handler_panic_is_500() {
        let response = get(&server(ServerConfig::default()), "/panic").await;
        assert_eq!(response.status, 500);
        assert_eq!(error_message(&response), "Internal server error");
    }

    #[tokio::test]
    async fn test_request_timeout_is_504() {
        let config = ServerConfig {
            request_timeout: Some(Duration::from_millis(20)),
            ..ServerConfig::default()
        };
        let response = get(&server(config), "/slow").await;
        assert_eq!(response.status, 504);
        assert_eq!(error_message(&response), "Request timeout");
    }

    #[tokio::test]
    async fn test_layer_short_circuit() {
        let mut server = server(ServerConfig::default());
        server.add_layer(CorsLayer::new());
        let headers = HashMap::from([
            ("origin".to_string(), "http://example.com".to_string()),
            ("access-control-request-method".to_string(), "GET".to_string()),
        ]);
        let response = server.test_request(Method::Options, "/users/1", headers, None).await;
        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_serving() {
        let config = ServerConfig {
            address: ([127, 0, 0, 1], 0).into(),
            shutdown_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        };
        let server = server(config);
        let result = tokio::time::timeout(Duration::from_secs(5), server.serve_with_shutdown(async {})).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
