//! # Metrics
//!
//! Prometheus request metrics collected at the server boundary:
//!
//! - `http_requests_total` counter by method, route and status
//! - `http_request_duration_seconds` histogram by method and route
//! - `http_requests_in_flight` gauge
//!
//! Each [`MetricsLayer`] owns its own `prometheus::Registry`, so two servers
//! in one process keep separate numbers. The route label is the matched
//! pattern (`/users/{id}`), or `unmatched` when no route matched.
//!
//! ```ignore
//! let metrics = MetricsLayer::new()?;
//! metrics.mount(&mut router, DEFAULT_METRICS_PATH)?;
//! let mut server = Server::new(router);
//! server.add_layer(metrics);
//! ```

use crate::error::Result;
use crate::layer::{Layer, LayerResult};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::router::{BoundaryHandler, Method, Router};
use futures_util::future::{ready, BoxFuture};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Metric name prefix used by [`MetricsLayer::new`]
pub const DEFAULT_NAMESPACE: &str = "http";

/// Conventional scrape path
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Route label for requests no route matched
pub const UNMATCHED_ROUTE: &str = "unmatched";

const DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0];

struct Collectors {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    in_flight: IntGauge,
}

/// Boundary layer recording request counts, durations and concurrency
#[derive(Clone)]
pub struct MetricsLayer {
    inner: Arc<Collectors>,
}

impl MetricsLayer {
    /// Collectors under the `http` namespace
    ///
    /// # Errors
    ///
    /// Returns `Error::Metrics` if a collector cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Collectors whose names start with `namespace_`
    ///
    /// # Errors
    ///
    /// Returns `Error::Metrics` if `namespace` is not a valid metric name
    /// prefix.
    pub fn with_namespace(namespace: &str) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Total number of HTTP requests").namespace(namespace),
            &["method", "route", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "HTTP request duration in seconds")
                .namespace(namespace)
                .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "route"],
        )?;
        let in_flight = IntGauge::with_opts(
            Opts::new("requests_in_flight", "Number of HTTP requests being served")
                .namespace(namespace),
        )?;

        let registry = Registry::new();
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        debug!(namespace, "Metrics collectors registered");

        Ok(Self {
            inner: Arc::new(Collectors {
                registry,
                requests_total,
                request_duration,
                in_flight,
            }),
        })
    }

    /// The registry holding this layer's collectors
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Current metrics in the Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns `Error::Metrics` if encoding fails.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Serve [`render`](Self::render) at `GET path`
    ///
    /// # Errors
    ///
    /// Returns the router's error if `path` is invalid or already taken.
    pub fn mount(&self, router: &mut Router, path: &str) -> Result<()> {
        let metrics = self.clone();
        let handler: BoundaryHandler = Arc::new(move |_req: Request, writer: ResponseWriter| -> BoxFuture<'static, ()> {
            let response = match metrics.render() {
                Ok(body) => {
                    let mut response = Response::text(body);
                    response.content_type = Some(TextEncoder::new().format_type().to_string());
                    response
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode metrics");
                    Response::text("Failed to encode metrics").with_status(500)
                }
            };
            writer.write(response);
            Box::pin(ready(()))
        });
        router.route(Method::Get, path, handler)
    }
}

impl std::fmt::Debug for MetricsLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsLayer")
            .field("in_flight", &self.inner.in_flight.get())
            .finish_non_exhaustive()
    }
}

impl Layer for MetricsLayer {
    fn before_request(&self, _req: &mut Request) -> LayerResult {
        self.inner.in_flight.inc();
        LayerResult::Continue
    }

    fn after_response(&self, req: &Request, res: &mut Response) {
        self.inner.in_flight.dec();
        let method = req.method.as_str();
        let route = req.route().unwrap_or(UNMATCHED_ROUTE);
        let status = res.status.to_string();
        self.inner
            .requests_total
            .with_label_values(&[method, route, status.as_str()])
            .inc();
        self.inner
            .request_duration
            .with_label_values(&[method, route])
            .observe(req.received_at().elapsed().as_secs_f64());
    }

    fn name(&self) -> &'static str {
        "MetricsLayer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use prometheus::proto::{Metric, MetricFamily};
    use std::collections::HashMap;

    fn router() -> Router {
        let mut router = Router::new();
        router
            .get(
                "/users/{id}",
                Arc::new(|_req: Request, writer: ResponseWriter| -> BoxFuture<'static, ()> {
                    writer.write(Response::json("{}"));
                    Box::pin(ready(()))
                }),
            )
            .unwrap();
        router
    }

    fn family(metrics: &MetricsLayer, name: &str) -> MetricFamily {
        metrics
            .registry()
            .gather()
            .into_iter()
            .find(|f| f.get_name() == name)
            .unwrap()
    }

    fn labelled<'a>(family: &'a MetricFamily, route: &str) -> Option<&'a Metric> {
        family.get_metric().iter().find(|m| {
            m.get_label()
                .iter()
                .any(|l| l.get_name() == "route" && l.get_value() == route)
        })
    }

    #[tokio::test]
    async fn test_request_recorded_by_route() {
        let metrics = MetricsLayer::new().unwrap();
        let mut server = Server::new(router());
        server.add_layer(metrics.clone());

        for id in ["1", "2"] {
            let path = format!("/users/{id}");
            let response = server.test_request(Method::Get, &path, HashMap::new(), None).await;
            assert_eq!(response.status, 200);
        }
        let missing = server.test_request(Method::Get, "/teams", HashMap::new(), None).await;
        assert_eq!(missing.status, 404);

        let totals = family(&metrics, "http_requests_total");
        let users = labelled(&totals, "/users/{id}").unwrap();
        assert_eq!(users.get_counter().get_value() as u64, 2);
        assert!(users
            .get_label()
            .iter()
            .any(|l| l.get_name() == "status" && l.get_value() == "200"));
        let unmatched = labelled(&totals, UNMATCHED_ROUTE).unwrap();
        assert_eq!(unmatched.get_counter().get_value() as u64, 1);

        let durations = family(&metrics, "http_request_duration_seconds");
        let histogram = labelled(&durations, "/users/{id}").unwrap().get_histogram();
        assert_eq!(histogram.get_sample_count(), 2);
        assert_eq!(histogram.get_bucket().len(), DURATION_BUCKETS.len());

        let in_flight = family(&metrics, "http_requests_in_flight");
        assert_eq!(in_flight.get_metric()[0].get_gauge().get_value() as i64, 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text_format() {
        let metrics = MetricsLayer::new().unwrap();
        let mut router = router();
        metrics.mount(&mut router, DEFAULT_METRICS_PATH).unwrap();
        let mut server = Server::new(router);
        server.add_layer(metrics.clone());

        server.test_request(Method::Get, "/users/9", HashMap::new(), None).await;
        let response = server
            .test_request(Method::Get, DEFAULT_METRICS_PATH, HashMap::new(), None)
            .await;

        assert_eq!(response.status, 200);
        assert!(response.content_type.as_deref().unwrap().starts_with("text/plain"));
        let body = response.body_str().unwrap();
        assert!(body.contains("# TYPE http_requests_total counter"));
        assert!(body.contains("# TYPE http_request_duration_seconds histogram"));
        assert!(body.contains("route=\"/users/{id}\""));
        assert!(body.contains("http_requests_in_flight 1"));
    }

    #[test]
    fn test_layers_keep_separate_registries() {
        let first = MetricsLayer::new().unwrap();
        let second = MetricsLayer::with_namespace("admin").unwrap();
        first.inner.in_flight.inc();
        assert_eq!(second.inner.in_flight.get(), 0);
        assert!(second.render().unwrap().contains("admin_requests_in_flight 0"));
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        assert!(MetricsLayer::with_namespace("bad-name").is_err());
    }
}
