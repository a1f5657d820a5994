//! Network module with deferred startup lifecycle.
//!
//! `new()` wires shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown, then drains the safety layer.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{
    health_handler, liveness_handler, metrics_handler, readiness_handler, AppState,
};
use crate::service::{DrainReport, SafetyLayer};

/// Manages the HTTP server lifecycle around a shared [`SafetyLayer`].
///
/// 1. `new()` -- stores the layer and bind address
/// 2. `start()` -- binds TCP listener to that address
/// 3. `serve()` -- serves until the shutdown future resolves, then drains
pub struct NetworkModule {
    host: String,
    port: u16,
    listener: Option<TcpListener>,
    layer: Arc<SafetyLayer>,
    metrics: Option<PrometheusHandle>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port. Port 0 asks the
    /// OS for an ephemeral port at `start()`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, layer: Arc<SafetyLayer>) -> Self {
        Self {
            host: host.into(),
            port,
            listener: None,
            layer,
            metrics: None,
        }
    }

    /// Serves `GET /metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    #[must_use]
    pub fn layer(&self) -> Arc<SafetyLayer> {
        Arc::clone(&self.layer)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- full health report
    /// - `GET /health/live` -- Kubernetes liveness check
    /// - `GET /health/ready` -- Kubernetes readiness check
    /// - `GET /metrics` -- Prometheus scrape endpoint
    ///
    /// Every response carries an `x-request-id` (the caller's, or a fresh
    /// UUID v4). Requests running past the layer's health request timeout
    /// get `408 Request Timeout`.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            layer: Arc::clone(&self.layer),
            metrics: self.metrics.clone(),
        };
        let request_timeout = self.layer.config().health_request_timeout();

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::with_status_code(
                        StatusCode::REQUEST_TIMEOUT,
                        request_timeout,
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!(host = %self.host, port, "health surface listening");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains the safety layer.
    ///
    /// After the shutdown signal:
    /// 1. The layer transitions to Draining (readiness starts failing)
    /// 2. axum finishes in-flight HTTP requests
    /// 3. Waits up to the configured maximum for active operations
    /// 4. The layer transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<DrainReport> {
        let router = self.build_router();
        let Self {
            listener, layer, ..
        } = self;
        let listener = listener.context("start() must be called before serve()")?;

        let signal_layer = Arc::clone(&layer);
        let graceful = async move {
            shutdown.await;
            signal_layer.trigger_shutdown();
        };

        info!("Serving health endpoints");
        axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await?;

        let max_wait = layer.config().max_drain_wait();
        Ok(layer.drain_and_wait(max_wait).await)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn module() -> NetworkModule {
        NetworkModule::new("127.0.0.1", 0, Arc::new(SafetyLayer::default()))
    }

    #[test]
    fn new_creates_module_without_binding() {
        assert!(module().listener.is_none());
    }

    #[tokio::test]
    async fn router_serves_readiness() {
        let module = module();
        let response = module
            .build_router()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn router_echoes_caller_request_id() {
        let response = module()
            .build_router()
            .oneshot(
                Request::get("/health/live")
                    .header("x-request-id", "drain-check-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "drain-check-1");
    }

    #[tokio::test]
    async fn router_serves_health_json() {
        let module = module();
        let response = module
            .build_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "ACCEPTING");
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module().serve(std::future::ready(())).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_drains_layer_on_shutdown() {
        let mut module = module();
        module.start().await.unwrap();
        let layer = module.layer();

        let report = module.serve(std::future::ready(())).await.unwrap();

        assert!(report.drained);
        assert_eq!(layer.state().as_str(), "STOPPED");
    }
}
