//! Health, liveness, readiness and metrics endpoint handlers.
//!
//! These handlers expose safety-layer health for orchestrators
//! (Kubernetes, load balancers) and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::AppState;
use crate::service::HealthReport;

/// Returns the full health report as JSON.
///
/// Always returns 200 -- the `state` field in the body says whether the layer
/// is accepting, draining or stopped.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.layer.health_report())
}

/// Kubernetes liveness check -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness check -- 200 while accepting, 503 once draining.
///
/// Failing readiness removes the pod from the endpoint list so no new work
/// is routed to a layer that is shutting down.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.layer.check_admission().is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition of every recorded metric.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::{Operation, SafetyLayer};

    fn test_state() -> AppState {
        AppState {
            layer: Arc::new(SafetyLayer::default()),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn health_handler_reports_state_and_stats() {
        let state = test_state();
        let ctx = state.layer.context("crud", "read");
        state.layer.resolve(Operation::ready(1_i64), ctx).await;

        let json = serde_json::to_value(health_handler(State(state)).await.0).unwrap();

        assert_eq!(json["state"], "ACCEPTING");
        assert_eq!(json["stats"]["totalPromises"], 1);
        assert_eq!(json["stats"]["resolvedPromises"], 1);
        assert_eq!(json["successRate"], 1.0);
        assert_eq!(json["memoryFootprint"]["isEstimate"], true);
        assert_eq!(json["components"]["crud"]["total"], 1);
        assert!(json["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.layer.trigger_shutdown();

        let report = health_handler(State(state)).await.0;
        assert_eq!(report.state.as_str(), "DRAINING");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_200_when_accepting() {
        let status = readiness_handler(State(test_state())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_draining() {
        let state = test_state();
        state.layer.trigger_shutdown();

        let status = readiness_handler(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_handler_without_recorder_is_not_found() {
        let response = metrics_handler(State(test_state())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
