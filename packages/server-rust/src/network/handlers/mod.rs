//! HTTP handler definitions.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod health;

pub use health::{health_handler, liveness_handler, metrics_handler, readiness_handler};

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::service::SafetyLayer;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The safety layer whose health is reported.
    pub layer: Arc<SafetyLayer>,
    /// Prometheus render handle; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}
