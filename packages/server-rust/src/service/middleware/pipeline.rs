//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::executor::DetachedExecutor;
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::service::stats::StatsTracker;

/// Concrete type of the resolution pipeline. Cheap to clone.
pub type ResolvePipeline = MetricsService<TimeoutService<DetachedExecutor>>;

/// Build the resolution pipeline around a `DetachedExecutor`.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- span, timing and outcome, including timeouts
/// 2. `TimeoutLayer` -- enforce the context deadline
/// 3. `DetachedExecutor` -- run the operation on its own task
#[must_use]
pub fn build_resolve_pipeline(stats: Arc<StatsTracker>) -> ResolvePipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(TimeoutLayer)
        .service(DetachedExecutor::new(stats))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
