//! Tower middleware layers for the resolution pipeline.
//!
//! - [`metrics`]: Span, timing and outcome recording
//! - [`timeout`]: Per-call deadline enforcement
//! - [`executor`]: Detached task execution of the operation itself
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod executor;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use executor::DetachedExecutor;
pub use metrics::MetricsLayer;
pub use pipeline::{build_resolve_pipeline, ResolvePipeline};
pub use timeout::TimeoutLayer;
