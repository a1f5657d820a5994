//! Metrics middleware for operations.
//!
//! Wraps each call in an `operation` tracing span, records duration and
//! outcome on it, and mirrors them into the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use safeop_core::Value;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{Call, OperationError};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and outcome.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Call> for MetricsService<S>
where
    S: Service<Call, Response = Value, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let component = call.ctx.component().to_string();
        let operation = call.ctx.operation_name().to_string();

        let span = info_span!(
            "operation",
            component = %component,
            operation = %operation,
            timeout_ms = call.ctx.timeout_ms(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.kind(),
                };

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);

                #[allow(clippy::cast_precision_loss)]
                metrics::histogram!(
                    "safeop_operation_duration_ms",
                    "component" => component.clone()
                )
                .record(duration_ms as f64);

                match &result {
                    Ok(_) => tracing::info!(duration_ms, "operation complete"),
                    Err(err) => tracing::warn!(
                        duration_ms,
                        kind = err.kind(),
                        error = %err,
                        "operation failed"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
