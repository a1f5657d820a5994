//! Deadline middleware for operations.
//!
//! Fails calls that exceed their context's `timeout_ms` with
//! `OperationError::Timeout`. The inner future is dropped at the deadline;
//! whether the underlying work stops is up to the inner service (the
//! [`DetachedExecutor`](super::DetachedExecutor) lets it run on).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use safeop_core::Value;
use tower::{Layer, Service};

use crate::service::operation::{Call, OperationError};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing the per-call deadline carried in `OperationContext`.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Call> for TimeoutService<S>
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
        let timeout_ms = call.ctx.timeout_ms();
        let deadline = call.ctx.timeout();
        let fut = self.inner.call(call);
        Box::pin(async move {
            match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(OperationError::Timeout { timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
