//! Innermost service: runs each operation on its own tokio task.
//!
//! Awaiting a `JoinHandle` instead of the operation future means an outer
//! deadline only stops *observing* the work. The task keeps running to
//! completion, which matters for non-idempotent operations that must not be
//! torn down halfway. If it finishes after the caller gave up, the late
//! result is logged, counted and discarded.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use safeop_core::{ErrorValue, Value};
use tower::Service;
use tracing::warn;

use crate::service::operation::{Call, OperationError};
use crate::service::stats::StatsTracker;

/// Spawns operations as detached tasks and maps their results to `OperationError`.
#[derive(Debug, Clone)]
pub struct DetachedExecutor {
    stats: Arc<StatsTracker>,
}

impl DetachedExecutor {
    #[must_use]
    pub fn new(stats: Arc<StatsTracker>) -> Self {
        Self { stats }
    }
}

/// Clears the "observed" flag when the awaiting future goes away.
struct ObserverGuard(Arc<AtomicBool>);

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Service<Call> for DetachedExecutor {
    type Response = Value;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let Call { ctx, operation } = call;
        let observed = Arc::new(AtomicBool::new(true));
        let task_observed = Arc::clone(&observed);
        let stats = Arc::clone(&self.stats);

        let handle = tokio::spawn(async move {
            let result = operation.into_future().await;
            if !task_observed.load(Ordering::Acquire) {
                stats.record_late_completion();
                warn!(
                    component = ctx.component(),
                    operation = ctx.operation_name(),
                    succeeded = result.is_ok(),
                    "operation completed after its deadline; result discarded"
                );
            }
            result
        });

        Box::pin(async move {
            let _observer = ObserverGuard(observed);
            match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(OperationError::Failed(ErrorValue::from_anyhow(&err))),
                Err(join_err) if join_err.is_panic() => Err(OperationError::Panicked {
                    message: panic_message(join_err.into_panic()),
                }),
                Err(_) => Err(OperationError::Cancelled),
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
