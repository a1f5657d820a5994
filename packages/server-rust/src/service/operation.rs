//! Operation types carried through the resolution pipeline.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use safeop_core::{ErrorValue, OperationContext, PendingHandle, Value};

/// Boxed future driving one unit of work.
pub type OperationFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'static>>;

/// Deferred unit of work handed to the layer for resolution.
///
/// Owned by the caller until passed to a resolver, which consumes it.
pub struct Operation {
    future: OperationFuture,
    pending: PendingHandle,
}

impl Operation {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let pending = PendingHandle::of(&future);
        Self {
            future: Box::pin(future),
            pending,
        }
    }

    /// Operation that completes immediately with `value`.
    pub fn ready(value: impl Into<Value>) -> Self {
        Self::new(std::future::ready(Ok(value.into())))
    }

    /// Operation that fails immediately with `error`.
    pub fn failing(error: impl Into<anyhow::Error>) -> Self {
        Self::new(std::future::ready(Err(error.into())))
    }

    /// Marker for this operation as an unawaited value.
    ///
    /// Returning it inside a result is the defect the serializer reports as
    /// `UnresolvedOperation`.
    #[must_use]
    pub fn pending_handle(&self) -> PendingHandle {
        self.pending.clone()
    }

    pub(crate) fn into_future(self) -> OperationFuture {
        self.future
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("type", &self.pending.type_name())
            .finish_non_exhaustive()
    }
}

/// Request flowing through the middleware stack: an operation and its context.
#[derive(Debug)]
pub struct Call {
    pub ctx: Arc<OperationContext>,
    pub operation: Operation,
}

impl Call {
    #[must_use]
    pub fn new(ctx: Arc<OperationContext>, operation: Operation) -> Self {
        Self { ctx, operation }
    }
}

/// Why an operation did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    /// The operation itself returned an error.
    #[error("{0}")]
    Failed(ErrorValue),
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("operation panicked: {message}")]
    Panicked { message: String },
    /// The task running the operation was cancelled (runtime shutdown).
    #[error("operation task was cancelled")]
    Cancelled,
    #[error("safety layer is draining; new operations are not admitted")]
    Draining,
}

impl OperationError {
    /// Failure kind used for logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "OperationError",
            Self::Timeout { .. } => "Timeout",
            Self::Panicked { .. } => "Panic",
            Self::Cancelled => "Cancelled",
            Self::Draining => "Draining",
        }
    }

    /// Serializable form. Raised errors keep their own name; every other
    /// kind is named after the kind itself.
    #[must_use]
    pub fn to_error_value(&self) -> ErrorValue {
        match self {
            Self::Failed(err) => err.clone(),
            other => ErrorValue::new(other.kind(), other.to_string()),
        }
    }
}

/// Caller contract violations for cross-region coordination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("cross-region coordination requires at least one region")]
    NoRegions,
}
