//! Safe resolution of a single operation.
//!
//! [`SafeResolver::resolve`] is the primitive every other entry point builds
//! on. It never fails: whatever the operation does (succeed, error, panic,
//! hang past its deadline) the caller receives a [`ResolutionOutcome`].

use std::sync::Arc;

use safeop_core::{OperationContext, ResolutionOutcome, Serializer};
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::debug;

use super::middleware::{build_resolve_pipeline, ResolvePipeline};
use super::operation::{Call, Operation};
use super::stats::StatsTracker;

/// Drives operations to an outcome within their deadline.
///
/// Clones share the same statistics and serializer.
#[derive(Debug, Clone)]
pub struct SafeResolver {
    pipeline: ResolvePipeline,
    stats: Arc<StatsTracker>,
    serializer: Arc<Serializer>,
}

impl SafeResolver {
    #[must_use]
    pub fn new(stats: Arc<StatsTracker>, serializer: Arc<Serializer>) -> Self {
        Self {
            pipeline: build_resolve_pipeline(Arc::clone(&stats)),
            stats,
            serializer,
        }
    }

    /// Resolves `operation` under `ctx`'s deadline.
    ///
    /// Counts the operation as active for the duration of the call and as
    /// resolved or rejected afterwards. On timeout the operation is reported
    /// failed but is not cancelled.
    pub async fn resolve(&self, operation: Operation, ctx: OperationContext) -> ResolutionOutcome {
        let guard = self.stats.begin(ctx.component());
        let ctx = Arc::new(ctx);
        let started = Instant::now();

        let result = self
            .pipeline
            .clone()
            .oneshot(Call::new(Arc::clone(&ctx), operation))
            .await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        let context = Arc::unwrap_or_clone(ctx);

        match result {
            Ok(value) => {
                let data = self.serializer.serialize(&value);
                guard.resolve();
                ResolutionOutcome::succeeded(data, duration_ms, context)
            }
            Err(err) => {
                debug!(
                    component = context.component(),
                    operation = context.operation_name(),
                    kind = err.kind(),
                    "resolution failed"
                );
                let error = self.serializer.serialize_error(&err.to_error_value());
                guard.reject();
                ResolutionOutcome::failed(error, duration_ms, context)
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use safeop_core::{ErrorValue, ForeignValue, PendingHandle, Value};
    use serde_json::json;

    use super::*;

    /// Client type whose conversion hook panics.
    #[derive(Debug)]
    struct BrokenConversion;

    impl ForeignValue for BrokenConversion {
        fn type_name(&self) -> &str {
            "billing::Invoice"
        }

        fn to_value(&self) -> anyhow::Result<Value> {
            panic!("invoice total overflowed")
        }
    }

    fn resolver() -> SafeResolver {
        SafeResolver::new(Arc::new(StatsTracker::default()), Arc::new(Serializer::new()))
    }

    fn ctx(timeout_ms: u64) -> OperationContext {
        OperationContext::new("test", "resolve").with_timeout_ms(timeout_ms)
    }

    #[tokio::test]
    async fn successful_result_is_serialized() {
        let resolver = resolver();
        let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
        let op = Operation::ready(Value::map([("a", Value::Int(1)), ("b", Value::from(epoch))]));

        let outcome = resolver.resolve(op, ctx(1000)).await;

        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!({"a": 1, "b": "1970-01-01T00:00:00.000Z"})));
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.context.operation_name(), "resolve");
    }

    #[tokio::test]
    async fn raised_error_becomes_error_data() {
        let resolver = resolver();
        let outcome = resolver
            .resolve(Operation::failing(anyhow::anyhow!("boom")), ctx(1000))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.data, None);
        let error = outcome.error.as_ref().unwrap();
        assert_eq!(error["__error"], true);
        assert_eq!(error["name"], "Error");
        assert_eq!(error["message"], "boom");
        assert_eq!(error["stack"], "Error: boom");
    }

    #[tokio::test]
    async fn named_errors_keep_their_name() {
        let resolver = resolver();
        let op = Operation::failing(ErrorValue::new("QuotaExceeded", "limit reached"));
        let outcome = resolver.resolve(op, ctx(1000)).await;
        assert_eq!(outcome.error_name(), Some("QuotaExceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_operation_times_out_at_deadline() {
        let resolver = resolver();
        let op = Operation::new(std::future::pending());

        let outcome = resolver.resolve(op, ctx(50)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_name(), Some("Timeout"));
        assert!(outcome.duration_ms >= 50);
        assert!(outcome.duration_ms < 60);
    }

    #[tokio::test]
    async fn panicking_operation_is_contained() {
        async fn explode() -> anyhow::Result<Value> {
            panic!("bad index")
        }

        let resolver = resolver();
        let outcome = resolver.resolve(Operation::new(explode()), ctx(1000)).await;
        assert_eq!(outcome.error_name(), Some("Panic"));
        assert_eq!(outcome.error_message(), Some("operation panicked: bad index"));
    }

    #[tokio::test]
    async fn panicking_conversion_only_poisons_its_field() {
        let resolver = resolver();
        let op = Operation::ready(Value::map([
            ("ok", Value::Int(1)),
            ("bad", Value::Foreign(Arc::new(BrokenConversion))),
        ]));

        let outcome = resolver.resolve(op, ctx(1000)).await;

        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["ok"], 1);
        let bad = data["bad"].as_str().unwrap();
        assert!(bad.starts_with("[Serialization Error:"));
        assert!(bad.contains("invoice total overflowed"));

        let snapshot = resolver.stats().snapshot();
        assert_eq!(snapshot.resolved_promises, 1);
        assert_eq!(snapshot.active_promises, 0);
    }

    #[tokio::test]
    async fn unawaited_handle_in_result_is_neutralized() {
        let resolver = resolver();
        let inner = Operation::ready(1_i64);
        let op = Operation::ready(Value::map([("later", inner.pending_handle())]));

        let outcome = resolver.resolve(op, ctx(1000)).await;

        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["later"]["__promiseError"], true);
        assert_eq!(data["later"]["type"], "UnresolvedOperation");
        assert!(!data.to_string().contains("Ready"));
        drop(inner);
    }

    #[tokio::test]
    async fn stats_are_updated_on_every_path() {
        let resolver = resolver();
        resolver.resolve(Operation::ready(1_i64), ctx(1000)).await;
        resolver
            .resolve(Operation::failing(anyhow::anyhow!("x")), ctx(1000))
            .await;

        let snapshot = resolver.stats().snapshot();
        assert_eq!(snapshot.total_promises, 2);
        assert_eq!(snapshot.resolved_promises, 1);
        assert_eq!(snapshot.rejected_promises, 1);
        assert_eq!(snapshot.active_promises, 0);
    }

    #[tokio::test]
    async fn operation_is_active_while_running() {
        let resolver = resolver();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let op = Operation::new(async move {
            rx.await?;
            Ok(Value::Null)
        });

        let task = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(op, ctx(5000)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.stats().active_count(), 1);

        tx.send(()).unwrap();
        let outcome = task.await.unwrap();
        assert!(outcome.success);
        assert_eq!(resolver.stats().active_count(), 0);
    }

    #[test]
    fn pending_handle_type_is_not_exposed() {
        let handle = PendingHandle::named("secret::Type");
        let json = Serializer::new().serialize(&Value::Pending(handle));
        assert!(!json.to_string().contains("secret::Type"));
    }
}
