//! Fixed-size group batching on top of [`SafeResolver`].
//!
//! Operations are split into consecutive groups. Members of a group run
//! concurrently; the next group starts only after every member of the
//! previous one has settled.

use std::sync::Arc;

use futures_util::future::join_all;
use safeop_core::{BatchResult, OperationContext};
use tracing::{debug, info};
use uuid::Uuid;

use super::operation::Operation;
use super::resolver::SafeResolver;
use super::stats::StatsTracker;

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    resolver: SafeResolver,
    stats: Arc<StatsTracker>,
}

impl BatchProcessor {
    #[must_use]
    pub fn new(resolver: SafeResolver) -> Self {
        let stats = Arc::clone(resolver.stats());
        Self { resolver, stats }
    }

    /// Resolves `operations` in groups of at most `batch_size`.
    ///
    /// A `batch_size` of zero is treated as one. Each member resolves under a
    /// copy of `ctx` tagged with `batchId`, `group` and `index`. A failing
    /// member never affects its siblings.
    pub async fn process_batch(
        &self,
        operations: Vec<Operation>,
        ctx: &OperationContext,
        batch_size: usize,
    ) -> BatchResult {
        let group_size = batch_size.max(1);
        let batch_id = Uuid::new_v4().to_string();
        self.stats.record_batch();

        let total = operations.len();
        info!(
            batch_id = %batch_id,
            component = ctx.component(),
            operation = ctx.operation_name(),
            operations = total,
            group_size,
            "batch started"
        );

        let mut result = BatchResult::new(batch_id.clone(), group_size);
        let mut members = operations.into_iter().enumerate().peekable();

        while members.peek().is_some() {
            let group_index = result.groups.len();
            let group = members.by_ref().take(group_size).map(|(index, operation)| {
                let member_ctx = ctx.derive([
                    ("batchId", serde_json::Value::from(batch_id.as_str())),
                    ("group", serde_json::Value::from(group_index)),
                    ("index", serde_json::Value::from(index)),
                ]);
                self.resolver.resolve(operation, member_ctx)
            });
            let outcomes = join_all(group).await;
            let summary = result.push_group(outcomes);
            debug!(
                batch_id = %batch_id,
                group = summary.index,
                size = summary.size,
                success = summary.success,
                errors = summary.errors,
                "batch group settled"
            );
        }

        info!(
            batch_id = %batch_id,
            success = result.summary.success,
            errors = result.summary.errors,
            success_rate = result.summary.success_rate,
            "batch finished"
        );
        result
    }
}
