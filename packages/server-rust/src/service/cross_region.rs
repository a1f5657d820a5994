//! Sequential cross-region failover.
//!
//! This is a coordination pattern, not consensus: regions are tried one at a
//! time in the order given and the first success wins.

use std::sync::Arc;

use safeop_core::{CrossRegionOutcome, OperationContext, RegionAttempt};
use tracing::{info, warn};

use super::operation::{CoordinatorError, Operation};
use super::resolver::SafeResolver;
use super::stats::StatsTracker;

#[derive(Debug, Clone)]
pub struct RegionCoordinator {
    resolver: SafeResolver,
    stats: Arc<StatsTracker>,
}

impl RegionCoordinator {
    #[must_use]
    pub fn new(resolver: SafeResolver) -> Self {
        let stats = Arc::clone(resolver.stats());
        Self { resolver, stats }
    }

    /// Runs the operation built by `make_operation` against each region until
    /// one succeeds.
    ///
    /// `make_operation` is called once per attempted region. Every attempt is
    /// kept in the returned trail; when all regions fail the outcome carries
    /// the last region's error and `served_by` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NoRegions`] if `regions` is empty.
    pub async fn coordinate<F, R>(
        &self,
        mut make_operation: F,
        regions: &[R],
        ctx: &OperationContext,
    ) -> Result<CrossRegionOutcome, CoordinatorError>
    where
        F: FnMut(&str) -> Operation,
        R: AsRef<str>,
    {
        if regions.is_empty() {
            return Err(CoordinatorError::NoRegions);
        }
        self.stats.record_cross_region();

        let mut attempts = Vec::with_capacity(regions.len());
        for (attempt, region) in regions.iter().map(AsRef::as_ref).enumerate() {
            let attempt_ctx = ctx.derive([
                ("region", serde_json::Value::from(region)),
                ("attempt", serde_json::Value::from(attempt + 1)),
            ]);
            let outcome = self.resolver.resolve(make_operation(region), attempt_ctx).await;
            let success = outcome.success;

            if success {
                info!(
                    region,
                    attempt = attempt + 1,
                    operation = ctx.operation_name(),
                    "cross-region operation served"
                );
            } else {
                warn!(
                    region,
                    attempt = attempt + 1,
                    operation = ctx.operation_name(),
                    error = outcome.error_message().unwrap_or_default(),
                    "region attempt failed; failing over"
                );
            }

            attempts.push(RegionAttempt {
                region: region.to_string(),
                outcome,
            });
            if success {
                break;
            }
        }

        CrossRegionOutcome::from_attempts(attempts).ok_or(CoordinatorError::NoRegions)
    }
}

#[cfg(test)]
mod tests {
    use safeop_core::{Serializer, Value};

    use super::*;

    fn coordinator() -> RegionCoordinator {
        let stats = Arc::new(StatsTracker::default());
        RegionCoordinator::new(SafeResolver::new(stats, Arc::new(Serializer::new())))
    }

    fn ctx() -> OperationContext {
        OperationContext::new("coordination", "settle").with_timeout_ms(1_000)
    }

    fn only_in(serving: &'static str) -> impl FnMut(&str) -> Operation {
        move |region| {
            if region == serving {
                Operation::ready(Value::map([("region", region)]))
            } else {
                Operation::failing(anyhow::anyhow!("{region} unavailable"))
            }
        }
    }

    #[tokio::test]
    async fn fails_over_until_a_region_succeeds() {
        let coordinator = coordinator();
        let outcome = coordinator
            .coordinate(only_in("r3"), &["r1", "r2", "r3"], &ctx())
            .await
            .unwrap();

        assert!(outcome.outcome.success);
        assert_eq!(outcome.served_by.as_deref(), Some("r3"));
        assert_eq!(outcome.attempts.len(), 3);
        assert!(!outcome.attempts[0].outcome.success);
        assert!(outcome.attempts[2].outcome.success);
        assert_eq!(outcome.outcome.data, Some(serde_json::json!({"region": "r3"})));
        assert_eq!(coordinator.stats.snapshot().cross_region_promises, 1);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let coordinator = coordinator();
        let mut calls = Vec::new();
        let outcome = coordinator
            .coordinate(
                |region| {
                    calls.push(region.to_string());
                    Operation::ready(1_i64)
                },
                &["primary", "secondary"],
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.served_by.as_deref(), Some("primary"));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(calls, vec!["primary".to_string()]);
    }

    #[tokio::test]
    async fn all_regions_failing_reports_last_error() {
        let coordinator = coordinator();
        let outcome = coordinator
            .coordinate(only_in("nowhere"), &["r1", "r2"], &ctx())
            .await
            .unwrap();

        assert!(!outcome.outcome.success);
        assert_eq!(outcome.served_by, None);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.outcome.error_message(), Some("r2 unavailable"));
    }

    #[tokio::test]
    async fn attempts_carry_region_metadata() {
        let coordinator = coordinator();
        let outcome = coordinator
            .coordinate(only_in("b"), &["a", "b"], &ctx())
            .await
            .unwrap();

        let second = &outcome.attempts[1].outcome.context;
        assert_eq!(second.metadata()["region"], "b");
        assert_eq!(second.metadata()["attempt"], 2);
    }

    #[tokio::test]
    async fn empty_region_list_is_rejected() {
        let coordinator = coordinator();
        let regions: [&str; 0] = [];
        let err = coordinator
            .coordinate(only_in("r1"), &regions, &ctx())
            .await
            .unwrap_err();

        assert_eq!(err, CoordinatorError::NoRegions);
        assert_eq!(coordinator.stats.snapshot().cross_region_promises, 0);
    }

    #[test]
    fn serialized_outcome_flattens_resolution_fields() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome = runtime
            .block_on(coordinator().coordinate(only_in("r1"), &["r1"], &ctx()))
            .unwrap();

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["servedBy"], "r1");
        assert_eq!(json["attempts"][0]["region"], "r1");
        assert!(json.get("outcome").is_none());
    }
}
