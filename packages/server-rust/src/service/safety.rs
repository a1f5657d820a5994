//! The safety layer facade: one object owning every component.
//!
//! Construct a single [`SafetyLayer`] per process and share it (it is cheap to
//! wrap in `Arc`). All entry points share one [`StatsTracker`] and one
//! [`Serializer`], so health reporting sees every path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use safeop_core::{
    BatchResult, CrossRegionOutcome, OperationContext, ResolutionOutcome, Serializer,
    SerializerDiagnostics, StatsSnapshot,
};
use serde::Serialize;

use super::batch::BatchProcessor;
use super::config::LayerConfig;
use super::cross_region::RegionCoordinator;
use super::operation::{CoordinatorError, Operation, OperationError};
use super::resolver::SafeResolver;
use super::shutdown::{DrainReport, LayerState, ShutdownController};
use super::stats::{ComponentStats, MemoryEstimate, StatsTracker};

/// Everything the health endpoint reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub state: LayerState,
    pub stats: StatsSnapshot,
    pub success_rate: f64,
    pub memory_footprint: MemoryEstimate,
    pub serializer: SerializerDiagnostics,
    pub late_completions: u64,
    pub components: BTreeMap<String, ComponentStats>,
    pub uptime_secs: u64,
}

#[derive(Debug)]
pub struct SafetyLayer {
    config: LayerConfig,
    stats: Arc<StatsTracker>,
    serializer: Arc<Serializer>,
    shutdown: Arc<ShutdownController>,
    resolver: SafeResolver,
    batches: BatchProcessor,
    regions: RegionCoordinator,
    started: Instant,
}

impl SafetyLayer {
    #[must_use]
    pub fn new(config: LayerConfig) -> Self {
        let stats = Arc::new(StatsTracker::new(config.bytes_per_operation_estimate));
        let serializer = Arc::new(Serializer::new());
        let shutdown = Arc::new(ShutdownController::new(
            Arc::clone(&stats),
            config.drain_poll_interval(),
        ));
        let resolver = SafeResolver::new(Arc::clone(&stats), Arc::clone(&serializer));

        Self {
            batches: BatchProcessor::new(resolver.clone()),
            regions: RegionCoordinator::new(resolver.clone()),
            resolver,
            config,
            stats,
            serializer,
            shutdown,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// A context for `component` carrying that component's configured deadline.
    #[must_use]
    pub fn context(&self, component: &str, operation_name: &str) -> OperationContext {
        OperationContext::new(component, operation_name)
            .with_timeout_ms(self.config.timeout_for(component))
    }

    /// Lets callers refuse new top-level work once shutdown has begun.
    ///
    /// The layer itself never blocks submissions.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Draining`] unless the layer is accepting.
    pub fn check_admission(&self) -> Result<(), OperationError> {
        if self.shutdown.is_accepting() {
            Ok(())
        } else {
            Err(OperationError::Draining)
        }
    }

    pub async fn resolve(&self, operation: Operation, ctx: OperationContext) -> ResolutionOutcome {
        self.resolver.resolve(operation, ctx).await
    }

    /// Batches `operations`, using the configured default group size when
    /// `batch_size` is `None`.
    pub async fn process_batch(
        &self,
        operations: Vec<Operation>,
        ctx: &OperationContext,
        batch_size: Option<usize>,
    ) -> BatchResult {
        let batch_size = batch_size.unwrap_or(self.config.default_batch_size);
        self.batches.process_batch(operations, ctx, batch_size).await
    }

    /// # Errors
    ///
    /// Returns [`CoordinatorError::NoRegions`] if `regions` is empty.
    pub async fn coordinate_across_regions<F, R>(
        &self,
        make_operation: F,
        regions: &[R],
        ctx: &OperationContext,
    ) -> Result<CrossRegionOutcome, CoordinatorError>
    where
        F: FnMut(&str) -> Operation,
        R: AsRef<str>,
    {
        self.regions.coordinate(make_operation, regions, ctx).await
    }

    /// Failover across the configured default regions.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NoRegions`] if no default regions are configured.
    pub async fn coordinate_default_regions<F>(
        &self,
        make_operation: F,
        ctx: &OperationContext,
    ) -> Result<CrossRegionOutcome, CoordinatorError>
    where
        F: FnMut(&str) -> Operation,
    {
        self.regions
            .coordinate(make_operation, &self.config.default_regions, ctx)
            .await
    }

    #[must_use]
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        let stats = self.stats.snapshot();
        HealthReport {
            state: self.shutdown.state(),
            success_rate: stats.success_rate(),
            stats,
            memory_footprint: self.stats.memory_footprint(),
            serializer: self.serializer.diagnostics(),
            late_completions: self.stats.late_completions(),
            components: self.stats.component_stats(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger_shutdown();
    }

    #[must_use]
    pub fn state(&self) -> LayerState {
        self.shutdown.state()
    }

    /// Drains in-flight work for at most `max_wait`, then stops.
    pub async fn drain_and_wait(&self, max_wait: Duration) -> DrainReport {
        self.shutdown.drain_and_wait(max_wait).await
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }
}

impl Default for SafetyLayer {
    fn default() -> Self {
        Self::new(LayerConfig::default())
    }
}
