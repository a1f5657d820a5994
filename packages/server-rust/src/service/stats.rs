//! Process-wide operation statistics.
//!
//! A single [`StatsTracker`] is created per process and shared via `Arc` with
//! every entry point. Each counter update is one atomic operation; an RAII
//! [`ActiveGuard`] guarantees the active count is released on every exit
//! path, including panics and dropped futures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use safeop_core::StatsSnapshot;
use serde::{Deserialize, Serialize};

/// Distinct component names counted individually. Names first seen after the
/// cap is reached share [`OVERFLOW_COMPONENT`].
pub const MAX_TRACKED_COMPONENTS: usize = 64;

/// Component bucket for names beyond [`MAX_TRACKED_COMPONENTS`].
pub const OVERFLOW_COMPONENT: &str = "other";

/// Per-component counters.
#[derive(Debug, Default)]
struct ComponentCounters {
    total: AtomicU64,
    resolved: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of one component's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub total: u64,
    pub resolved: u64,
    pub rejected: u64,
}

/// Coarse memory usage figure derived from the active count.
///
/// This is an estimate (`active × bytes_per_operation`), not a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEstimate {
    pub estimated_bytes: u64,
    pub bytes_per_operation: u64,
    pub active_operations: u64,
    /// Always `true`; consumers must not treat the figure as measured.
    pub is_estimate: bool,
}

/// Shared counters consulted by health and metrics endpoints.
#[derive(Debug)]
pub struct StatsTracker {
    active: AtomicU64,
    total: AtomicU64,
    resolved: AtomicU64,
    rejected: AtomicU64,
    batches: AtomicU64,
    cross_region: AtomicU64,
    late_completions: AtomicU64,
    components: DashMap<String, ComponentCounters>,
    bytes_per_operation: u64,
}

impl StatsTracker {
    /// Creates a fresh tracker with all counters at zero.
    #[must_use]
    pub fn new(bytes_per_operation: u64) -> Self {
        Self {
            active: AtomicU64::new(0),
            total: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            cross_region: AtomicU64::new(0),
            late_completions: AtomicU64::new(0),
            components: DashMap::new(),
            bytes_per_operation,
        }
    }

    /// Registers a new operation for `component` and returns its guard.
    ///
    /// `total` is incremented before `active` so that `resolved + rejected`
    /// can never be observed above `total`.
    #[must_use]
    pub fn begin(self: &Arc<Self>, component: &str) -> ActiveGuard {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let component = self.component_key(component);
        self.components
            .entry(component.clone())
            .or_default()
            .total
            .fetch_add(1, Ordering::Relaxed);
        metrics::gauge!("safeop_operations_active").increment(1.0);
        ActiveGuard {
            tracker: Arc::clone(self),
            component,
            settled: false,
        }
    }

    /// The map key `component` is counted under.
    ///
    /// The cap is checked without holding a lock, so concurrent first
    /// sightings can overshoot it by the number of racing callers.
    fn component_key(&self, component: &str) -> String {
        if self.components.contains_key(component)
            || self.components.len() < MAX_TRACKED_COMPONENTS
        {
            component.to_string()
        } else {
            OVERFLOW_COMPONENT.to_string()
        }
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("safeop_batches_total").increment(1);
    }

    pub fn record_cross_region(&self) {
        self.cross_region.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("safeop_cross_region_total").increment(1);
    }

    /// Counts an operation that finished after its deadline had already been reported.
    pub fn record_late_completion(&self) {
        self.late_completions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn late_completions(&self) -> u64 {
        self.late_completions.load(Ordering::Relaxed)
    }

    /// Reads all counters. Settled counters are read before `total`.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let resolved_promises = self.resolved.load(Ordering::SeqCst);
        let rejected_promises = self.rejected.load(Ordering::SeqCst);
        let active_promises = self.active.load(Ordering::SeqCst);
        let total_promises = self.total.load(Ordering::SeqCst);
        StatsSnapshot {
            active_promises,
            total_promises,
            resolved_promises,
            rejected_promises,
            batch_processed: self.batches.load(Ordering::SeqCst),
            cross_region_promises: self.cross_region.load(Ordering::SeqCst),
        }
    }

    /// `resolved / total`, 0 before any operation.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.snapshot().success_rate()
    }

    #[must_use]
    pub fn memory_footprint(&self) -> MemoryEstimate {
        let active_operations = self.active_count();
        MemoryEstimate {
            estimated_bytes: active_operations.saturating_mul(self.bytes_per_operation),
            bytes_per_operation: self.bytes_per_operation,
            active_operations,
            is_estimate: true,
        }
    }

    /// Per-component counters, sorted by component name.
    #[must_use]
    pub fn component_stats(&self) -> BTreeMap<String, ComponentStats> {
        self.components
            .iter()
            .map(|entry| {
                let counters = entry.value();
                let stats = ComponentStats {
                    total: counters.total.load(Ordering::Relaxed),
                    resolved: counters.resolved.load(Ordering::Relaxed),
                    rejected: counters.rejected.load(Ordering::Relaxed),
                };
                (entry.key().clone(), stats)
            })
            .collect()
    }

    fn settle(&self, component: &str, resolved: bool) {
        let (global, label) = if resolved {
            (&self.resolved, "resolved")
        } else {
            (&self.rejected, "rejected")
        };
        global.fetch_add(1, Ordering::SeqCst);
        if let Some(counters) = self.components.get(component) {
            let counter = if resolved {
                &counters.resolved
            } else {
                &counters.rejected
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!(
            "safeop_operations_total",
            "component" => component.to_string(),
            "outcome" => label
        )
        .increment(1);
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new(4_096)
    }
}

/// RAII guard for one in-flight operation.
///
/// Settling records the outcome; dropping always releases the active slot.
/// A guard dropped without being settled (the resolving future was dropped or
/// panicked) counts as rejected.
#[derive(Debug)]
pub struct ActiveGuard {
    tracker: Arc<StatsTracker>,
    component: String,
    settled: bool,
}

impl ActiveGuard {
    /// Records a successful resolution.
    pub fn resolve(mut self) {
        self.settle(true);
    }

    /// Records a failed resolution.
    pub fn reject(mut self) {
        self.settle(false);
    }

    fn settle(&mut self, resolved: bool) {
        if !self.settled {
            self.settled = true;
            self.tracker.settle(&self.component, resolved);
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.settle(false);
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("safeop_operations_active").decrement(1.0);
    }
}
