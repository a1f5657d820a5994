//! Drain-on-shutdown controller.
//!
//! Uses `ArcSwap` for lock-free state transitions and a `watch` channel to
//! notify listeners (the HTTP server, background loops) that shutdown began.
//! In-flight work is tracked by the shared [`StatsTracker`] active count.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::stats::StatsTracker;

/// Lifecycle of the safety layer.
///
/// State machine: Accepting -> Draining -> Stopped. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerState {
    /// Normal operation.
    Accepting,
    /// Shutdown signalled; new top-level work should be refused.
    Draining,
    /// Drain finished or gave up.
    Stopped,
}

impl LayerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepting => "ACCEPTING",
            Self::Draining => "DRAINING",
            Self::Stopped => "STOPPED",
        }
    }
}

/// What a drain observed when it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// `true` if the active count reached zero before the wait elapsed.
    pub drained: bool,
    /// Operations still active when the drain returned.
    pub remaining: u64,
    #[serde(with = "duration_ms")]
    pub waited: Duration,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::cast_possible_truncation, clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Coordinates the drain protocol.
///
/// 1. Health checks read `state()` to report readiness
/// 2. `trigger_shutdown()` moves to Draining and signals all receivers
/// 3. `drain_and_wait()` polls the active count, then moves to Stopped
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    state: Arc<ArcSwap<LayerState>>,
    stats: Arc<StatsTracker>,
    poll_interval: Duration,
}

impl ShutdownController {
    /// Creates a controller in the `Accepting` state.
    #[must_use]
    pub fn new(stats: Arc<StatsTracker>, poll_interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            state: Arc::new(ArcSwap::from_pointee(LayerState::Accepting)),
            stats,
            // A zero interval would spin.
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves from `Accepting` to `Draining` and notifies receivers.
    ///
    /// Has no effect once draining or stopped.
    pub fn trigger_shutdown(&self) {
        let previous = self.state.rcu(|current| match **current {
            LayerState::Accepting => LayerState::Draining,
            other => other,
        });
        if *previous == LayerState::Accepting {
            info!(active = self.stats.active_count(), "shutdown triggered; draining");
        }
        // Receivers may have been dropped
        let _ = self.shutdown_signal.send(true);
    }

    #[must_use]
    pub fn state(&self) -> LayerState {
        **self.state.load()
    }

    /// Shared handle to the state for handlers that outlive a borrow.
    #[must_use]
    pub fn state_handle(&self) -> Arc<ArcSwap<LayerState>> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.state() == LayerState::Accepting
    }

    /// Waits for the active count to reach zero, at most `max_wait`.
    ///
    /// Enters `Draining` first if still accepting. Always ends in `Stopped`,
    /// whether or not work remains; leftover operations keep running.
    pub async fn drain_and_wait(&self, max_wait: Duration) -> DrainReport {
        self.trigger_shutdown();

        let started = Instant::now();
        let deadline = started + max_wait;

        let remaining = loop {
            let active = self.stats.active_count();
            if active == 0 {
                break 0;
            }
            let now = Instant::now();
            if now >= deadline {
                break active;
            }
            debug!(active, "waiting for in-flight operations");
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        };

        self.state.store(Arc::new(LayerState::Stopped));
        let waited = started.elapsed();

        let report = DrainReport {
            drained: remaining == 0,
            remaining,
            waited,
        };
        if report.drained {
            info!(?waited, "drain complete");
        } else {
            warn!(
                remaining,
                ?waited,
                "drain wait elapsed with operations still active; stopping anyway"
            );
        }
        report
    }
}
