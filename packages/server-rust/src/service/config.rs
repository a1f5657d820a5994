use std::collections::HashMap;
use std::time::Duration;

use safeop_core::DEFAULT_TIMEOUT_MS;

/// Well-known component names with their own default deadlines.
pub mod component_names {
    /// Latency-sensitive analytic operations.
    pub const ANALYTICS: &str = "analytics";
    /// Long-form content generation.
    pub const GENERATION: &str = "generation";
    /// Large multi-step coordination (settlement, state sync).
    pub const COORDINATION: &str = "coordination";
}

/// Layer-level configuration for the safety layer.
///
/// Controls deadlines, batch sizing, drain behaviour, and the memory estimate
/// reported to health checks.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Deadline for components without an explicit override, in milliseconds.
    pub default_timeout_ms: u64,
    /// Per-component deadline overrides in milliseconds.
    pub component_timeouts: HashMap<String, u64>,
    /// Group size used when a batch call does not specify one.
    pub default_batch_size: usize,
    /// Interval between active-count checks while draining.
    pub drain_poll_interval_ms: u64,
    /// Upper bound on how long shutdown waits for in-flight work.
    pub max_drain_wait_ms: u64,
    /// Assumed memory cost of one in-flight operation, in bytes.
    pub bytes_per_operation_estimate: u64,
    /// Failover chain used when a caller does not name regions. Primary first.
    pub default_regions: Vec<String>,
    /// Limit for one request against the health surface, in milliseconds.
    pub health_request_timeout_ms: u64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        let component_timeouts = HashMap::from([
            (component_names::ANALYTICS.to_string(), 45_000),
            (component_names::GENERATION.to_string(), 120_000),
            (component_names::COORDINATION.to_string(), 300_000),
        ]);
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            component_timeouts,
            default_batch_size: 10,
            drain_poll_interval_ms: 1_000,
            max_drain_wait_ms: 30_000,
            bytes_per_operation_estimate: 4_096,
            default_regions: vec![
                "us-west1".to_string(),
                "us-central1".to_string(),
                "eu-west1".to_string(),
            ],
            health_request_timeout_ms: 30_000,
        }
    }
}

impl LayerConfig {
    /// Deadline for `component`: its override if configured, the layer default otherwise.
    #[must_use]
    pub fn timeout_for(&self, component: &str) -> u64 {
        self.component_timeouts
            .get(component)
            .copied()
            .unwrap_or(self.default_timeout_ms)
    }

    #[must_use]
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    #[must_use]
    pub fn max_drain_wait(&self) -> Duration {
        Duration::from_millis(self.max_drain_wait_ms)
    }

    #[must_use]
    pub fn health_request_timeout(&self) -> Duration {
        Duration::from_millis(self.health_request_timeout_ms)
    }
}

/// Parses a `component=milliseconds` override as accepted on the command line.
///
/// # Errors
///
/// Returns a message if the separator is missing, the name is empty, or the
/// value is not a non-negative integer.
pub fn parse_component_timeout(raw: &str) -> Result<(String, u64), String> {
    let (name, ms) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected component=milliseconds, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing component name in '{raw}'"));
    }
    let ms = ms
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid timeout in '{raw}': {e}"))?;
    Ok((name.to_string(), ms))
}
