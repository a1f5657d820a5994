use serde::{Deserialize, Serialize};

/// Point-in-time view of the process-wide operation counters.
///
/// All counters are monotonic except `active_promises`, which rises and falls
/// with in-flight work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub active_promises: u64,
    pub total_promises: u64,
    pub resolved_promises: u64,
    pub rejected_promises: u64,
    pub batch_processed: u64,
    pub cross_region_promises: u64,
}

impl StatsSnapshot {
    /// `resolved / total`, or 0 before any operation has been submitted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_promises == 0 {
            0.0
        } else {
            self.resolved_promises as f64 / self.total_promises as f64
        }
    }

    /// Operations that have finished, successfully or not.
    #[must_use]
    pub fn settled(&self) -> u64 {
        self.resolved_promises + self.rejected_promises
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_without_operations() {
        assert!(StatsSnapshot::default().success_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_uses_total_as_denominator() {
        let snapshot = StatsSnapshot {
            active_promises: 1,
            total_promises: 4,
            resolved_promises: 2,
            rejected_promises: 1,
            ..StatsSnapshot::default()
        };
        assert!((snapshot.success_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.settled(), 3);
    }

    #[test]
    fn serializes_with_dashboard_field_names() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        for field in [
            "activePromises",
            "totalPromises",
            "resolvedPromises",
            "rejectedPromises",
            "batchProcessed",
            "crossRegionPromises",
        ] {
            assert_eq!(json[field], 0, "missing {field}");
        }
    }
}
