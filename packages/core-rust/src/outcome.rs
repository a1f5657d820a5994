//! Result structures returned by the safety layer.
//!
//! Field names serialize in camelCase and must stay stable: dashboards and
//! HTTP clients consume these shapes directly.

use serde::{Deserialize, Serialize};

use crate::context::OperationContext;
use crate::serializer::SerializedValue;

// ---------------------------------------------------------------------------
// ResolutionOutcome
// ---------------------------------------------------------------------------

/// Outcome of resolving a single operation. Failures are data, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub success: bool,
    /// Serialized result; `None` on failure.
    pub data: Option<SerializedValue>,
    /// Serialized error (`{__error, name, message, stack}`); `None` on success.
    pub error: Option<SerializedValue>,
    pub duration_ms: u64,
    pub context: OperationContext,
}

impl ResolutionOutcome {
    #[must_use]
    pub fn succeeded(data: SerializedValue, duration_ms: u64, context: OperationContext) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms,
            context,
        }
    }

    #[must_use]
    pub fn failed(error: SerializedValue, duration_ms: u64, context: OperationContext) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            duration_ms,
            context,
        }
    }

    /// The `name` field of the serialized error, if any.
    #[must_use]
    pub fn error_name(&self) -> Option<&str> {
        self.error.as_ref()?.get("name")?.as_str()
    }

    /// The `message` field of the serialized error, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref()?.get("message")?.as_str()
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Success ratio with the empty case defined as fully successful.
#[allow(clippy::cast_precision_loss)]
fn ratio(success: u64, errors: u64) -> f64 {
    let attempts = success + errors;
    if attempts == 0 {
        1.0
    } else {
        success as f64 / attempts as f64
    }
}

/// Running totals across every group of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub success: u64,
    pub errors: u64,
    pub success_rate: f64,
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self {
            success: 0,
            errors: 0,
            success_rate: 1.0,
        }
    }
}

impl BatchSummary {
    /// Counts one attempt and refreshes the rate.
    pub fn record(&mut self, success: bool) {
        if success {
            self.success += 1;
        } else {
            self.errors += 1;
        }
        self.success_rate = ratio(self.success, self.errors);
    }
}

/// Counts for a single group, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub index: usize,
    pub size: usize,
    pub success: u64,
    pub errors: u64,
}

/// Result of processing a list of operations in fixed-size groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    /// Effective group size after correcting non-positive requests.
    pub group_size: usize,
    pub summary: BatchSummary,
    pub groups: Vec<GroupSummary>,
    /// One outcome per input operation, in input order.
    pub outcomes: Vec<ResolutionOutcome>,
}

impl BatchResult {
    /// Starts an empty batch result.
    #[must_use]
    pub fn new(batch_id: impl Into<String>, group_size: usize) -> Self {
        Self {
            batch_id: batch_id.into(),
            group_size,
            summary: BatchSummary::default(),
            groups: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Appends the outcomes of a completed group and updates the totals.
    pub fn push_group(&mut self, outcomes: Vec<ResolutionOutcome>) -> GroupSummary {
        let mut group = GroupSummary {
            index: self.groups.len(),
            size: outcomes.len(),
            success: 0,
            errors: 0,
        };
        for outcome in &outcomes {
            self.summary.record(outcome.success);
            if outcome.success {
                group.success += 1;
            } else {
                group.errors += 1;
            }
        }
        self.groups.push(group);
        self.outcomes.extend(outcomes);
        group
    }
}

// ---------------------------------------------------------------------------
// Cross-region
// ---------------------------------------------------------------------------

/// One entry in the failover audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAttempt {
    pub region: String,
    pub outcome: ResolutionOutcome,
}

/// Final outcome of a failover chain plus every attempt made along the way.
///
/// The flattened outcome is the last attempt's: the serving region's result on
/// success, the final region's error when every region failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossRegionOutcome {
    #[serde(flatten)]
    pub outcome: ResolutionOutcome,
    /// Region that produced the successful result; `None` when all failed.
    pub served_by: Option<String>,
    pub attempts: Vec<RegionAttempt>,
}

impl CrossRegionOutcome {
    /// Builds the final outcome from an attempt trail. Returns `None` for an empty trail.
    #[must_use]
    pub fn from_attempts(attempts: Vec<RegionAttempt>) -> Option<Self> {
        let last = attempts.last()?;
        let outcome = last.outcome.clone();
        let served_by = outcome.success.then(|| last.region.clone());
        Some(Self {
            outcome,
            served_by,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx() -> OperationContext {
        OperationContext::new("test", "op").with_timeout_ms(1000)
    }

    fn ok() -> ResolutionOutcome {
        ResolutionOutcome::succeeded(json!(1), 5, ctx())
    }

    fn err(name: &str) -> ResolutionOutcome {
        ResolutionOutcome::failed(
            json!({"__error": true, "name": name, "message": "m", "stack": null}),
            5,
            ctx(),
        )
    }

    #[test]
    fn outcome_serializes_with_expected_shape() {
        let json = serde_json::to_value(err("Timeout")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], serde_json::Value::Null);
        assert_eq!(json["error"]["name"], "Timeout");
        assert_eq!(json["durationMs"], 5);
        assert_eq!(json["context"]["operationName"], "op");
    }

    #[test]
    fn error_accessors_read_serialized_error() {
        let outcome = err("Error");
        assert_eq!(outcome.error_name(), Some("Error"));
        assert_eq!(outcome.error_message(), Some("m"));
        assert_eq!(ok().error_name(), None);
    }

    #[test]
    fn empty_batch_reports_full_success_rate() {
        let batch = BatchResult::new("b-1", 3);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(
            json["summary"],
            json!({"success": 0, "errors": 0, "successRate": 1.0})
        );
        assert_eq!(json["batchId"], "b-1");
        assert_eq!(json["groupSize"], 3);
    }

    #[test]
    fn push_group_accumulates_running_totals() {
        let mut batch = BatchResult::new("b-2", 2);
        let first = batch.push_group(vec![ok(), err("Error")]);
        let second = batch.push_group(vec![ok()]);

        assert_eq!(
            first,
            GroupSummary {
                index: 0,
                size: 2,
                success: 1,
                errors: 1,
            }
        );
        assert_eq!(
            second,
            GroupSummary {
                index: 1,
                size: 1,
                success: 1,
                errors: 0,
            }
        );
        assert_eq!(batch.summary.success, 2);
        assert_eq!(batch.summary.errors, 1);
        assert!((batch.summary.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(batch.outcomes.len(), 3);
    }

    fn attempt(region: &str, outcome: ResolutionOutcome) -> RegionAttempt {
        RegionAttempt {
            region: region.to_string(),
            outcome,
        }
    }

    #[test]
    fn cross_region_outcome_reports_serving_region() {
        let attempts = vec![
            attempt("r1", err("Error")),
            attempt("r2", ok()),
        ];
        let result = CrossRegionOutcome::from_attempts(attempts).unwrap();
        assert!(result.outcome.success);
        assert_eq!(result.served_by.as_deref(), Some("r2"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["servedBy"], "r2");
        assert_eq!(json["success"], true);
        assert_eq!(json["attempts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn cross_region_outcome_all_failed_keeps_last_error() {
        let attempts = vec![
            attempt("r1", err("Error")),
            attempt("r2", err("Timeout")),
        ];
        let result = CrossRegionOutcome::from_attempts(attempts).unwrap();
        assert!(!result.outcome.success);
        assert_eq!(result.served_by, None);
        assert_eq!(result.outcome.error_name(), Some("Timeout"));
    }

    #[test]
    fn cross_region_outcome_requires_attempts() {
        assert!(CrossRegionOutcome::from_attempts(Vec::new()).is_none());
    }
}
