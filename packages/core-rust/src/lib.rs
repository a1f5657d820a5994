//! Safety layer core: value model, operation context, outcome types and the JSON-safe serializer.

pub mod context;
pub mod outcome;
pub mod serializer;
pub mod stats;
pub mod traits;
pub mod types;

pub use context::{OperationContext, DEFAULT_TIMEOUT_MS};
pub use outcome::{
    BatchResult, BatchSummary, CrossRegionOutcome, GroupSummary, RegionAttempt, ResolutionOutcome,
};
pub use serializer::{SerializeError, SerializedValue, Serializer, SerializerDiagnostics};
pub use stats::StatsSnapshot;
pub use traits::ForeignValue;
pub use types::{ErrorValue, PendingHandle, SharedValue, Value, DEFAULT_ERROR_NAME};
