//! The async operation safety layer.
//!
//! 1. **Middleware** (`middleware`): Tower layers (metrics, timeout, detached execution)
//! 2. **Resolver** (`resolver`): Deadline-bounded resolution of one operation
//! 3. **Batching** (`batch`): Fixed-size concurrent groups
//! 4. **Failover** (`cross_region`): Sequential region attempts
//! 5. **Statistics** (`stats`) and **shutdown** (`shutdown`): Shared counters and drain
//! 6. **Facade** (`safety`): `SafetyLayer` tying the above together

pub mod batch;
pub mod config;
pub mod cross_region;
pub mod middleware;
pub mod operation;
pub mod resolver;
pub mod safety;
pub mod shutdown;
pub mod stats;

pub use batch::BatchProcessor;
pub use config::{component_names, parse_component_timeout, LayerConfig};
pub use cross_region::RegionCoordinator;
pub use operation::{Call, CoordinatorError, Operation, OperationError};
pub use resolver::SafeResolver;
pub use safety::{HealthReport, SafetyLayer};
pub use shutdown::{DrainReport, LayerState, ShutdownController};
pub use stats::{
    ActiveGuard, ComponentStats, MemoryEstimate, StatsTracker, MAX_TRACKED_COMPONENTS,
    OVERFLOW_COMPONENT,
};
