//! Safety layer server -- safe resolution, batching, cross-region failover and
//! drain-on-shutdown, with a health and metrics HTTP surface.

pub mod network;
pub mod service;

pub use network::NetworkModule;
pub use service::{LayerConfig, Operation, SafetyLayer};
