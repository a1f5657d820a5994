use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadline applied when neither the caller nor the component configuration sets one.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Describes one resolution attempt: who asked, for what, and how long it may take.
///
/// Attached to every outcome for logging and statistics attribution. Fields
/// are only settable through the builder methods, which consume `self`, so a
/// context is never mutated once handed to the layer. [`derive`](Self::derive)
/// produces a new context rather than modifying an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    component: String,
    operation_name: String,
    timeout_ms: u64,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl OperationContext {
    /// Creates a context with the default deadline and no metadata.
    pub fn new(component: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation_name: operation_name.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a copy of this context with extra metadata entries.
    ///
    /// Existing keys are overwritten in the copy only.
    #[must_use]
    pub fn derive<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        let mut derived = self.clone();
        derived
            .metadata
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        derived
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }
}
