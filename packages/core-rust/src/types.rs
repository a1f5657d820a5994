use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::traits::ForeignValue;

/// Result value produced by a wrapped operation, before it crosses the JSON boundary.
///
/// Covers every JSON-compatible shape plus the variants that need special
/// handling on the way out: timestamps, error objects, handles to work that
/// was never awaited, shared (possibly cyclic) nodes, and opaque third-party
/// values. [`Serializer`](crate::Serializer) turns any `Value` into plain JSON.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// JSON null.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point. Non-finite values serialize as null.
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// String-keyed map. `BTreeMap` keeps serialization order deterministic.
    Map(BTreeMap<String, Value>),
    /// Point in time, serialized as an ISO-8601 string with millisecond precision.
    Timestamp(DateTime<Utc>),
    /// Error object, serialized as `{__error, name, message, stack}`.
    Error(ErrorValue),
    /// Handle to an operation that was returned without being awaited.
    Pending(PendingHandle),
    /// Node shared by reference. The only variant through which a cycle can form.
    Shared(SharedValue),
    /// Value of unknown origin, inspected through the [`ForeignValue`] capability.
    Foreign(Arc<dyn ForeignValue>),
}

impl Value {
    /// Builds a map value from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns `true` if this value is a handle to unawaited work.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Pending(_) => true,
            Self::Foreign(foreign) => foreign.is_deferred(),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<ErrorValue> for Value {
    fn from(v: ErrorValue) -> Self {
        Self::Error(v)
    }
}

impl From<PendingHandle> for Value {
    fn from(v: PendingHandle) -> Self {
        Self::Pending(v)
    }
}

impl From<SharedValue> for Value {
    fn from(v: SharedValue) -> Self {
        Self::Shared(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorValue
// ---------------------------------------------------------------------------

/// Error name used when the raised error carries no name of its own.
pub const DEFAULT_ERROR_NAME: &str = "Error";

/// Error object in its serializable form.
///
/// Operations may return an `ErrorValue` (wrapped in `anyhow::Error`) to
/// control the `name` reported to callers; any other error is reported under
/// [`DEFAULT_ERROR_NAME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ErrorValue {
    /// Error class name (`"Error"`, `"Timeout"`, `"Panic"`, ...).
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Rendered cause chain, when one is available.
    pub stack: Option<String>,
}

impl ErrorValue {
    /// Creates an error value without a stack.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attaches a stack rendering.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Converts an `anyhow` error, preserving its cause chain as the stack.
    ///
    /// An `ErrorValue` anywhere in the chain (e.g. under `.context(..)`) is
    /// returned as-is so operation-chosen names survive.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(named) = err.downcast_ref::<ErrorValue>() {
            return named.clone();
        }
        let message = err.to_string();
        let stack = render_stack(DEFAULT_ERROR_NAME, &message, err.chain().skip(1));
        Self::new(DEFAULT_ERROR_NAME, message).with_stack(stack)
    }

    /// Converts any standard error, preserving its `source()` chain as the stack.
    #[must_use]
    pub fn from_std(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause);
            source = cause.source();
        }
        let stack = render_stack(DEFAULT_ERROR_NAME, &message, causes);
        Self::new(DEFAULT_ERROR_NAME, message).with_stack(stack)
    }
}

fn render_stack<'a, I, E>(name: &str, message: &str, causes: I) -> String
where
    I: IntoIterator<Item = &'a E>,
    E: fmt::Display + ?Sized + 'a,
{
    let mut stack = format!("{name}: {message}");
    for cause in causes {
        stack.push_str("\n    caused by: ");
        stack.push_str(&cause.to_string());
    }
    stack
}

// ---------------------------------------------------------------------------
// PendingHandle
// ---------------------------------------------------------------------------

/// Marker for a future that ended up inside a result instead of being awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandle {
    type_name: &'static str,
}

impl PendingHandle {
    /// Describes the given future by its type.
    pub fn of<F: Future + ?Sized>(_future: &F) -> Self {
        Self {
            type_name: std::any::type_name::<F>(),
        }
    }

    /// Creates a handle with an explicit type description.
    #[must_use]
    pub fn named(type_name: &'static str) -> Self {
        Self { type_name }
    }

    /// Type of the unawaited future.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ---------------------------------------------------------------------------
// SharedValue
// ---------------------------------------------------------------------------

/// Reference-counted, mutable node. Clones share the same underlying value,
/// so a node may (directly or indirectly) contain itself.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Replaces the shared value.
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    /// Read access to the shared value.
    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    /// Identity of the shared node, stable for its lifetime.
    #[must_use]
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl fmt::Debug for SharedValue {
    // Contents are not printed: a cyclic node would recurse forever.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedValue({:#x})", self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_builder_converts_entries() {
        let value = Value::map([("a", 1_i64), ("b", 2_i64)]);
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries["a"], Value::Int(1)));
    }

    #[test]
    fn json_conversion_keeps_integers_and_floats_apart() {
        let value = Value::from(serde_json::json!({"i": 3, "f": 1.5, "s": "x", "n": null}));
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert!(matches!(entries["i"], Value::Int(3)));
        assert!(matches!(entries["f"], Value::Float(f) if (f - 1.5).abs() < f64::EPSILON));
        assert!(matches!(entries["n"], Value::Null));
    }

    #[test]
    fn error_value_from_anyhow_renders_cause_chain() {
        let err = anyhow::anyhow!("disk full").context("write failed");
        let value = ErrorValue::from_anyhow(&err);
        assert_eq!(value.name, "Error");
        assert_eq!(value.message, "write failed");
        assert_eq!(
            value.stack.as_deref(),
            Some("Error: write failed\n    caused by: disk full")
        );
    }

    #[test]
    fn error_value_from_anyhow_keeps_explicit_name() {
        let err = anyhow::Error::new(ErrorValue::new("QuotaExceeded", "limit reached"));
        let value = ErrorValue::from_anyhow(&err);
        assert_eq!(value.name, "QuotaExceeded");
        assert_eq!(value.message, "limit reached");
    }

    #[test]
    fn error_value_from_std_walks_sources() {
        let io = std::io::Error::other("boom");
        let value = ErrorValue::from_std(&io);
        assert_eq!(value.name, "Error");
        assert_eq!(value.message, "boom");
        assert_eq!(value.stack.as_deref(), Some("Error: boom"));
    }

    #[test]
    fn pending_handle_records_future_type() {
        let fut = async { 1 };
        let handle = PendingHandle::of(&fut);
        assert!(!handle.type_name().is_empty());
        assert!(Value::from(handle).is_pending());
    }

    #[test]
    fn shared_value_clones_share_identity() {
        let shared = SharedValue::new(Value::Int(1));
        let alias = shared.clone();
        assert_eq!(shared.identity(), alias.identity());
        alias.set(Value::Int(2));
        assert!(matches!(*shared.read(), Value::Int(2)));
        assert_ne!(shared.identity(), SharedValue::default().identity());
    }
}
