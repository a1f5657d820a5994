//! JSON-safe serialization of operation results.
//!
//! [`Serializer::serialize`] is total: every [`Value`] maps to a JSON tree.
//! Defects are reported in-band as marker objects instead of errors:
//!
//! - unawaited work becomes `{__promiseError, message, type, timestamp}`
//! - a value that cannot be represented becomes
//!   `{__serializationError, message, type, timestamp}`, or, inside a map,
//!   the string `"[Serialization Error: <message>]"` for that key only

use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number};
use tracing::{error, warn};

use crate::traits::ForeignValue;
use crate::types::{ErrorValue, Value};

/// Output contract of the serializer: primitives, arrays and string-keyed objects only.
pub type SerializedValue = serde_json::Value;

/// Message carried by the unresolved-handle marker.
pub const UNRESOLVED_MESSAGE: &str = "value was not awaited";

/// Reasons a value could not be represented.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("circular reference detected")]
    CircularReference,
    #[error("cannot convert {type_name}: {message}")]
    ForeignConversion { type_name: String, message: String },
}

impl SerializeError {
    /// Stable identifier reported in the `type` field of the failure marker.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircularReference => "CircularReference",
            Self::ForeignConversion { .. } => "ForeignConversion",
        }
    }
}

/// Counters describing defects the serializer has neutralized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializerDiagnostics {
    /// Unawaited handles replaced with a marker.
    pub unresolved_detected: u64,
    /// Values (or map fields) replaced because they could not be represented.
    pub serialization_failures: u64,
}

/// Converts values into JSON, counting the defects it neutralizes.
///
/// Shared across all resolvers of a process; counters are atomic.
#[derive(Debug, Default)]
pub struct Serializer {
    unresolved_detected: AtomicU64,
    serialization_failures: AtomicU64,
}

impl Serializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes a value. Never fails.
    pub fn serialize(&self, value: &Value) -> SerializedValue {
        let mut seen = HashSet::new();
        match self.encode(value, &mut seen) {
            Ok(json) => json,
            Err(err) => {
                self.record_failure(&err);
                failure_marker(&err)
            }
        }
    }

    /// Serializes an error through the error branch.
    #[must_use]
    pub fn serialize_error(&self, err: &ErrorValue) -> SerializedValue {
        encode_error(err)
    }

    #[must_use]
    pub fn diagnostics(&self) -> SerializerDiagnostics {
        SerializerDiagnostics {
            unresolved_detected: self.unresolved_detected.load(Ordering::Relaxed),
            serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
        }
    }

    fn encode(
        &self,
        value: &Value,
        seen: &mut HashSet<usize>,
    ) -> Result<SerializedValue, SerializeError> {
        match value {
            Value::Null => Ok(SerializedValue::Null),
            Value::Pending(handle) => Ok(self.unresolved_marker(handle.type_name())),
            Value::Bool(b) => Ok(SerializedValue::Bool(*b)),
            Value::Int(i) => Ok(SerializedValue::from(*i)),
            Value::Float(f) => Ok(Number::from_f64(*f)
                .map_or(SerializedValue::Null, SerializedValue::Number)),
            Value::String(s) => Ok(SerializedValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| self.encode(item, seen))
                .collect::<Result<Vec<_>, _>>()
                .map(SerializedValue::Array),
            Value::Timestamp(ts) => Ok(SerializedValue::String(iso8601(ts))),
            Value::Error(err) => Ok(encode_error(err)),
            Value::Map(entries) => {
                let mut out = Map::new();
                for (key, field) in entries {
                    let encoded = self.encode(field, seen).unwrap_or_else(|err| {
                        self.record_failure(&err);
                        SerializedValue::String(format!("[Serialization Error: {err}]"))
                    });
                    out.insert(key.clone(), encoded);
                }
                Ok(SerializedValue::Object(out))
            }
            Value::Shared(shared) => {
                let id = shared.identity();
                if !seen.insert(id) {
                    return Err(SerializeError::CircularReference);
                }
                let result = self.encode(&shared.read(), seen);
                seen.remove(&id);
                result
            }
            Value::Foreign(foreign) => {
                if foreign.is_deferred() {
                    return Ok(self.unresolved_marker(foreign.type_name()));
                }
                let id = Arc::as_ptr(foreign).cast::<()>() as usize;
                if !seen.insert(id) {
                    return Err(SerializeError::CircularReference);
                }
                let result = convert_foreign(foreign.as_ref())
                    .and_then(|converted| self.encode(&converted, seen));
                seen.remove(&id);
                result
            }
        }
    }

    fn unresolved_marker(&self, type_name: &str) -> SerializedValue {
        self.unresolved_detected.fetch_add(1, Ordering::Relaxed);
        error!(
            type_name,
            "unresolved operation handle reached the serializer; it was never awaited"
        );
        json!({
            "__promiseError": true,
            "message": UNRESOLVED_MESSAGE,
            "type": "UnresolvedOperation",
            "timestamp": now_iso8601(),
        })
    }

    fn record_failure(&self, err: &SerializeError) {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed);
        warn!(kind = err.kind(), error = %err, "value replaced during serialization");
    }
}

/// Runs third-party conversion code, turning both errors and panics into
/// [`SerializeError::ForeignConversion`].
fn convert_foreign(foreign: &dyn ForeignValue) -> Result<Value, SerializeError> {
    let conversion_error = |message: String| SerializeError::ForeignConversion {
        type_name: foreign.type_name().to_string(),
        message,
    };
    match catch_unwind(AssertUnwindSafe(|| foreign.to_value())) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(conversion_error(format!("{err:#}"))),
        Err(payload) => Err(conversion_error(format!(
            "conversion panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn encode_error(err: &ErrorValue) -> SerializedValue {
    json!({
        "__error": true,
        "name": err.name,
        "message": err.message,
        "stack": err.stack,
    })
}

fn failure_marker(err: &SerializeError) -> SerializedValue {
    json!({
        "__serializationError": true,
        "message": err.to_string(),
        "type": err.kind(),
        "timestamp": now_iso8601(),
    })
}

/// ISO-8601 in UTC with millisecond precision, e.g. `1970-01-01T00:00:00.000Z`.
#[must_use]
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn now_iso8601() -> String {
    iso8601(&Utc::now())
}
