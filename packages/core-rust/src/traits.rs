use std::fmt;

use crate::types::Value;

/// Capability interface for third-party values the layer knows nothing about.
///
/// Native futures are caught by the type system (`Value::Pending`); this trait
/// is the fallback for opaque values that may wrap deferred work of their own,
/// e.g. a handle type exported by a client library.
pub trait ForeignValue: fmt::Debug + Send + Sync {
    /// Name of the underlying type, used in diagnostics.
    fn type_name(&self) -> &str;

    /// Returns `true` if the value still represents unfinished work.
    fn is_deferred(&self) -> bool {
        false
    }

    /// Converts the value into the layer's value model.
    ///
    /// # Errors
    ///
    /// Returns an error if the value has no safe representation.
    fn to_value(&self) -> anyhow::Result<Value>;
}
