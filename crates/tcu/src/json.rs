//! Tolerant typed field access over a parsed JSON value.
//!
//! Model and architecture descriptors are read leniently: a missing or
//! ill-typed field leaves the target's default in place, and validation is
//! a separate later step. Strings longer than the bounded capacity are
//! ignored the same way.

use serde_json::Value;

/// Read a non-negative number field into `target`, if present and typed.
pub(crate) fn size_field(value: &Value, name: &str, target: &mut usize) {
    if let Some(n) = value.get(name).and_then(Value::as_u64) {
        if let Ok(n) = usize::try_from(n) {
            *target = n;
        }
    }
}

/// Read a string field into a bounded string, if present, typed, and short
/// enough to fit.
pub(crate) fn string_field<const N: usize>(
    value: &Value,
    name: &str,
    target: &mut heapless::String<N>,
) {
    if let Some(s) = value.get(name).and_then(Value::as_str) {
        if let Ok(s) = heapless::String::try_from(s) {
            *target = s;
        }
    }
}

/// Read a boolean field into `target`, if present and typed.
pub(crate) fn bool_field(value: &Value, name: &str, target: &mut bool) {
    if let Some(b) = value.get(name).and_then(Value::as_bool) {
        *target = b;
    }
}
