//! Dynamic parameter values.
//!
//! A Glow parameter's `value`, `minimum`, `maximum`, and `default` fields
//! are declared "any" on the wire: their BER type depends on the parameter's
//! declared value type (context field 13). [`Value`] is the typed union an
//! implementation works with instead of a stringly-typed field -- consumers
//! distinguish `0` from `"0"`.

use serde::ser::Serializer;
use serde::Serialize;

/// Value-type code for 64-bit integers.
pub const VALUE_TYPE_INTEGER: i64 = 1;
/// Value-type code for IEEE double-precision reals.
pub const VALUE_TYPE_REAL: i64 = 2;
/// Value-type code for UTF-8 strings.
pub const VALUE_TYPE_STRING: i64 = 3;
/// Value-type code for booleans.
pub const VALUE_TYPE_BOOLEAN: i64 = 4;
/// Value-type code for enumerations (integer index into the enumeration
/// string list).
pub const VALUE_TYPE_ENUM: i64 = 6;

/// A dynamically typed Glow value.
///
/// Produced by the decoder for parameter value/minimum/maximum/default
/// fields. [`Value::Unknown`] preserves the raw contents of a BER value the
/// decoder has no native mapping for.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer value (value type 1).
    Integer(i64),
    /// Real value (value type 2).
    Real(f64),
    /// String value (value type 3).
    String(String),
    /// Boolean value (value type 4).
    Boolean(bool),
    /// Enumeration index (value type 6).
    Enum(i64),
    /// Raw contents of a BER value with no native mapping.
    Unknown(Vec<u8>),
}

impl Value {
    /// The default value a parameter takes when its value field is absent
    /// from the provider response, by declared value-type code.
    ///
    /// Enumerations never default: the value selects a line of the
    /// enumeration string, and no line should be selected when the provider
    /// sent none. Unknown codes do not default either.
    pub fn default_for(value_type: i64) -> Option<Value> {
        match value_type {
            VALUE_TYPE_INTEGER => Some(Value::Integer(0)),
            VALUE_TYPE_REAL => Some(Value::Real(0.0)),
            VALUE_TYPE_STRING => Some(Value::String(String::new())),
            VALUE_TYPE_BOOLEAN => Some(Value::Boolean(false)),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Integer(v) | Value::Enum(v) => serializer.serialize_i64(*v),
            Value::Real(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Unknown(raw) => {
                let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
                serializer.serialize_str(&hex)
            }
        }
    }
}
