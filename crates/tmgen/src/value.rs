//! value representation
//!
//! A [Value] is a fully resolved evaluation result. It contains the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! The only valid **implicit** conversion: every `integer` is also a `decimal`. Arithmetic that
//! overflows an `integer` continues as `decimal`.
//!
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Integer(_) | Value::Decimal(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(int) => Some(*int as f64),
            Value::Decimal(dec) => Some(*dec),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Decimal(_))
    }

    /// Creates a number, preferring the integer representation when lossless
    pub fn number(value: f64) -> Value {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return Value::Integer(value as i64);
        }
        Value::Decimal(value)
    }

    /// String form used when the value is interpolated into a template
    ///
    /// Returns `None` for values that have no string form (null and collections).
    pub fn to_template_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(int) => Some(int.to_string()),
            Value::Decimal(dec) => Some(dec.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Equality as seen by the `==` operator: numbers compare by numeric value
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.loosely_equals(b))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, a)| b.get(key).is_some_and(|b| a.loosely_equals(b)))
            }
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<hcl::Number> for Value {
    fn from(value: hcl::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        value.as_f64().map_or(Value::Null, Value::Decimal)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<IndexMap<K, V>> for Value {
    fn from(value: IndexMap<K, V>) -> Self {
        Value::Object(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}
