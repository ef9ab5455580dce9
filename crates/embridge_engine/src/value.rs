//! Values exchanged with the engine.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A single engine value: a query output cell or a bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL/Cypher NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// Signed 128-bit integer.
    Int128(i128),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Binary blob.
    Blob(Bytes),
    /// Homogeneous list.
    List(Vec<Value>),
    /// Named fields, in declaration order.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Returns the engine type name of this value.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "ANY".to_string(),
            Value::Bool(_) => "BOOL".to_string(),
            Value::Int64(_) => "INT64".to_string(),
            Value::UInt64(_) => "UINT64".to_string(),
            Value::Int128(_) => "INT128".to_string(),
            Value::Double(_) => "DOUBLE".to_string(),
            Value::String(_) => "STRING".to_string(),
            Value::Blob(_) => "BLOB".to_string(),
            Value::List(items) => {
                let child = items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(Value::type_name)
                    .unwrap_or_else(|| "ANY".to_string());
                format!("{child}[]")
            }
            Value::Struct(fields) => {
                let inner = fields
                    .iter()
                    .map(|(name, v)| format!("{name} {}", v.type_name()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("STRUCT({inner})")
            }
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as `i64` when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::UInt64(u) => i64::try_from(*u).ok(),
            Value::Int128(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Returns the value as `f64` for any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::UInt64(u) => Some(*u as f64),
            Value::Int128(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value into JSON.
    ///
    /// 128-bit integers become decimal strings, blobs become byte arrays and
    /// non-finite doubles become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int64(i) => JsonValue::from(*i),
            Value::UInt64(u) => JsonValue::from(*u),
            Value::Int128(i) => JsonValue::String(i.to_string()),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Blob(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Struct(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int64(i) => write!(f, "{i}"),
            Value::UInt64(u) => write!(f, "{u}"),
            Value::Int128(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Blob(b) => {
                for byte in b.iter() {
                    write!(f, "\\x{byte:02X}")?;
                }
                Ok(())
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, item)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int64(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt64(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// One output tuple, in column order.
pub type Row = Vec<Value>;

/// One output tuple keyed by column name, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates a record from `(column, value)` pairs.
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Zips column names with a row.
    pub fn from_row(columns: &[String], row: Row) -> Self {
        Self {
            fields: columns.iter().cloned().zip(row).collect(),
        }
    }

    /// Looks up a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the record into a JSON object.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(name, v)| (name.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_names() {
        assert_eq!(Value::from(1i64).type_name(), "INT64");
        assert_eq!(Value::from("x").type_name(), "STRING");
        assert_eq!(
            Value::List(vec![Value::Null, Value::Double(1.5)]).type_name(),
            "DOUBLE[]"
        );
        assert_eq!(
            Value::Struct(vec![("a".into(), Value::Bool(true))]).type_name(),
            "STRUCT(a BOOL)"
        );
    }

    #[test]
    fn json_view() {
        let value = Value::Struct(vec![
            ("id".into(), Value::Int64(7)),
            ("big".into(), Value::Int128(1 << 100)),
            ("nan".into(), Value::Double(f64::NAN)),
            ("tags".into(), Value::List(vec!["a".into(), "b".into()])),
        ]);
        assert_eq!(
            value.to_json(),
            json!({
                "id": 7,
                "big": (1i128 << 100).to_string(),
                "nan": null,
                "tags": ["a", "b"],
            })
        );
    }

    #[test]
    fn record_lookup_and_json() {
        let record = Record::from_row(&["n.id".to_string()], vec![Value::Int64(1)]);
        assert_eq!(record.get("n.id"), Some(&Value::Int64(1)));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.len(), 1);
        assert_eq!(record.to_json(), json!({"n.id": 1}));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(
            Value::List(vec![Value::Int64(1), Value::Int64(2)]).to_string(),
            "[1,2]"
        );
        assert_eq!(Value::Blob(Bytes::from_static(&[0xab])).to_string(), "\\xAB");
    }

    #[test]
    fn numeric_accessors() {
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::UInt64(5).as_i64(), Some(5));
        assert_eq!(Value::Int64(2).as_f64(), Some(2.0));
        assert_eq!(Value::from("s").as_f64(), None);
    }
}
