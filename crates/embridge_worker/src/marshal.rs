//! Parameter marshaling from JSON maps to engine values.

use embridge_engine::Value;
use serde_json::{Map, Value as JsonValue};

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts a caller parameter map into named engine values.
///
/// Fails with a message naming the first offending parameter.
pub fn params_from_json(params: Map<String, JsonValue>) -> Result<Vec<(String, Value)>, String> {
    params
        .into_iter()
        .map(|(name, value)| {
            let value = value_from_json(&name, value)?;
            Ok((name, value))
        })
        .collect()
}

/// Converts one JSON value into an engine value.
///
/// `name` is the parameter being converted, used in the error message.
pub fn value_from_json(name: &str, value: JsonValue) -> Result<Value, String> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int64(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::UInt64(u))
            } else {
                let d = n.as_f64().unwrap_or(f64::NAN);
                if d.fract() == 0.0 && d.abs() <= MAX_SAFE_INTEGER {
                    Ok(Value::Int64(d as i64))
                } else {
                    Ok(Value::Double(d))
                }
            }
        }
        JsonValue::String(s) => Ok(Value::String(s)),
        JsonValue::Array(items) => {
            if items.is_empty() {
                return Ok(Value::Null);
            }
            let items = items
                .into_iter()
                .map(|item| value_from_json(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            let mut types = items.iter().filter(|v| !v.is_null()).map(Value::type_name);
            if let Some(first) = types.next() {
                if let Some(other) = types.find(|t| *t != first) {
                    return Err(format!(
                        "Unsupported parameter '{name}': list elements must share one type (found {first} and {other})"
                    ));
                }
            }
            Ok(Value::List(items))
        }
        JsonValue::Object(fields) => {
            if fields.is_empty() {
                return Ok(Value::Null);
            }
            let fields = fields
                .into_iter()
                .map(|(field, v)| Ok((field, value_from_json(name, v)?)))
                .collect::<Result<Vec<_>, String>>()?;
            Ok(Value::Struct(fields))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn scalars() {
        let params = params_from_json(map(json!({
            "flag": false,
            "id": 0,
            "big": 10_000_000_000_000_000_000u64,
            "ratio": 0.5,
            "whole": 200.0,
            "name": "Alice",
            "nothing": null,
        })))
        .unwrap();
        let get = |n: &str| params.iter().find(|(k, _)| k == n).map(|(_, v)| v.clone());

        assert_eq!(get("flag"), Some(Value::Bool(false)));
        assert_eq!(get("id"), Some(Value::Int64(0)));
        assert_eq!(get("big"), Some(Value::UInt64(10_000_000_000_000_000_000)));
        assert_eq!(get("ratio"), Some(Value::Double(0.5)));
        assert_eq!(get("whole"), Some(Value::Int64(200)));
        assert_eq!(get("name"), Some(Value::String("Alice".into())));
        assert_eq!(get("nothing"), Some(Value::Null));
    }

    #[test]
    fn empty_containers_are_null() {
        assert_eq!(value_from_json("x", json!([])).unwrap(), Value::Null);
        assert_eq!(value_from_json("x", json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn nested_structs_and_lists() {
        let value = value_from_json("p", json!({"tags": ["a", null, "b"], "age": 3})).unwrap();
        match value {
            Value::Struct(fields) => {
                assert_eq!(fields.len(), 2);
                assert!(fields.iter().any(|(k, v)| k == "tags"
                    && *v == Value::List(vec!["a".into(), Value::Null, "b".into()])));
            }
            other => panic!("expected struct, got {other:?}"),
        }
    }

    #[test]
    fn mixed_list_names_the_parameter() {
        let err = params_from_json(map(json!({"ok": 1, "mixed": [1, "two"]}))).unwrap_err();
        assert!(err.contains("'mixed'"), "{err}");
        assert!(err.contains("INT64") && err.contains("STRING"), "{err}");
    }

    proptest! {
        #[test]
        fn integers_stay_integers(i in any::<i64>()) {
            prop_assert_eq!(value_from_json("i", json!(i)).unwrap(), Value::Int64(i));
        }

        #[test]
        fn homogeneous_string_lists_convert(items in proptest::collection::vec("[a-z]{0,8}", 1..16)) {
            let value = value_from_json("l", json!(items.clone())).unwrap();
            let expected = Value::List(items.into_iter().map(Value::String).collect());
            prop_assert_eq!(value, expected);
        }
    }
}
