//! Per-type value coercion. Ported from
//! `original_source/processors/field_processor.py:FieldProcessor.process_field`.

use serde_json::Value;
use tipflow_protocol::ValueType;

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a raw JSON value per its declared [`ValueType`]. Returns `None`
/// for JSON null and for values that fail to parse under their declared
/// type (matching the original's `except: return None`).
pub fn coerce(value_type: ValueType, value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }

    match value_type {
        ValueType::String => {
            if is_truthy(value) {
                Some(value_to_plain_string(value))
            } else {
                None
            }
        }
        ValueType::Datetime => {
            let raw = value.as_str()?;
            let normalized = raw.replace('Z', "+00:00");
            chrono::DateTime::parse_from_rfc3339(&normalized).ok().map(|dt| dt.to_rfc3339())
        }
        ValueType::Bool => {
            let b = match value {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
                other => is_truthy(other),
            };
            Some(b.to_string())
        }
        ValueType::Int => {
            let i = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            i.map(|v| v.to_string())
        }
        ValueType::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            f.map(|v| v.to_string())
        }
        ValueType::Json => Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        // Hash fields are resolved asynchronously by the caller; the raw
        // hash string passes through coercion unchanged.
        ValueType::Hash => value.as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_empty_is_none() {
        assert_eq!(coerce(ValueType::String, &json!("")), None);
        assert_eq!(coerce(ValueType::String, &json!("hi")), Some("hi".to_string()));
    }

    #[test]
    fn datetime_accepts_z_suffix() {
        let result = coerce(ValueType::Datetime, &json!("2025-06-15T00:00:00Z"));
        assert!(result.is_some());
        assert!(result.unwrap().starts_with("2025-06-15"));
    }

    #[test]
    fn datetime_rejects_garbage() {
        assert_eq!(coerce(ValueType::Datetime, &json!("not-a-date")), None);
    }

    #[test]
    fn bool_from_string_variants() {
        assert_eq!(coerce(ValueType::Bool, &json!("yes")), Some("true".to_string()));
        assert_eq!(coerce(ValueType::Bool, &json!("no")), Some("false".to_string()));
    }

    #[test]
    fn int_and_float_parse() {
        assert_eq!(coerce(ValueType::Int, &json!(42)), Some("42".to_string()));
        assert_eq!(coerce(ValueType::Float, &json!("3.5")), Some("3.5".to_string()));
    }

    #[test]
    fn null_is_always_none() {
        assert_eq!(coerce(ValueType::String, &Value::Null), None);
        assert_eq!(coerce(ValueType::Hash, &Value::Null), None);
    }
}
