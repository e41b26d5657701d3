//! Coercions between untyped payloads and typed values.
//!
//! [`assign_converted`] is the structural copy used to turn an action's declared
//! request payload into a service's typed request: the payload is overlaid onto the
//! serialized form of the destination and the result is deserialized back, so fields
//! the payload does not mention keep their current values.

use runbook_types::DataMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map as JsonMap, Number, Value};
use thiserror::Error;

/// Errors raised while coercing values.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The value cannot be read as a floating-point number.
    #[error("unable to convert {value} to a number")]
    NotNumeric { value: String },
    /// The source shape cannot be assigned onto the destination shape.
    #[error("unable to assign {actual} onto {expected}")]
    Incompatible { expected: &'static str, actual: &'static str },
    /// Serialization or deserialization of the destination failed.
    #[error("conversion error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reads `value` as an `f64`. Numbers and numeric strings convert; everything else fails.
pub fn to_float(value: &Value) -> Result<f64, ConversionError> {
    let converted = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    converted.ok_or_else(|| ConversionError::NotNumeric {
        value: describe(value),
    })
}

/// Overlays `source` onto `destination` with type coercion.
///
/// - `null` sources leave the destination untouched.
/// - Object keys match destination fields case-insensitively; nested objects merge.
/// - Numeric and boolean strings coerce to numeric and boolean fields, numbers and
///   booleans coerce to string fields.
pub fn assign_converted<T>(destination: &mut T, source: &Value) -> Result<(), ConversionError>
where
    T: Serialize + DeserializeOwned,
{
    if source.is_null() {
        return Ok(());
    }

    let template = serde_json::to_value(&*destination)?;
    if template.is_object() && !source.is_object() {
        return Err(ConversionError::Incompatible {
            expected: kind_name(&template),
            actual: kind_name(source),
        });
    }

    let merged = coerce_onto(&template, source);
    *destination = serde_json::from_value(merged)?;
    Ok(())
}

/// Converts a service payload into a generic data map.
///
/// `null` yields an empty map; objects and strings holding a JSON object convert;
/// every other shape is rejected.
pub fn as_data_map(value: &Value) -> Result<DataMap, ConversionError> {
    match value {
        Value::Null => Ok(DataMap::new()),
        Value::Object(map) => Ok(map.iter().map(|(key, nested)| (key.clone(), nested.clone())).collect()),
        Value::String(text) if text.trim_start().starts_with('{') => {
            let parsed: JsonMap<String, Value> = serde_json::from_str(text)?;
            Ok(parsed.into_iter().collect())
        }
        other => Err(ConversionError::Incompatible {
            expected: "object",
            actual: kind_name(other),
        }),
    }
}

fn coerce_onto(template: &Value, source: &Value) -> Value {
    match (template, source) {
        (Value::Object(target), Value::Object(incoming)) => {
            let mut merged = target.clone();
            for (key, incoming_value) in incoming {
                let target_key = target
                    .keys()
                    .find(|candidate| candidate.eq_ignore_ascii_case(key))
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                let next_value = match merged.get(&target_key) {
                    Some(existing) => coerce_onto(existing, incoming_value),
                    None => incoming_value.clone(),
                };
                merged.insert(target_key, next_value);
            }
            Value::Object(merged)
        }
        (Value::Number(_), Value::String(text)) => parse_number(text).map(Value::Number).unwrap_or_else(|| source.clone()),
        (Value::Bool(_), Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => source.clone(),
        },
        (Value::String(_), Value::Number(number)) => Value::String(number.to_string()),
        (Value::String(_), Value::Bool(flag)) => Value::String(flag.to_string()),
        _ => source.clone(),
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let trimmed = text.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Number::from(integer));
    }
    trimmed.parse::<f64>().ok().and_then(Number::from_f64)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(text) => format!("'{text}'"),
        Value::Null => "nil".to_string(),
        other => other.to_string(),
    }
}
