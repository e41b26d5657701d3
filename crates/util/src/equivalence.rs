//! Deep-equivalence assertion.
//!
//! The assertion walks the *expected* value and reports every place where the
//! *actual* value disagrees. Extra keys present only in the actual object are not
//! mismatches; arrays must agree in length and element by element. Scalars are
//! equivalent when they are equal, numerically equal, or share the same textual form,
//! so `"1"` matches `1` and `"true"` matches `true`.

use anyhow::Result;
use serde_json::Value;

use crate::convert::to_float;

/// A single mismatch between expected and actual data.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    /// Slash-separated location of the mismatch, rooted at the assertion path.
    pub path: String,
    pub expected: Value,
    pub actual: Value,
    pub reason: String,
}

/// Outcome of an equivalence assertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub passed_count: usize,
    pub failed_count: usize,
    pub failures: Vec<ValidationFailure>,
}

impl Validation {
    /// True when no mismatch was reported.
    pub fn passed(&self) -> bool {
        self.failed_count == 0
    }

    fn pass(&mut self) {
        self.passed_count += 1;
    }

    fn fail(&mut self, path: &str, expected: &Value, actual: &Value, reason: impl Into<String>) {
        self.failed_count += 1;
        self.failures.push(ValidationFailure {
            path: path.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
            reason: reason.into(),
        });
    }
}

/// Capability used by criteria comparisons to decide equality of two values.
pub trait EquivalenceAssertion: Send + Sync {
    /// Compares `actual` against `expected`, reporting mismatches under `path`.
    fn assert_equivalent(&self, expected: &Value, actual: &Value, path: &str) -> Result<Validation>;
}

/// Structural equivalence with lenient scalar matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEquivalence;

impl EquivalenceAssertion for DefaultEquivalence {
    fn assert_equivalent(&self, expected: &Value, actual: &Value, path: &str) -> Result<Validation> {
        let mut validation = Validation::default();
        assert_value(expected, actual, path, &mut validation);
        Ok(validation)
    }
}

fn assert_value(expected: &Value, actual: &Value, path: &str, validation: &mut Validation) {
    match expected {
        Value::Object(expected_map) => {
            let parsed;
            let actual = match actual {
                Value::String(text) if looks_like_json(text) => {
                    parsed = serde_json::from_str::<Value>(text).unwrap_or_else(|_| actual.clone());
                    &parsed
                }
                other => other,
            };
            let Value::Object(actual_map) = actual else {
                validation.fail(path, expected, actual, "expected an object");
                return;
            };
            for (key, expected_value) in expected_map {
                let nested_path = child_path(path, key);
                let actual_value = actual_map.get(key).unwrap_or(&Value::Null);
                assert_value(expected_value, actual_value, &nested_path, validation);
            }
        }
        Value::Array(expected_items) => {
            let parsed;
            let actual = match actual {
                Value::String(text) if looks_like_json(text) => {
                    parsed = serde_json::from_str::<Value>(text).unwrap_or_else(|_| actual.clone());
                    &parsed
                }
                other => other,
            };
            let Value::Array(actual_items) = actual else {
                validation.fail(path, expected, actual, "expected an array");
                return;
            };
            if expected_items.len() != actual_items.len() {
                validation.fail(
                    path,
                    expected,
                    actual,
                    format!("expected {} items but had {}", expected_items.len(), actual_items.len()),
                );
                return;
            }
            for (index, (expected_item, actual_item)) in expected_items.iter().zip(actual_items).enumerate() {
                assert_value(expected_item, actual_item, &child_path(path, &index.to_string()), validation);
            }
        }
        Value::Null => {
            if actual.is_null() {
                validation.pass();
            } else {
                validation.fail(path, expected, actual, "expected nil");
            }
        }
        scalar => {
            if scalars_match(scalar, actual) {
                validation.pass();
            } else {
                validation.fail(path, expected, actual, "values differ");
            }
        }
    }
}

fn scalars_match(expected: &Value, actual: &Value) -> bool {
    if expected == actual {
        return true;
    }
    if actual.is_null() || actual.is_array() || actual.is_object() {
        return false;
    }
    if (expected.is_number() || actual.is_number())
        && let (Ok(expected_number), Ok(actual_number)) = (to_float(expected), to_float(actual))
    {
        return expected_number == actual_number;
    }
    scalar_text(expected) == scalar_text(actual)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn child_path(path: &str, segment: &str) -> String {
    if path.ends_with('/') {
        format!("{path}{segment}")
    } else {
        format!("{path}/{segment}")
    }
}
