//! Boolean criteria evaluated against run state.
//!
//! A [`Criteria`] combines [`Criterion`] leaves with a single logical operator and
//! short-circuits left to right. Leaves compare two operands after `$` expansion:
//!
//! - `=` / `:` passes when the left operand is equivalent to the expected right operand
//! - `!=` / empty operator passes when the operands differ; a missing right operand
//!   compared with text is treated as the empty string
//! - `>=`, `<=`, `>`, `<` compare numerically and fail on non-numeric operands
//! - any other operator evaluates to `false`
//!
//! Criteria can also be written as text, see [`syntax`].

pub mod syntax;

use std::fmt;

use anyhow::{Context, Result};
use runbook_util::{DefaultEquivalence, EquivalenceAssertion, to_float};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::workflow::state::State;

/// Operator joining the children of a [`Criteria`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl From<String> for LogicalOperator {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for LogicalOperator {
    fn from(value: &str) -> Self {
        if value.trim() == "||" { Self::Or } else { Self::And }
    }
}

impl From<LogicalOperator> for String {
    fn from(value: LogicalOperator) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("&&"),
            Self::Or => f.write_str("||"),
        }
    }
}

/// Comparison applied by a leaf [`Criterion`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComparisonOperator {
    Equal,
    /// Passes when the expected left operand is not equivalent to the right one.
    ///
    /// The comparison is directional: `=` checks the left operand against the right one
    /// as expected value, `!=` checks the right operand against the left one. Since an
    /// object only needs the expected keys, `$a = {"id": 7}` and `$a != {"id": 7}` are
    /// both true when `$a` holds extra keys. For scalars and same-shape values `!=` is
    /// the negation of `=`.
    #[default]
    NotEqual,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
    Less,
    /// Unrecognised operator text; always evaluates to `false`.
    Unsupported(String),
}

impl From<&str> for ComparisonOperator {
    fn from(value: &str) -> Self {
        match value.trim() {
            "=" | ":" => Self::Equal,
            "!=" | "" => Self::NotEqual,
            ">=" => Self::GreaterOrEqual,
            "<=" => Self::LessOrEqual,
            ">" => Self::Greater,
            "<" => Self::Less,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl From<String> for ComparisonOperator {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ComparisonOperator> for String {
    fn from(value: ComparisonOperator) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => f.write_str("="),
            Self::NotEqual => f.write_str("!="),
            Self::GreaterOrEqual => f.write_str(">="),
            Self::LessOrEqual => f.write_str("<="),
            Self::Greater => f.write_str(">"),
            Self::Less => f.write_str("<"),
            Self::Unsupported(text) => f.write_str(text),
        }
    }
}

/// Children combined with one logical operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Criteria {
    pub fn new(logical_operator: LogicalOperator, criteria: Vec<Criterion>) -> Self {
        Self {
            logical_operator,
            criteria,
        }
    }

    /// Evaluates the criteria with [`DefaultEquivalence`].
    pub fn is_true(&self, state: &State) -> Result<bool> {
        self.is_true_with(state, &DefaultEquivalence)
    }

    /// Evaluates the criteria with a caller-supplied equivalence assertion.
    ///
    /// `||` returns on the first true child, `&&` on the first false one; the first
    /// error stops evaluation either way. Without children `&&` is true and `||` false.
    pub fn is_true_with(&self, state: &State, assertion: &dyn EquivalenceAssertion) -> Result<bool> {
        match self.logical_operator {
            LogicalOperator::Or => {
                for criterion in &self.criteria {
                    if criterion.is_true_with(state, assertion)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            LogicalOperator::And => {
                for criterion in &self.criteria {
                    if !criterion.is_true_with(state, assertion)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// A single comparison, or a nested [`Criteria`] group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Nested group; when present the operands are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Box<Criteria>>,
    #[serde(default)]
    pub left_operand: Value,
    #[serde(default)]
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub right_operand: Value,
}

impl Criterion {
    pub fn new(left_operand: impl Into<Value>, operator: impl Into<ComparisonOperator>, right_operand: impl Into<Value>) -> Self {
        Self {
            criteria: None,
            left_operand: left_operand.into(),
            operator: operator.into(),
            right_operand: right_operand.into(),
        }
    }

    /// Wraps a nested group.
    pub fn group(criteria: Criteria) -> Self {
        Self {
            criteria: Some(Box::new(criteria)),
            ..Default::default()
        }
    }

    pub fn is_true(&self, state: &State) -> Result<bool> {
        self.is_true_with(state, &DefaultEquivalence)
    }

    pub fn is_true_with(&self, state: &State, assertion: &dyn EquivalenceAssertion) -> Result<bool> {
        if let Some(criteria) = &self.criteria {
            return criteria.is_true_with(state, assertion);
        }

        let left = state.expand(&self.left_operand);
        let mut right = state.expand(&self.right_operand);

        match &self.operator {
            ComparisonOperator::Equal => {
                let validation = assertion.assert_equivalent(&right, &left, "/")?;
                Ok(validation.failed_count == 0)
            }
            ComparisonOperator::NotEqual => {
                if left.is_string() && right.is_null() {
                    right = Value::String(String::new());
                }
                let validation = assertion.assert_equivalent(&left, &right, "/")?;
                Ok(validation.failed_count > 0)
            }
            ComparisonOperator::GreaterOrEqual => compare_numbers(&left, &right, |left, right| left >= right),
            ComparisonOperator::LessOrEqual => compare_numbers(&left, &right, |left, right| left <= right),
            ComparisonOperator::Greater => compare_numbers(&left, &right, |left, right| left > right),
            ComparisonOperator::Less => compare_numbers(&left, &right, |left, right| left < right),
            ComparisonOperator::Unsupported(operator) => {
                debug!(operator = %operator, "unsupported comparison operator evaluated as false");
                Ok(false)
            }
        }
    }
}

fn compare_numbers(left: &Value, right: &Value, compare: impl Fn(f64, f64) -> bool) -> Result<bool> {
    let left = to_float(left).context("left operand is not numeric")?;
    let right = to_float(right).context("right operand is not numeric")?;
    Ok(compare(left, right))
}
