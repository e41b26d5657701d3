//! Textual criteria syntax.
//!
//! ```text
//! $status = ok && ($count > 3 || $force)
//! ```
//!
//! Top-level `||` splits first, then `&&`, so `&&` binds tighter. Parenthesised
//! groups become nested criteria. Supported comparisons are `=` (also `==`), `!=`,
//! `>=`, `<=`, `>` and `<`. Operands that are quoted strings or JSON literals become
//! typed values, anything else stays text and is `$`-expanded at evaluation time. An
//! operand with no comparison is true when it expands to a non-empty value.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde_json::Value;

use super::{ComparisonOperator, Criteria, Criterion, LogicalOperator};

const COMPARISON_OPERATORS: [(&str, &str); 7] = [
    ("!=", "!="),
    (">=", ">="),
    ("<=", "<="),
    ("==", "="),
    ("=", "="),
    (">", ">"),
    ("<", "<"),
];

impl FromStr for Criteria {
    type Err = anyhow::Error;

    fn from_str(expression: &str) -> Result<Self> {
        parse_criteria(expression).with_context(|| format!("invalid criteria expression '{}'", expression.trim()))
    }
}

fn parse_criteria(expression: &str) -> Result<Criteria> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        bail!("expression cannot be empty");
    }
    check_balanced(trimmed)?;

    let inner = strip_outer_parentheses(trimmed);
    if let Some(parts) = split_expression(inner, "||") {
        return Ok(Criteria::new(LogicalOperator::Or, parse_parts(&parts)?));
    }
    if let Some(parts) = split_expression(inner, "&&") {
        return Ok(Criteria::new(LogicalOperator::And, parse_parts(&parts)?));
    }
    Ok(Criteria::new(LogicalOperator::And, vec![parse_criterion(inner)?]))
}

fn parse_parts(parts: &[&str]) -> Result<Vec<Criterion>> {
    parts.iter().map(|part| parse_criterion(part)).collect()
}

fn parse_criterion(expression: &str) -> Result<Criterion> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        bail!("logical operator is missing an operand");
    }

    let inner = strip_outer_parentheses(trimmed);
    if inner.len() != trimmed.len() || contains_operator(inner, "||") || contains_operator(inner, "&&") {
        return Ok(Criterion::group(parse_criteria(inner)?));
    }

    let Some((position, token, operator)) = find_comparison(inner) else {
        return Ok(Criterion::new(parse_operand(inner), ComparisonOperator::NotEqual, Value::Null));
    };

    let left = inner[..position].trim();
    let right = inner[position + token.len()..].trim();
    if left.is_empty() {
        bail!("comparison '{token}' is missing its left operand");
    }
    Ok(Criterion::new(parse_operand(left), operator, parse_operand(right)))
}

fn parse_operand(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    for quote in ['"', '\''] {
        if trimmed.len() >= 2
            && trimmed.starts_with(quote)
            && trimmed.ends_with(quote)
        {
            return Value::String(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    if looks_like_json_literal(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
    {
        return value;
    }
    Value::String(trimmed.to_string())
}

fn looks_like_json_literal(expression: &str) -> bool {
    let starts_like_number = expression
        .chars()
        .next()
        .map(|character| character == '-' || character.is_ascii_digit())
        .unwrap_or(false);
    expression.starts_with('[')
        || expression.starts_with('{')
        || expression == "null"
        || expression == "true"
        || expression == "false"
        || starts_like_number
}

fn find_comparison(expression: &str) -> Option<(usize, &'static str, &'static str)> {
    let mut scanner = Scanner::default();
    for (index, character) in expression.char_indices() {
        if scanner.advance(character) {
            continue;
        }
        if !scanner.at_top_level() {
            continue;
        }
        let rest = &expression[index..];
        if let Some((token, operator)) = COMPARISON_OPERATORS.iter().find(|(token, _)| rest.starts_with(token)) {
            return Some((index, token, operator));
        }
    }
    None
}

/// Removes every pair of parentheses that wraps the whole expression.
fn strip_outer_parentheses(expression: &str) -> &str {
    let mut current = expression.trim();
    while current.starts_with('(') && current.ends_with(')') && closing_parenthesis(current) == Some(current.len() - 1) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

fn closing_parenthesis(expression: &str) -> Option<usize> {
    let mut scanner = Scanner::default();
    for (index, character) in expression.char_indices() {
        let was_in_group = scanner.depth > 0;
        scanner.advance(character);
        if was_in_group && scanner.depth == 0 && character == ')' {
            return Some(index);
        }
    }
    None
}

fn check_balanced(expression: &str) -> Result<()> {
    let mut scanner = Scanner::default();
    for character in expression.chars() {
        scanner.advance(character);
        if scanner.depth < 0 {
            bail!("unbalanced ')'");
        }
    }
    if scanner.in_single_quote || scanner.in_double_quote {
        bail!("unterminated string literal");
    }
    if scanner.depth != 0 {
        bail!("unbalanced '('");
    }
    Ok(())
}

fn split_expression<'a>(expression: &'a str, operator: &str) -> Option<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let length = expression.len();

    while start <= length {
        if let Some(relative_index) = find_top_level_operator(&expression[start..], operator) {
            let absolute_index = start + relative_index;
            parts.push(expression[start..absolute_index].trim());
            start = absolute_index + operator.len();
        } else {
            parts.push(expression[start..].trim());
            break;
        }
    }

    if parts.len() > 1 { Some(parts) } else { None }
}

fn contains_operator(expression: &str, operator: &str) -> bool {
    find_top_level_operator(expression, operator).is_some()
}

fn find_top_level_operator(expression: &str, operator: &str) -> Option<usize> {
    let mut scanner = Scanner::default();
    for (index, character) in expression.char_indices() {
        if scanner.advance(character) {
            continue;
        }
        if scanner.at_top_level() && expression[index..].starts_with(operator) {
            return Some(index);
        }
    }
    None
}

/// Tracks quoting and nesting while walking an expression.
#[derive(Debug, Default)]
struct Scanner {
    in_single_quote: bool,
    in_double_quote: bool,
    depth: i32,
}

impl Scanner {
    /// Consumes `character`; returns true when it was a quote or grouping delimiter.
    fn advance(&mut self, character: char) -> bool {
        match character {
            '\'' if !self.in_double_quote => {
                self.in_single_quote = !self.in_single_quote;
                true
            }
            '"' if !self.in_single_quote => {
                self.in_double_quote = !self.in_double_quote;
                true
            }
            '(' | '[' | '{' if !self.in_quotes() => {
                self.depth += 1;
                true
            }
            ')' | ']' | '}' if !self.in_quotes() => {
                self.depth -= 1;
                true
            }
            _ => false,
        }
    }

    fn in_quotes(&self) -> bool {
        self.in_single_quote || self.in_double_quote
    }

    fn at_top_level(&self) -> bool {
        !self.in_quotes() && self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::State;
    use serde_json::json;

    fn parse(expression: &str) -> Criteria {
        expression.parse().expect("parse criteria")
    }

    #[test]
    fn parses_single_comparison() {
        let criteria = parse("$status = ok");
        assert_eq!(criteria.logical_operator, LogicalOperator::And);
        assert_eq!(criteria.criteria, vec![Criterion::new("$status", "=", "ok")]);
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(parse("$a >= 3").criteria[0], Criterion::new("$a", ">=", 3));
        assert_eq!(parse("$a != 3").criteria[0], Criterion::new("$a", "!=", 3));
        assert_eq!(parse("$a == 3").criteria[0], Criterion::new("$a", "=", 3));
    }

    #[test]
    fn or_splits_before_and() {
        let criteria = parse("$a = 1 && $b = 2 || $c = 3");
        assert_eq!(criteria.logical_operator, LogicalOperator::Or);
        assert_eq!(criteria.criteria.len(), 2);
        let nested = criteria.criteria[0].criteria.as_ref().expect("nested group");
        assert_eq!(nested.logical_operator, LogicalOperator::And);
        assert_eq!(nested.criteria.len(), 2);
    }

    #[test]
    fn parentheses_form_groups() {
        let criteria = parse("($status = ok) && ($count > 3 || $force)");
        assert_eq!(criteria.logical_operator, LogicalOperator::And);
        assert_eq!(criteria.criteria[0].criteria.as_deref(), Some(&parse("$status = ok")));
        let group = criteria.criteria[1].criteria.as_ref().expect("group");
        assert_eq!(group.logical_operator, LogicalOperator::Or);
        assert_eq!(group.criteria[1], Criterion::new("$force", "!=", Value::Null));
    }

    #[test]
    fn operators_inside_quotes_and_literals_are_ignored() {
        let criteria = parse(r#"$message = "a || b" && $tags = ["x=1", "y"]"#);
        assert_eq!(criteria.criteria[0], Criterion::new("$message", "=", "a || b"));
        assert_eq!(criteria.criteria[1], Criterion::new("$tags", "=", json!(["x=1", "y"])));
    }

    #[test]
    fn literal_operands_are_typed() {
        assert_eq!(parse("$a = true").criteria[0].right_operand, json!(true));
        assert_eq!(parse("$a = -1.5").criteria[0].right_operand, json!(-1.5));
        assert_eq!(parse("$a = 'true'").criteria[0].right_operand, json!("true"));
        assert_eq!(parse("$a != ").criteria[0].right_operand, Value::Null);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expression in ["", "   ", "($a = 1", "$a = 1)", "= 1", "$a = 1 && ", "'open"] {
            assert!(expression.parse::<Criteria>().is_err(), "expected '{expression}' to be rejected");
        }
    }

    #[test]
    fn parsed_expression_evaluates_against_state() {
        let mut state = State::new();
        state.put("status", "ok");
        state.put("count", 2);
        state.put("force", "yes");

        assert!(parse("$status = ok && ($count > 3 || $force)").is_true(&state).unwrap());
        assert!(!parse("$status = down || $count >= 3").is_true(&state).unwrap());
        assert!(parse("$count < 10 && $status != down").is_true(&state).unwrap());
    }
}
