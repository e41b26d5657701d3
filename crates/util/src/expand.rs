//! `$` token expansion against a data map.
//!
//! Supported token shapes:
//!
//! - `$name` and `$name.nested.0`, an identifier followed by dotted segments
//! - `${name.nested[0]}`, the braced form for tokens adjacent to other text
//!
//! A string that consists of exactly one token is replaced by the stored value with
//! its type preserved. Tokens embedded in longer text are rendered textually. Tokens
//! that do not resolve are left verbatim so later stages can still see them.
//!
//! A bare token whose full path does not resolve falls back to its longest resolving
//! prefix; the remaining segments stay as literal text, so `$name.txt` renders
//! `app.txt` when `name` is `app`. Braced tokens resolve as a whole or not at all.
//!
//! ```rust
//! use runbook_util::expand_value;
//! use runbook_types::DataMap;
//! use serde_json::json;
//!
//! let mut state = DataMap::new();
//! state.insert("params".into(), json!({"app": "billing", "replicas": 3}));
//!
//! assert_eq!(expand_value(&json!("$params.replicas"), &state), json!(3));
//! assert_eq!(expand_value(&json!("deploy ${params.app}!"), &state), json!("deploy billing!"));
//! assert_eq!(expand_value(&json!("$params.app.log"), &state), json!("billing.log"));
//! assert_eq!(expand_value(&json!("$missing"), &state), json!("$missing"));
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use runbook_types::DataMap;
use serde_json::Value;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+|\[\d+\])*)").expect("token pattern compiles")
});

/// Recursively expands every string inside `value` against `source`.
pub fn expand_value(value: &Value, source: &DataMap) -> Value {
    match value {
        Value::String(text) => expand_text(text, source),
        Value::Array(items) => Value::Array(items.iter().map(|item| expand_value(item, source)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), expand_value(nested, source)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Expands the tokens of a single string.
pub fn expand_text(text: &str, source: &DataMap) -> Value {
    if !text.contains('$') {
        return Value::String(text.to_string());
    }

    if let Some(captures) = TOKEN_PATTERN.captures(text)
        && let Some(whole) = captures.get(0)
        && whole.start() == 0
        && whole.end() == text.len()
    {
        return match resolve_token(source, &captures) {
            Some((resolved, "")) => resolved.clone(),
            Some((resolved, suffix)) => Value::String(format!("{}{suffix}", render_text(resolved))),
            None => Value::String(text.to_string()),
        };
    }

    let expanded = TOKEN_PATTERN.replace_all(text, |captures: &Captures| match resolve_token(source, captures) {
        Some((resolved, suffix)) => format!("{}{suffix}", render_text(resolved)),
        None => captures[0].to_string(),
    });
    Value::String(expanded.into_owned())
}

/// Renders a value for embedding into text: strings verbatim, null as empty, anything
/// else as compact JSON.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Looks up a dotted path (`a.b.0`, `a.b[0]`) in `source`.
///
/// A key stored verbatim (dots included) takes precedence over path navigation.
pub fn value_at_path<'a>(source: &'a DataMap, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    if let Some(direct) = source.get(path) {
        return Some(direct);
    }

    let segments = path_segments(path);
    let (first, rest) = segments.split_first()?;
    let mut current = source.get(first.as_str())?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment.as_str())?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a matched token to its value and the unconsumed literal suffix.
fn resolve_token<'a, 't>(source: &'a DataMap, captures: &Captures<'t>) -> Option<(&'a Value, &'t str)> {
    if let Some(braced) = captures.get(1) {
        return value_at_path(source, braced.as_str()).map(|resolved| (resolved, ""));
    }

    let path = captures.get(2)?.as_str();
    let mut end = path.len();
    loop {
        if let Some(resolved) = value_at_path(source, &path[..end]) {
            return Some((resolved, &path[end..]));
        }
        end = path[..end].rfind(['.', '['])?;
    }
}

fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for character in path.chars() {
        match character {
            '.' | '[' | ']' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(character),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> DataMap {
        let mut state = DataMap::new();
        state.insert("workflow".into(), json!("release"));
        state.insert("count".into(), json!(2));
        state.insert("build".into(), json!({"artifacts": [{"name": "app.tar"}], "ok": true}));
        state.insert("dotted.key".into(), json!("verbatim"));
        state
    }

    #[test]
    fn whole_token_keeps_value_type() {
        let state = sample_state();
        assert_eq!(expand_value(&json!("$count"), &state), json!(2));
        assert_eq!(expand_value(&json!("${build.ok}"), &state), json!(true));
    }

    #[test]
    fn embedded_tokens_render_as_text() {
        let state = sample_state();
        assert_eq!(
            expand_value(&json!("$workflow has $count steps"), &state),
            json!("release has 2 steps")
        );
        assert_eq!(expand_value(&json!("${workflow}-v1"), &state), json!("release-v1"));
    }

    #[test]
    fn unresolved_tokens_are_left_verbatim() {
        let state = sample_state();
        assert_eq!(expand_value(&json!("$unknown"), &state), json!("$unknown"));
        assert_eq!(expand_value(&json!("a $unknown b $count"), &state), json!("a $unknown b 2"));
        assert_eq!(expand_value(&json!("costs $5"), &state), json!("costs $5"));
    }

    #[test]
    fn bare_token_backs_off_to_longest_resolving_prefix() {
        let mut state = sample_state();
        state.insert("name".into(), json!("app"));
        state.insert("version".into(), json!("1.2.0"));

        assert_eq!(expand_value(&json!("$name.txt"), &state), json!("app.txt"));
        assert_eq!(expand_value(&json!("app-$version.tar.gz"), &state), json!("app-1.2.0.tar.gz"));
        assert_eq!(expand_value(&json!("$build.ok.flag"), &state), json!("true.flag"));
        assert_eq!(expand_value(&json!("${name.txt}"), &state), json!("${name.txt}"));
        assert_eq!(expand_value(&json!("$unknown.txt"), &state), json!("$unknown.txt"));
    }

    #[test]
    fn navigates_objects_and_arrays() {
        let state = sample_state();
        assert_eq!(expand_value(&json!("$build.artifacts.0.name"), &state), json!("app.tar"));
        assert_eq!(expand_value(&json!("$build.artifacts[0].name"), &state), json!("app.tar"));
        assert_eq!(value_at_path(&state, "dotted.key"), Some(&json!("verbatim")));
        assert_eq!(value_at_path(&state, "build.artifacts.7"), None);
    }

    #[test]
    fn expands_nested_structures_and_passes_through_scalars() {
        let state = sample_state();
        let expanded = expand_value(&json!({"name": "$workflow", "items": ["$count", 5, null]}), &state);
        assert_eq!(expanded, json!({"name": "release", "items": [2, 5, null]}));
        assert_eq!(expand_value(&json!(12.5), &state), json!(12.5));
    }
}
