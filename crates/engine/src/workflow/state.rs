//! Shared run state.
//!
//! A single [`State`] instance is threaded through a whole run. Every stage writes
//! into it in place and nothing resets it, so entries written by the workflow,
//! a task, an action binding or a folded task activity stay visible to every later
//! stage of the same run.

use runbook_types::DataMap;
use runbook_util::{expand_value, value_at_path};
use serde_json::Value;

/// State key holding the running workflow's name.
pub const WORKFLOW_KEY: &str = "workflow";
/// State key holding the raw caller parameters.
pub const PARAMS_KEY: &str = "params";
/// State key holding the current task name.
pub const TASK_KEY: &str = "task";
/// State key holding the current action's service name.
pub const SERVICE_KEY: &str = "service";
/// State key holding the current action name.
pub const ACTION_KEY: &str = "action";

/// Ordered, string-keyed run state with `$` expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    values: DataMap,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Looks up a dotted path such as `params.app` or `build.artifacts.0`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        value_at_path(&self.values, path)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Expands `$` tokens in `value` against the current entries.
    pub fn expand(&self, value: &Value) -> Value {
        expand_value(value, &self.values)
    }

    pub fn values(&self) -> &DataMap {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut DataMap {
        &mut self.values
    }

    /// Copies the current entries.
    pub fn snapshot(&self) -> DataMap {
        self.values.clone()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<DataMap> for State {
    fn from(values: DataMap) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_preserves_insertion_order() {
        let mut state = State::new();
        state.put(WORKFLOW_KEY, "release");
        state.put("b", 1);
        state.put("a", 2);
        state.put("b", 3);

        let keys: Vec<_> = state.values().keys().cloned().collect();
        assert_eq!(keys, vec!["workflow", "b", "a"]);
        assert_eq!(state.get("b"), Some(&json!(3)));
    }

    #[test]
    fn expands_against_stored_entries() {
        let mut state = State::new();
        state.put(PARAMS_KEY, json!({"app": "billing"}));

        assert_eq!(state.expand(&json!("$params.app")), json!("billing"));
        assert_eq!(state.get_path("params.app"), Some(&json!("billing")));
        assert!(state.contains_key(PARAMS_KEY));
    }
}
