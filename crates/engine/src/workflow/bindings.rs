//! Variable binding evaluation.
//!
//! Bindings are declared at workflow, task and action level. Two operations consume
//! them:
//!
//! - [`evaluate_bindings`] resolves every binding against the run state and writes the
//!   results back into that state, in declaration order, so a binding can refer to the
//!   entry produced by the binding before it.
//! - [`apply_bindings`] resolves every binding against a source map and copies the
//!   results into a destination map, optionally refusing to replace existing keys.

use runbook_types::{DataMap, VariableBinding};
use runbook_util::{expand_value, value_at_path};
use serde_json::Value;
use tracing::trace;

use super::state::State;

/// Evaluates `bindings` against `state` and injects the results into it.
pub fn evaluate_bindings(bindings: &[VariableBinding], state: &mut State) {
    for binding in bindings {
        if let Some(value) = resolve_binding(binding, state.values()) {
            trace!(binding = %binding.name, "binding evaluated into state");
            state.put(binding.name.clone(), value);
        }
    }
}

/// Resolves `bindings` against `source` and copies the results into `destination`.
///
/// With `overwrite` unset, keys already present in `destination` keep their value.
pub fn apply_bindings(bindings: &[VariableBinding], source: &DataMap, destination: &mut DataMap, overwrite: bool) {
    for binding in bindings {
        if !overwrite && destination.contains_key(&binding.name) {
            continue;
        }
        if let Some(value) = resolve_binding(binding, source) {
            destination.insert(binding.name.clone(), value);
        }
    }
}

/// Computes the value of a single binding, or `None` when it does not fire.
pub fn resolve_binding(binding: &VariableBinding, source: &DataMap) -> Option<Value> {
    if let Some(path) = binding.from.as_deref()
        && let Some(found) = value_at_path(source, path)
    {
        return Some(found.clone());
    }
    binding.value.as_ref().map(|value| expand_value(value, source))
}
