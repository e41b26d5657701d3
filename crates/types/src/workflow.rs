//! Strongly typed workflow definitions and run records shared across the engine and CLI.
//!
//! A [`Workflow`] is an ordered list of [`WorkflowTask`]s, each an ordered list of
//! [`WorkflowAction`]s. Every level carries its own [`VariableBinding`]s. Ordering is
//! significant everywhere: tasks and actions execute in declaration order and action
//! selection addresses actions by their 0-based position inside a task.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub mod validation;

pub use validation::validate_workflow;

/// Ordered, string-keyed data container used for run state and activity buffers.
pub type DataMap = IndexMap<String, Value>;

/// Declarative workflow definition registered with the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Workflow {
    /// Unique identifier used as the registry key.
    #[serde(default)]
    pub name: String,
    /// Optional descriptive copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow-scoped bindings evaluated once before the first task.
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
    /// Ordered tasks executed sequentially.
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
}

impl Workflow {
    /// Checks the structural well-formedness rules enforced at registration time.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_workflow(self)
    }

    /// Looks up a task by name.
    pub fn task(&self, name: &str) -> Option<&WorkflowTask> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

/// Named group of actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowTask {
    /// Task name; also the key used by run-time task selection.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Task-scoped bindings evaluated when the task starts and folded into the run
    /// state once all of its actions have finished.
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
    /// Ordered actions; the position of each entry is its selection index.
    #[serde(default)]
    pub actions: Vec<WorkflowAction>,
}

/// A single call of `action` on the service named `service`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowAction {
    /// Name of the target service.
    #[serde(default)]
    pub service: String,
    /// Name of the operation on that service.
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Untyped payload converted into the service's typed request.
    #[serde(default)]
    pub request: Value,
    /// Action-scoped bindings.
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
}

/// Rule that computes a value and stores it under `name`.
///
/// `from` pulls an existing entry out of the source map by dotted path; `value` is an
/// expression expanded against the source map. When `from` resolves it wins, otherwise
/// `value` is used. A binding where neither resolves does not fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VariableBinding {
    /// Target key written into the destination.
    pub name: String,
    /// Dotted source path, e.g. `stdout` or `params.app`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Literal or `$`-expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl VariableBinding {
    /// Binding that copies `from` into `name`.
    pub fn from_path(name: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: Some(from.into()),
            value: None,
        }
    }

    /// Binding that stores the expansion of `value` under `name`.
    pub fn with_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            from: None,
            value: Some(value.into()),
        }
    }
}

/// Request to run a registered workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowRunRequest {
    /// Name of the registered workflow.
    #[serde(default)]
    pub name: String,
    /// Caller parameters; stored verbatim under the `params` state key.
    #[serde(default)]
    pub params: DataMap,
    /// Optional selection: task name to comma-separated action indexes. An empty map
    /// runs every task; an empty index string runs every action of that task.
    #[serde(default)]
    pub tasks: IndexMap<String, String>,
}

impl WorkflowRunRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a caller parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Selects a task and the action indexes to run within it.
    pub fn with_task(mut self, task: impl Into<String>, action_indexes: impl Into<String>) -> Self {
        self.tasks.insert(task.into(), action_indexes.into());
        self
    }
}

/// Aggregated outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowRunResponse {
    /// Name of the workflow that ran.
    pub name: String,
    /// Caller parameters after `$` expansion against the state at run start.
    #[serde(default)]
    pub params: DataMap,
    /// Snapshot of the run state when the run returned.
    #[serde(default)]
    pub data: DataMap,
    /// One record per executed task, in execution order.
    #[serde(default)]
    pub task_activities: Vec<TaskActivity>,
}

/// Activity recorded for one executed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskActivity {
    pub task: String,
    /// One record per dispatched action, in execution order.
    #[serde(default)]
    pub service_activities: Vec<ServiceActivity>,
    /// Task-local data aggregated from action bindings and service responses.
    #[serde(default)]
    pub data: DataMap,
}

impl TaskActivity {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }
}

/// Activity recorded for one dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceActivity {
    pub service: String,
    pub action: String,
    /// Serialized form of the typed request handed to the service.
    #[serde(default)]
    pub request: Value,
    /// Raw service response, absent until the service returned.
    #[serde(default)]
    pub response: Option<ServiceResponse>,
}

/// Status reported for a successful service call.
pub const STATUS_OK: &str = "ok";
/// Status reported for a failed service call.
pub const STATUS_ERROR: &str = "error";

/// Result returned by every service call.
///
/// A non-empty `error` marks a business failure; `response` holds the untyped payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceResponse {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub response: Value,
}

impl ServiceResponse {
    /// Successful response carrying `response`.
    pub fn ok(response: impl Into<Value>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            error: String::new(),
            response: response.into(),
        }
    }

    /// Failed response carrying `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            error: message.into(),
            response: Value::Null,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

impl Default for ServiceResponse {
    fn default() -> Self {
        Self::ok(Value::Null)
    }
}

fn default_status() -> String {
    STATUS_OK.to_string()
}

/// Where a workflow document comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowSource {
    /// YAML or JSON file on disk; the path may contain `$` tokens.
    File { path: PathBuf },
    /// YAML or JSON document text.
    Inline { content: String },
}

impl WorkflowSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self::Inline { content: content.into() }
    }

    /// Short human-readable label used in diagnostics.
    pub fn label(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Inline { .. } => "<inline>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_basic_workflow() {
        let yaml_text = r#"
name: deploy
variables:
  - name: region
    value: us
tasks:
  - name: build
    actions:
      - service: exec
        action: run
        request:
          commands: ["make"]
        variables:
          - name: output
            from: stdout
"#;

        let workflow: Workflow = serde_yaml::from_str(yaml_text).expect("deserialize workflow");

        assert_eq!(workflow.name, "deploy");
        assert_eq!(workflow.variables[0], VariableBinding::with_value("region", "us"));
        assert_eq!(workflow.tasks.len(), 1);
        let action = &workflow.tasks[0].actions[0];
        assert_eq!(action.service, "exec");
        assert_eq!(action.request, json!({"commands": ["make"]}));
        assert_eq!(action.variables[0], VariableBinding::from_path("output", "stdout"));
    }

    #[test]
    fn repository_sample_workflow_parses() {
        let yaml_text = include_str!("../../../workflows/release.yaml");
        let workflow: Workflow = serde_yaml::from_str(yaml_text).expect("parse sample workflow");
        assert_eq!(workflow.name, "release");
        assert!(workflow.validate().is_ok());
        assert_eq!(workflow.tasks.len(), 2);
    }

    #[test]
    fn service_response_defaults_to_ok_status() {
        let response: ServiceResponse = serde_json::from_value(json!({"response": {"id": 1}})).expect("deserialize response");
        assert_eq!(response.status, STATUS_OK);
        assert!(!response.is_error());
        assert!(ServiceResponse::failed("boom").is_error());
    }

    #[test]
    fn run_request_builder_preserves_selection_order() {
        let request = WorkflowRunRequest::new("w").with_task("b", "1").with_task("a", "");
        let keys: Vec<_> = request.tasks.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
