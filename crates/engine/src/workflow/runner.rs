//! Workflow orchestration.
//!
//! [`WorkflowEngine::run`] drives one run strictly sequentially:
//!
//! 1. resolve the workflow and seed the state (`workflow`, `params`)
//! 2. evaluate workflow bindings
//! 3. for every selected task: set `task`, evaluate task bindings, record a
//!    [`TaskActivity`], run the selected actions, then fold the task activity data into
//!    the state through the task bindings
//! 4. for every selected action: set `service`/`action`, evaluate action bindings,
//!    build and dispatch the typed request, and fold the service response into the
//!    task activity data through the action bindings
//!
//! The first failure stops the run. A service business error discards the response
//! built so far; only a request-conversion failure hands a partial response back.

use std::{collections::BTreeSet, sync::Arc};

use indexmap::IndexMap;
use runbook_types::{
    DataMap, ServiceActivity, TaskActivity, Workflow, WorkflowAction, WorkflowRunRequest, WorkflowRunResponse, WorkflowSource,
    WorkflowTask,
};
use runbook_util::{ConversionError, as_data_map};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    context::RunContext,
    error::EngineError,
    workflow::{
        bindings::{apply_bindings, evaluate_bindings},
        document::WorkflowLoader,
        registry::WorkflowRegistry,
        state::{ACTION_KEY, PARAMS_KEY, SERVICE_KEY, TASK_KEY, WORKFLOW_KEY},
    },
};

/// Registers, loads and runs workflows.
pub struct WorkflowEngine {
    registry: Arc<WorkflowRegistry>,
    loader: Arc<dyn WorkflowLoader>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine").field("registry", &self.registry).finish()
    }
}

impl WorkflowEngine {
    pub fn new(registry: Arc<WorkflowRegistry>, loader: Arc<dyn WorkflowLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Validates and registers `workflow`.
    pub fn register(&self, workflow: Workflow) -> Result<Arc<Workflow>, EngineError> {
        self.registry.register(workflow)
    }

    /// Returns the workflow registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<Workflow>, EngineError> {
        self.registry.lookup(name)
    }

    /// Loads a workflow through the configured loader and registers it.
    ///
    /// Nothing is registered when loading or validation fails.
    pub async fn load(&self, context: &RunContext, source: &WorkflowSource) -> Result<Arc<Workflow>, EngineError> {
        let workflow = self.loader.load(context, source).await.map_err(|error| EngineError::Load {
            source_label: source.label(),
            error,
        })?;
        self.register(workflow)
    }

    /// Runs the workflow named by `request` against the context's state.
    pub async fn run(&self, context: &mut RunContext, request: WorkflowRunRequest) -> Result<WorkflowRunResponse, EngineError> {
        let workflow = self.lookup(&request.name)?;
        let selection = TaskSelection::parse(&workflow.name, &request.tasks)?;

        let mut response = WorkflowRunResponse {
            name: workflow.name.clone(),
            params: expand_params(&request.params, context),
            ..Default::default()
        };

        let state = context.state_mut();
        state.put(WORKFLOW_KEY, workflow.name.clone());
        state.put(PARAMS_KEY, Value::Object(request.params.into_iter().collect()));
        evaluate_bindings(&workflow.variables, state);

        info!(
            workflow = %workflow.name,
            task_count = workflow.tasks.len(),
            selective = selection.is_active(),
            "workflow run started"
        );

        for task in &workflow.tasks {
            let Some(action_filter) = selection.actions_for(&task.name) else {
                debug!(workflow = %workflow.name, task = %task.name, "task skipped by selection");
                continue;
            };
            self.run_task(context, &workflow, task, action_filter, &mut response).await?;
        }

        response.data = context.state().snapshot();
        info!(
            workflow = %workflow.name,
            task_count = response.task_activities.len(),
            "workflow run finished"
        );
        Ok(response)
    }

    async fn run_task(
        &self,
        context: &mut RunContext,
        workflow: &Workflow,
        task: &WorkflowTask,
        action_filter: &ActionFilter,
        response: &mut WorkflowRunResponse,
    ) -> Result<(), EngineError> {
        let state = context.state_mut();
        state.put(TASK_KEY, task.name.clone());
        evaluate_bindings(&task.variables, state);

        debug!(workflow = %workflow.name, task = %task.name, action_count = task.actions.len(), "task started");
        response.task_activities.push(TaskActivity::new(task.name.clone()));
        let activity_index = response.task_activities.len() - 1;

        for (action_index, action) in task.actions.iter().enumerate() {
            if !action_filter.allows(action_index) {
                debug!(
                    workflow = %workflow.name,
                    task = %task.name,
                    action_index,
                    "action skipped by selection"
                );
                continue;
            }

            let activity = &mut response.task_activities[activity_index];
            let dispatch = Dispatch {
                workflow,
                task,
                action,
            };
            let outcome = dispatch.execute(context, activity).await;
            match outcome {
                Ok(()) => {}
                Err(ActionFailure::Conversion(error)) => {
                    warn!(
                        workflow = %workflow.name,
                        task = %task.name,
                        service = %action.service,
                        action = %action.action,
                        error = %error,
                        "request conversion failed"
                    );
                    let mut partial = response.clone();
                    partial.data = context.state().snapshot();
                    return Err(EngineError::RequestConversion {
                        workflow: workflow.name.clone(),
                        task: task.name.clone(),
                        service: action.service.clone(),
                        action: action.action.clone(),
                        error,
                        partial: Box::new(partial),
                    });
                }
                Err(ActionFailure::Engine(error)) => return Err(error),
            }
        }

        let activity = &response.task_activities[activity_index];
        apply_bindings(&task.variables, &activity.data, context.state_mut().values_mut(), false);
        debug!(workflow = %workflow.name, task = %task.name, "task finished");
        Ok(())
    }
}

/// Failure of a single action dispatch.
enum ActionFailure {
    /// The payload could not be assigned onto the typed request; the caller attaches
    /// the partial response.
    Conversion(ConversionError),
    Engine(EngineError),
}

impl From<EngineError> for ActionFailure {
    fn from(error: EngineError) -> Self {
        Self::Engine(error)
    }
}

/// One action of one task, with the names needed for diagnostics.
struct Dispatch<'a> {
    workflow: &'a Workflow,
    task: &'a WorkflowTask,
    action: &'a WorkflowAction,
}

impl Dispatch<'_> {
    async fn execute(&self, context: &mut RunContext, activity: &mut TaskActivity) -> Result<(), ActionFailure> {
        let action = self.action;
        let state = context.state_mut();
        state.put(SERVICE_KEY, action.service.clone());
        state.put(ACTION_KEY, action.action.clone());
        evaluate_bindings(&action.variables, state);
        apply_bindings(&action.variables, context.state().values(), &mut activity.data, true);

        let service = context.service(&action.service).map_err(|error| EngineError::ServiceResolution {
            workflow: self.workflow.name.clone(),
            task: self.task.name.clone(),
            service: action.service.clone(),
            error,
        })?;
        let mut request = service
            .new_request(&action.action)
            .map_err(|error| EngineError::RequestConstruction {
                workflow: self.workflow.name.clone(),
                task: self.task.name.clone(),
                service: action.service.clone(),
                action: action.action.clone(),
                error,
            })?;

        activity.service_activities.push(ServiceActivity {
            service: action.service.clone(),
            action: action.action.clone(),
            request: request.to_value(),
            response: None,
        });
        let service_activity_index = activity.service_activities.len() - 1;

        let payload = context.expand(&action.request);
        request.assign(&payload).map_err(ActionFailure::Conversion)?;
        activity.service_activities[service_activity_index].request = request.to_value();

        debug!(
            workflow = %self.workflow.name,
            task = %self.task.name,
            service = %action.service,
            action = %action.action,
            "dispatching action"
        );
        let service_response = service.run(context, request).await;
        activity.service_activities[service_activity_index].response = Some(service_response.clone());

        if service_response.is_error() {
            warn!(
                workflow = %self.workflow.name,
                task = %self.task.name,
                service = %action.service,
                action = %action.action,
                error = %service_response.error,
                "service reported failure"
            );
            return Err(EngineError::ServiceFailure {
                workflow: self.workflow.name.clone(),
                task: self.task.name.clone(),
                service: action.service.clone(),
                action: action.action.clone(),
                message: service_response.error,
            }
            .into());
        }

        let response_data = as_data_map(&service_response.response).map_err(|error| EngineError::ResponseDecoding {
            workflow: self.workflow.name.clone(),
            task: self.task.name.clone(),
            service: action.service.clone(),
            action: action.action.clone(),
            error,
        })?;
        apply_bindings(&action.variables, &response_data, &mut activity.data, false);
        Ok(())
    }
}

/// Expands string parameters against the state; other values are kept as-is.
fn expand_params(params: &DataMap, context: &RunContext) -> DataMap {
    params
        .iter()
        .map(|(key, value)| {
            let expanded = match value {
                Value::String(_) => context.expand(value),
                other => other.clone(),
            };
            (key.clone(), expanded)
        })
        .collect()
}

/// Per-run task selection parsed from [`WorkflowRunRequest::tasks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSelection {
    tasks: Option<IndexMap<String, ActionFilter>>,
}

/// Allowed action indexes within a selected task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionFilter {
    indexes: BTreeSet<usize>,
}

static RUN_ALL_ACTIONS: ActionFilter = ActionFilter::all();

impl ActionFilter {
    /// Filter that lets every action run.
    pub const fn all() -> Self {
        Self { indexes: BTreeSet::new() }
    }

    /// An empty index set means every action runs.
    pub fn allows(&self, action_index: usize) -> bool {
        self.indexes.is_empty() || self.indexes.contains(&action_index)
    }
}

impl TaskSelection {
    /// Parses `task name -> "0,2"` entries. Empty entries are ignored; an empty or
    /// all-empty index list selects every action of the task.
    pub fn parse(workflow: &str, tasks: &IndexMap<String, String>) -> Result<Self, EngineError> {
        if tasks.is_empty() {
            return Ok(Self::default());
        }

        let mut selected = IndexMap::with_capacity(tasks.len());
        for (task, indexes) in tasks {
            let mut allowed = BTreeSet::new();
            for entry in indexes.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
                let index = entry.parse::<usize>().map_err(|_| EngineError::InvalidSelection {
                    workflow: workflow.to_string(),
                    task: task.clone(),
                    indexes: indexes.clone(),
                })?;
                allowed.insert(index);
            }
            selected.insert(task.clone(), ActionFilter { indexes: allowed });
        }

        Ok(Self { tasks: Some(selected) })
    }

    pub fn is_active(&self) -> bool {
        self.tasks.is_some()
    }

    /// Returns the action filter for `task`, or `None` when the task is not selected.
    pub fn actions_for(&self, task: &str) -> Option<&ActionFilter> {
        match &self.tasks {
            None => Some(&RUN_ALL_ACTIONS),
            Some(tasks) => tasks.get(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    #[test]
    fn empty_selection_runs_everything() {
        let selection = TaskSelection::parse("w", &IndexMap::new()).expect("parse");
        assert!(!selection.is_active());
        let filter = selection.actions_for("anything").expect("all tasks selected");
        assert!(filter.allows(0) && filter.allows(9));
    }

    #[test]
    fn selection_limits_tasks_and_actions() {
        let tasks = indexmap! {"T1".to_string() => " 0, 2,".to_string()};
        let selection = TaskSelection::parse("w", &tasks).expect("parse");

        assert!(selection.is_active());
        assert!(selection.actions_for("T2").is_none());
        let filter = selection.actions_for("T1").expect("T1 selected");
        assert!(filter.allows(0));
        assert!(!filter.allows(1));
        assert!(filter.allows(2));
    }

    #[test]
    fn empty_index_list_runs_all_actions_of_task() {
        let tasks = indexmap! {"T1".to_string() => ",".to_string()};
        let selection = TaskSelection::parse("w", &tasks).expect("parse");
        let filter = selection.actions_for("T1").expect("T1 selected");
        assert!(filter.allows(0) && filter.allows(5));
    }

    #[test]
    fn non_numeric_index_is_rejected() {
        let tasks = indexmap! {"T1".to_string() => "0,x".to_string()};
        let error = TaskSelection::parse("w", &tasks).expect_err("expected selection error");
        assert!(matches!(error, EngineError::InvalidSelection { ref task, .. } if task == "T1"));
    }
}
