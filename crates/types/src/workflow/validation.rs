//! Structural validation applied before a workflow is accepted by the registry.
//!
//! Task names must be unique because run-time selection addresses tasks by name;
//! every action must name both a service and an operation.

use std::collections::HashSet;

use anyhow::{Result, bail};

use super::{VariableBinding, Workflow};

/// Validates the structural well-formedness of `workflow`.
pub fn validate_workflow(workflow: &Workflow) -> Result<()> {
    if workflow.name.trim().is_empty() {
        bail!("workflow is missing the required 'name'");
    }
    validate_bindings(&workflow.variables, "workflow variables")?;

    let mut task_names = HashSet::new();
    for (task_index, task) in workflow.tasks.iter().enumerate() {
        if task.name.trim().is_empty() {
            bail!("task #{} is missing the required 'name'", task_index);
        }
        if !task_names.insert(task.name.as_str()) {
            bail!("duplicate task name detected: '{}'", task.name);
        }
        validate_bindings(&task.variables, &format!("task '{}' variables", task.name))?;

        for (action_index, action) in task.actions.iter().enumerate() {
            if action.service.trim().is_empty() {
                bail!("task '{}' action #{} is missing the required 'service'", task.name, action_index);
            }
            if action.action.trim().is_empty() {
                bail!("task '{}' action #{} is missing the required 'action'", task.name, action_index);
            }
            validate_bindings(
                &action.variables,
                &format!("task '{}' action #{} variables", task.name, action_index),
            )?;
        }
    }

    Ok(())
}

fn validate_bindings(bindings: &[VariableBinding], scope: &str) -> Result<()> {
    for (index, binding) in bindings.iter().enumerate() {
        if binding.name.trim().is_empty() {
            bail!("{} entry #{} is missing the required 'name'", scope, index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{WorkflowAction, WorkflowTask};

    fn action(service: &str, action: &str) -> WorkflowAction {
        WorkflowAction {
            service: service.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    fn workflow_with_tasks(tasks: Vec<WorkflowTask>) -> Workflow {
        Workflow {
            name: "demo".into(),
            tasks,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_well_formed_workflow() {
        let workflow = workflow_with_tasks(vec![WorkflowTask {
            name: "build".into(),
            actions: vec![action("exec", "run")],
            ..Default::default()
        }]);

        assert!(validate_workflow(&workflow).is_ok());
    }

    #[test]
    fn accepts_workflow_without_tasks() {
        assert!(validate_workflow(&workflow_with_tasks(Vec::new())).is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        let mut workflow = workflow_with_tasks(Vec::new());
        workflow.name = "  ".into();

        let error = validate_workflow(&workflow).expect_err("expected name error");
        assert!(error.to_string().contains("missing the required 'name'"));
    }

    #[test]
    fn rejects_duplicate_task_names() {
        let task = WorkflowTask {
            name: "build".into(),
            ..Default::default()
        };
        let workflow = workflow_with_tasks(vec![task.clone(), task]);

        let error = validate_workflow(&workflow).expect_err("expected duplicate error");
        assert!(error.to_string().contains("duplicate task name"));
    }

    #[test]
    fn rejects_action_without_service() {
        let workflow = workflow_with_tasks(vec![WorkflowTask {
            name: "build".into(),
            actions: vec![action("exec", "run"), action("", "run")],
            ..Default::default()
        }]);

        let error = validate_workflow(&workflow).expect_err("expected service error");
        assert!(error.to_string().contains("action #1 is missing the required 'service'"));
    }

    #[test]
    fn rejects_unnamed_binding() {
        let mut workflow = workflow_with_tasks(Vec::new());
        workflow.variables.push(VariableBinding::with_value("", "x"));

        let error = validate_workflow(&workflow).expect_err("expected binding error");
        assert!(error.to_string().contains("workflow variables entry #0"));
    }
}
