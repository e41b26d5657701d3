//! Process-wide catalogue of registered workflows.
//!
//! The registry is an explicit value owned by whoever builds the engine, so separate
//! engines (and tests) never share definitions by accident. Definitions are validated
//! before they are stored and are immutable once registered; re-registering a name
//! replaces the previous definition.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use runbook_types::Workflow;
use tracing::debug;

use crate::error::EngineError;

/// Concurrency-safe map of workflow name to definition.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<Workflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores `workflow`, overwriting any definition with the same name.
    pub fn register(&self, workflow: Workflow) -> Result<Arc<Workflow>, EngineError> {
        workflow.validate().map_err(|error| EngineError::InvalidWorkflow {
            name: workflow.name.clone(),
            error,
        })?;

        let workflow = Arc::new(workflow);
        let mut workflows = self.workflows.write().map_err(|error| EngineError::RegistryUnavailable {
            message: error.to_string(),
        })?;
        let replaced = workflows.insert(workflow.name.clone(), Arc::clone(&workflow)).is_some();
        debug!(workflow = %workflow.name, task_count = workflow.tasks.len(), replaced, "workflow registered");
        Ok(workflow)
    }

    /// Returns the definition registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<Workflow>, EngineError> {
        let workflows = self.workflows.read().map_err(|error| EngineError::RegistryUnavailable {
            message: error.to_string(),
        })?;
        workflows
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound { name: name.to_string() })
    }

    /// Lists registered workflow names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.workflows.read() {
            Ok(workflows) => workflows.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
