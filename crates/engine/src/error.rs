//! Errors surfaced by the workflow engine.
//!
//! The engine stops at the first failure and reports it with enough context (workflow,
//! task, service, action) to locate the failing definition. Only
//! [`EngineError::RequestConversion`] carries a partial response.

use runbook_types::WorkflowRunResponse;
use runbook_util::ConversionError;
use thiserror::Error;

/// Failure of a registry, loader or run operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No workflow is registered under the requested name.
    #[error("failed to lookup workflow: {name}")]
    WorkflowNotFound { name: String },

    /// The workflow definition failed structural validation.
    #[error("invalid workflow '{name}': {error:#}")]
    InvalidWorkflow {
        name: String,
        #[source]
        error: anyhow::Error,
    },

    /// The loader could not produce a workflow from the source.
    #[error("failed to load workflow from {source_label}: {error:#}")]
    Load {
        source_label: String,
        #[source]
        error: anyhow::Error,
    },

    /// The task selection map of the run request is malformed.
    #[error("invalid action selection '{indexes}' for task '{task}' in workflow {workflow}")]
    InvalidSelection { workflow: String, task: String, indexes: String },

    /// The action's service is not known to the locator.
    #[error("failed to resolve service '{service}' for {workflow}/{task}: {error:#}")]
    ServiceResolution {
        workflow: String,
        task: String,
        service: String,
        #[source]
        error: anyhow::Error,
    },

    /// The service refused to build a request for the action.
    #[error("failed to build request for {service}.{action} in {workflow}/{task}: {error:#}")]
    RequestConstruction {
        workflow: String,
        task: String,
        service: String,
        action: String,
        #[source]
        error: anyhow::Error,
    },

    /// The action's payload could not be assigned onto the typed request.
    ///
    /// `partial` holds the response built so far, including the activity of the
    /// failing action.
    #[error("failed to convert request for {service}.{action} in {workflow}/{task}: {error}")]
    RequestConversion {
        workflow: String,
        task: String,
        service: String,
        action: String,
        #[source]
        error: ConversionError,
        partial: Box<WorkflowRunResponse>,
    },

    /// The service reported a business error.
    #[error("{service}.{action} failed in {workflow}/{task}: {message}")]
    ServiceFailure {
        workflow: String,
        task: String,
        service: String,
        action: String,
        message: String,
    },

    /// The service payload could not be read as a map.
    #[error("failed to decode response of {service}.{action} in {workflow}/{task}: {error}")]
    ResponseDecoding {
        workflow: String,
        task: String,
        service: String,
        action: String,
        #[source]
        error: ConversionError,
    },

    /// The workflow registry lock was poisoned by a panicking writer.
    #[error("workflow registry unavailable: {message}")]
    RegistryUnavailable { message: String },
}

impl EngineError {
    /// The partial response attached to a request-conversion failure.
    pub fn partial_response(&self) -> Option<&WorkflowRunResponse> {
        match self {
            Self::RequestConversion { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// True for lookup failures (workflow or service not found).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkflowNotFound { .. } | Self::ServiceResolution { .. })
    }
}
