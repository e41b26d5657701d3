//! Shared type definitions for the runbook workspace.
//!
//! The workflow model and the run records live here so the engine, the CLI and
//! any external service implementation agree on a single serialized shape.

pub mod workflow;

pub use workflow::{
    DataMap, ServiceActivity, ServiceResponse, TaskActivity, VariableBinding, Workflow, WorkflowAction, WorkflowRunRequest,
    WorkflowRunResponse, WorkflowSource, WorkflowTask,
};
