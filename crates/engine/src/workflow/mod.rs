//! Workflow runtime.
//!
//! - `state`: per-run state store and its reserved keys
//! - `bindings`: evaluation and application of variable bindings
//! - `registry`: process-wide catalogue of validated workflows
//! - `document`: loader seam and YAML/JSON document loader
//! - `runner`: the orchestrating [`WorkflowEngine`]

pub mod bindings;
pub mod document;
pub mod registry;
pub mod runner;
pub mod state;

pub use document::{DocumentWorkflowLoader, WorkflowLoader, parse_workflow_document};
pub use registry::WorkflowRegistry;
pub use runner::{ActionFilter, TaskSelection, WorkflowEngine};
pub use state::State;
