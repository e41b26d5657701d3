//! # Runbook Engine
//!
//! Registers declarative workflows and runs them by dispatching each action to a named
//! service, threading one shared state through the whole run.
//!
//! ## Key Features
//!
//! - **Workflow Registry**: validated definitions keyed by name, safe for concurrent runs
//! - **Orchestration**: tasks and actions run sequentially, optionally narrowed by a
//!   per-run task/action selection
//! - **Variable Bindings**: workflow, task and action scoped data flow between state,
//!   activity records and service responses
//! - **Criteria**: boolean expressions over state with `&&`/`||` short-circuiting
//!
//! ## Usage
//!
//! ```rust
//! use runbook_engine::{Criteria, State};
//!
//! let mut state = State::new();
//! state.put("status", "ok");
//! state.put("count", 4);
//!
//! let criteria: Criteria = "$status = ok && $count > 3".parse()?;
//! assert!(criteria.is_true(&state)?);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - **`workflow`**: state, bindings, registry, loader and the [`WorkflowEngine`]
//! - **`service`**: service contracts, the in-memory locator and the built-in `workflow` service
//! - **`criteria`**: criteria model, evaluation and textual syntax
//! - **`context`**: the caller-owned [`RunContext`]
//! - **`error`**: [`EngineError`]

pub mod context;
pub mod criteria;
pub mod error;
pub mod service;
pub mod workflow;

pub use context::RunContext;
pub use criteria::{ComparisonOperator, Criteria, Criterion, LogicalOperator};
pub use error::EngineError;
pub use service::{
    Service, ServiceLocator, ServiceRegistry, ServiceRequest, WORKFLOW_SERVICE_ID, WorkflowLoadRequest, WorkflowRegisterRequest,
    WorkflowService, downcast_request,
};
pub use workflow::{DocumentWorkflowLoader, State, WorkflowEngine, WorkflowLoader, WorkflowRegistry, parse_workflow_document};
