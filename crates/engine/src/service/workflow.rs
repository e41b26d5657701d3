//! Built-in service that exposes the engine to workflow actions.
//!
//! Actions:
//! - `run`: runs a registered workflow against the caller's state
//! - `register`: validates and registers an inline workflow definition
//! - `load`: loads a workflow document and registers it

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use runbook_types::{ServiceResponse, Workflow, WorkflowRunRequest, WorkflowSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{Service, ServiceRequest, downcast_request};
use crate::{context::RunContext, workflow::WorkflowEngine};

/// Identifier of the built-in workflow service.
pub const WORKFLOW_SERVICE_ID: &str = "workflow";

/// Request for the `register` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRegisterRequest {
    #[serde(default)]
    pub workflow: Workflow,
}

/// Request for the `load` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowLoadRequest {
    #[serde(default)]
    pub source: Option<WorkflowSource>,
}

/// Service wrapper around a shared [`WorkflowEngine`].
#[derive(Debug, Clone)]
pub struct WorkflowService {
    engine: Arc<WorkflowEngine>,
}

impl WorkflowService {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    async fn run_workflow(&self, context: &mut RunContext, request: WorkflowRunRequest) -> ServiceResponse {
        let name = request.name.clone();
        match self.engine.run(context, request).await {
            Ok(response) => match serde_json::to_value(&response) {
                Ok(value) => ServiceResponse::ok(value),
                Err(error) => ServiceResponse::failed(format!("failed to run workflow: {name}, {error}")),
            },
            Err(error) => ServiceResponse::failed(format!("failed to run workflow: {name}, {error}")),
        }
    }

    fn register_workflow(&self, request: WorkflowRegisterRequest) -> ServiceResponse {
        let name = request.workflow.name.clone();
        match self.engine.register(request.workflow) {
            Ok(workflow) => ServiceResponse::ok(json!({ "name": workflow.name })),
            Err(error) => ServiceResponse::failed(format!("failed to register workflow: {name}, {error}")),
        }
    }

    async fn load_workflow(&self, context: &RunContext, request: WorkflowLoadRequest) -> ServiceResponse {
        let Some(source) = request.source else {
            return ServiceResponse::failed("failed to load workflow: source was not provided");
        };
        match self.engine.load(context, &source).await {
            Ok(workflow) => ServiceResponse::ok(json!({
                "name": workflow.name,
                "tasks": workflow.tasks.len(),
            })),
            Err(error) => ServiceResponse::failed(format!("failed to load workflow: {}, {error}", source.label())),
        }
    }
}

#[async_trait]
impl Service for WorkflowService {
    fn id(&self) -> &str {
        WORKFLOW_SERVICE_ID
    }

    fn new_request(&self, action: &str) -> Result<Box<dyn ServiceRequest>> {
        match action {
            "run" => Ok(Box::new(WorkflowRunRequest::default())),
            "register" => Ok(Box::new(WorkflowRegisterRequest::default())),
            "load" => Ok(Box::new(WorkflowLoadRequest::default())),
            other => bail!("unsupported action '{other}' on service '{WORKFLOW_SERVICE_ID}'"),
        }
    }

    async fn run(&self, context: &mut RunContext, request: Box<dyn ServiceRequest>) -> ServiceResponse {
        debug!(service = WORKFLOW_SERVICE_ID, request = ?request, "workflow service invoked");

        if request.as_any().is::<WorkflowRunRequest>() {
            if let Some(request) = downcast_request::<WorkflowRunRequest>(request) {
                return self.run_workflow(context, request).await;
            }
        } else if request.as_any().is::<WorkflowRegisterRequest>() {
            if let Some(request) = downcast_request::<WorkflowRegisterRequest>(request) {
                return self.register_workflow(request);
            }
        } else if let Some(request) = downcast_request::<WorkflowLoadRequest>(request) {
            return self.load_workflow(context, request).await;
        }

        ServiceResponse::failed("unsupported request type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::{ServiceLocator, ServiceRegistry},
        workflow::{DocumentWorkflowLoader, WorkflowRegistry},
    };
    use runbook_types::{WorkflowAction, WorkflowTask};

    fn engine() -> Arc<WorkflowEngine> {
        Arc::new(WorkflowEngine::new(
            Arc::new(WorkflowRegistry::new()),
            Arc::new(DocumentWorkflowLoader),
        ))
    }

    fn context(service: Arc<WorkflowService>) -> RunContext {
        let registry = ServiceRegistry::new();
        registry.register(service).expect("register service");
        let locator: Arc<dyn ServiceLocator> = Arc::new(registry);
        RunContext::new(locator)
    }

    #[test]
    fn rejects_unknown_action() {
        let service = WorkflowService::new(engine());
        let error = service.new_request("deploy").expect_err("expected unknown action error");
        assert!(error.to_string().contains("deploy"));
    }

    #[tokio::test]
    async fn register_action_registers_workflow() {
        let engine = engine();
        let service = Arc::new(WorkflowService::new(engine.clone()));
        let mut context = context(service.clone());

        let mut request = service.new_request("register").expect("request");
        request
            .assign(&json!({"workflow": {"name": "child", "tasks": [{"name": "noop"}]}}))
            .expect("assign");
        let response = service.run(&mut context, request).await;

        assert!(!response.is_error(), "unexpected error: {}", response.error);
        assert_eq!(response.response, json!({"name": "child"}));
        assert!(engine.lookup("child").is_ok());
    }

    #[tokio::test]
    async fn register_action_reports_invalid_workflow() {
        let service = Arc::new(WorkflowService::new(engine()));
        let mut context = context(service.clone());

        let request = Box::new(WorkflowRegisterRequest {
            workflow: Workflow {
                name: "broken".into(),
                tasks: vec![WorkflowTask {
                    name: "t".into(),
                    actions: vec![WorkflowAction::default()],
                    ..Default::default()
                }],
                ..Default::default()
            },
        });
        let response = service.run(&mut context, request).await;

        assert!(response.is_error());
        assert!(response.error.starts_with("failed to register workflow: broken"));
    }

    #[tokio::test]
    async fn load_action_requires_source() {
        let service = Arc::new(WorkflowService::new(engine()));
        let mut context = context(service.clone());

        let request = service.new_request("load").expect("request");
        let response = service.run(&mut context, request).await;
        assert!(response.error.contains("source was not provided"));
    }

    #[tokio::test]
    async fn run_action_reports_missing_workflow() {
        let service = Arc::new(WorkflowService::new(engine()));
        let mut context = context(service.clone());

        let response = service.run(&mut context, Box::new(WorkflowRunRequest::new("ghost"))).await;
        assert_eq!(response.error, "failed to run workflow: ghost, failed to lookup workflow: ghost");
    }
}
