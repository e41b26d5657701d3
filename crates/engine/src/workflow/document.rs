//! Workflow document loading.
//!
//! Documents are YAML (JSON is accepted as the YAML subset) describing a single
//! workflow. The [`WorkflowLoader`] trait is the seam the engine loads through;
//! [`DocumentWorkflowLoader`] reads files or inline text.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use runbook_types::{Workflow, WorkflowSource};
use runbook_util::render_text;
use serde_json::Value;
use tracing::debug;

use crate::context::RunContext;

/// Produces a workflow definition from a source descriptor.
#[async_trait]
pub trait WorkflowLoader: Send + Sync {
    async fn load(&self, context: &RunContext, source: &WorkflowSource) -> Result<Workflow>;
}

/// Loader for YAML/JSON workflow documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentWorkflowLoader;

#[async_trait]
impl WorkflowLoader for DocumentWorkflowLoader {
    async fn load(&self, context: &RunContext, source: &WorkflowSource) -> Result<Workflow> {
        match source {
            WorkflowSource::File { path } => {
                let expanded = context.expand(&Value::String(path.display().to_string()));
                let path = PathBuf::from(render_text(&expanded));
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
                debug!(path = %path.display(), bytes = content.len(), "workflow document read");
                parse_workflow_document(&content).with_context(|| format!("failed to parse workflow file: {}", path.display()))
            }
            WorkflowSource::Inline { content } => parse_workflow_document(content),
        }
    }
}

/// Parses a single-workflow YAML or JSON document.
pub fn parse_workflow_document(content: &str) -> Result<Workflow> {
    if content.trim().is_empty() {
        bail!("workflow document is empty");
    }
    let workflow: Workflow = serde_yaml::from_str(content).context("unsupported workflow document format")?;
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceRegistry;
    use std::{fs, sync::Arc};

    const DOCUMENT: &str = r#"
name: deploy
tasks:
  - name: build
    actions:
      - service: exec
        action: run
"#;

    fn context() -> RunContext {
        RunContext::new(Arc::new(ServiceRegistry::new()))
    }

    #[test]
    fn parses_yaml_and_json_documents() {
        let from_yaml = parse_workflow_document(DOCUMENT).expect("parse yaml");
        let from_json = parse_workflow_document(r#"{"name": "deploy", "tasks": [{"name": "build", "actions": [{"service": "exec", "action": "run"}]}]}"#)
            .expect("parse json");

        assert_eq!(from_yaml, from_json);
        assert_eq!(from_yaml.tasks[0].actions[0].service, "exec");
    }

    #[test]
    fn rejects_empty_and_malformed_documents() {
        assert!(parse_workflow_document("   ").is_err());
        assert!(parse_workflow_document("tasks: 12").is_err());
    }

    #[tokio::test]
    async fn loads_file_with_expanded_path() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let workflow_path = temp_dir.path().join("deploy.yaml");
        fs::write(&workflow_path, DOCUMENT).expect("write workflow");

        let mut context = context();
        context.state_mut().put("dir", temp_dir.path().display().to_string());

        let workflow = DocumentWorkflowLoader
            .load(&context, &WorkflowSource::file("$dir/deploy.yaml"))
            .await
            .expect("load workflow");

        assert_eq!(workflow.name, "deploy");
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let error = DocumentWorkflowLoader
            .load(&context(), &WorkflowSource::file("/nonexistent/flow.yaml"))
            .await
            .expect_err("expected read error");

        assert!(format!("{error:#}").contains("/nonexistent/flow.yaml"));
    }
}
