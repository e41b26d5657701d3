use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use runbook_engine::{
    Criteria, DocumentWorkflowLoader, RunContext, ServiceLocator, ServiceRegistry, State, WorkflowEngine, WorkflowRegistry,
    WorkflowService, parse_workflow_document,
};
use runbook_types::{DataMap, WorkflowRunRequest, WorkflowSource};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Load, validate and run declarative workflows.
#[derive(Parser, Debug)]
#[command(name = "runbook", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a workflow document and run it
    Run {
        /// Path to the workflow YAML/JSON document
        file: PathBuf,

        /// Name of the workflow to run; defaults to the document's workflow
        #[arg(long)]
        workflow: Option<String>,

        /// Run parameter; values that parse as JSON are stored typed
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Limit the run to a task and, optionally, a comma-separated list of action indexes
        #[arg(long = "tasks", value_name = "TASK=INDEXES")]
        tasks: Vec<String>,
    },
    /// Check that a workflow document parses and is well formed
    Validate {
        /// Path to the workflow YAML/JSON document
        file: PathBuf,
    },
    /// Evaluate a criteria expression such as `$status = ok && $count > 3`
    Eval {
        expression: String,

        /// JSON object used as the state
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Run {
            file,
            workflow,
            params,
            tasks,
        } => run_workflow(file, workflow, &params, &tasks).await,
        Command::Validate { file } => validate_workflow(file).await,
        Command::Eval { expression, state } => eval_criteria(&expression, state).await,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn log_filter() -> EnvFilter {
    log_filter_from(std::env::var("RUST_LOG").ok())
}

/// Builds the log filter from a `RUST_LOG` directive, `info` when unset or invalid.
fn log_filter_from(directive: Option<String>) -> EnvFilter {
    directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn run_workflow(file: PathBuf, workflow: Option<String>, params: &[String], tasks: &[String]) -> Result<()> {
    let engine = Arc::new(WorkflowEngine::new(
        Arc::new(WorkflowRegistry::new()),
        Arc::new(DocumentWorkflowLoader),
    ));
    let services = ServiceRegistry::new();
    services.register(Arc::new(WorkflowService::new(engine.clone())))?;
    let locator: Arc<dyn ServiceLocator> = Arc::new(services);
    let mut context = RunContext::new(locator);

    let loaded = engine.load(&context, &WorkflowSource::file(file)).await?;
    let mut request = WorkflowRunRequest::new(workflow.unwrap_or_else(|| loaded.name.clone()));
    for param in params {
        let (key, value) = split_assignment(param)?;
        request = request.with_param(key, parse_param_value(value));
    }
    for task in tasks {
        let (name, indexes) = match task.split_once('=') {
            Some((name, indexes)) => (name.trim(), indexes.trim()),
            None => (task.trim(), ""),
        };
        request = request.with_task(name, indexes);
    }

    let cancellation = context.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancellation.cancel();
        }
    });

    match engine.run(&mut context, request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(error) => {
            if let Some(partial) = error.partial_response() {
                println!("{}", serde_json::to_string_pretty(partial)?);
            }
            Err(error.into())
        }
    }
}

async fn validate_workflow(file: PathBuf) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read workflow file: {}", file.display()))?;
    let workflow = parse_workflow_document(&content)?;
    workflow
        .validate()
        .with_context(|| format!("workflow '{}' is invalid", workflow.name))?;
    info!(workflow = %workflow.name, task_count = workflow.tasks.len(), "workflow is valid");
    println!("{}: ok ({} tasks)", workflow.name, workflow.tasks.len());
    Ok(())
}

async fn eval_criteria(expression: &str, state_file: Option<PathBuf>) -> Result<()> {
    let state = match state_file {
        Some(path) => {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read state file: {}", path.display()))?;
            let values: DataMap = serde_json::from_str(&content).context("state file must hold a JSON object")?;
            State::from(values)
        }
        None => State::new(),
    };
    let criteria: Criteria = expression.parse()?;
    println!("{}", criteria.is_true(&state)?);
    Ok(())
}

fn split_assignment(text: &str) -> Result<(&str, &str)> {
    let Some((key, value)) = text.split_once('=') else {
        bail!("expected KEY=VALUE but got '{text}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("parameter name cannot be empty in '{text}'");
    }
    Ok((key, value))
}

fn parse_param_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_assignment_keeps_value_verbatim() {
        assert_eq!(split_assignment("app= demo=1").unwrap(), ("app", " demo=1"));
        assert!(split_assignment("app").is_err());
        assert!(split_assignment(" =x").is_err());
    }

    #[test]
    fn param_values_are_typed_when_json() {
        assert_eq!(parse_param_value("3"), json!(3));
        assert_eq!(parse_param_value("true"), json!(true));
        assert_eq!(parse_param_value(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_param_value("prod"), json!("prod"));
        assert_eq!(parse_param_value("$region"), json!("$region"));
    }

    #[test]
    fn log_filter_defaults_to_info_and_honours_debug_directives() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(log_filter_from(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter_from(Some("debug".into())).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter_from(Some("runbook_engine=debug".into())).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn cli_parses_repeated_flags() {
        let cli = Cli::try_parse_from([
            "runbook",
            "run",
            "deploy.yaml",
            "--param",
            "app=demo",
            "--param",
            "replicas=2",
            "--tasks",
            "build=0,1",
        ])
        .expect("parse cli");
        let Command::Run { params, tasks, .. } = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(params, vec!["app=demo", "replicas=2"]);
        assert_eq!(tasks, vec!["build=0,1"]);
    }
}
