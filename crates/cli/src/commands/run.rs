//! Workflow execution against the in-memory lab

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;
use vflow_e2e::vsphere::{builtin_catalog, CommonTestbedProvider};
use vflow_e2e::{
    InventoryLab, MessageCatalog, RunEnv, RunReport, SuiteReport, SuiteRunner, TestbedBridge, WorkflowCatalog,
    WorkflowDefinition,
};

use super::Settings;
use crate::output::{print_error, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workflow to run; repeat to run several. Runs everything when omitted.
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Run every workflow carrying this tag
    #[arg(long, conflicts_with = "ids")]
    pub tag: Option<String>,

    /// Directory for JSON reports
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Workflows to run at the same time
    #[arg(long)]
    pub parallel: Option<usize>,
}

#[derive(Serialize)]
pub struct RunRow {
    pub workflow: String,
    pub verdict: String,
    pub steps: usize,
    pub failed_step: Option<String>,
    pub cause: Option<String>,
    pub duration_ms: u64,
}

impl From<&RunReport> for RunRow {
    fn from(report: &RunReport) -> Self {
        Self {
            workflow: report.workflow_id.clone(),
            verdict: report.verdict.to_string(),
            steps: report.steps.len(),
            failed_step: report.failure.as_ref().and_then(|f| f.step.clone()),
            cause: report.failure.as_ref().map(|f| f.cause.clone()),
            duration_ms: report.duration_ms,
        }
    }
}

impl TableDisplay for RunRow {
    fn headers() -> Vec<&'static str> {
        vec!["Workflow", "Verdict", "Steps", "Failed Step", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.workflow.clone(),
            self.verdict.clone(),
            self.steps.to_string(),
            self.failed_step.clone().unwrap_or_else(|| "-".to_string()),
            format!("{} ms", self.duration_ms),
        ]
    }
}

/// Pick the workflows named by `args` from `catalog`
pub fn select(catalog: &WorkflowCatalog, args: &RunArgs) -> Result<Vec<Arc<dyn WorkflowDefinition>>> {
    if !args.ids.is_empty() {
        return args
            .ids
            .iter()
            .map(|id| match catalog.get(id) {
                Some(definition) => Ok(definition),
                None => bail!("unknown workflow '{}'", id),
            })
            .collect();
    }
    Ok(match &args.tag {
        Some(tag) => catalog.tagged(tag),
        None => catalog.all(),
    })
}

/// Run the selected workflows; the report tells whether all of them passed
pub async fn execute(args: RunArgs, settings: Settings, format: OutputFormat) -> Result<SuiteReport> {
    let catalog = builtin_catalog()?;
    let definitions = select(&catalog, &args)?;
    if definitions.is_empty() {
        print_warning("No workflows selected.");
    }

    let mut engine = settings.engine;
    if let Some(output) = args.output {
        engine.report.output_dir = output;
    }
    if let Some(parallel) = args.parallel {
        engine.suite.max_parallel_runs = parallel;
    }
    engine.validate()?;

    let lab = InventoryLab::from_testbed(&settings.testbed, Arc::new(MessageCatalog::default()));
    let bridge = TestbedBridge::new().with_provider(Arc::new(CommonTestbedProvider::new(settings.testbed)));
    debug!(testbed = %settings.testbed_path.display(), "Using testbed description");

    let env = RunEnv::new(Arc::new(bridge), Arc::new(lab));
    let report = SuiteRunner::from_config(env, &engine).run(definitions).await;

    let rows: Vec<RunRow> = report.runs.iter().map(RunRow::from).collect();
    if !rows.is_empty() {
        print_list(&rows, format);
    }
    for row in rows.iter().filter(|r| r.cause.is_some()) {
        print_error(&format!(
            "{}: {}",
            row.workflow,
            row.cause.as_deref().unwrap_or_default()
        ));
    }
    if report.failed == 0 {
        print_success(&format!("{} workflow(s) passed", report.passed));
    } else {
        print_error(&format!("{} of {} workflow(s) failed", report.failed, report.total));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ids: &[&str], tag: Option<&str>) -> RunArgs {
        RunArgs {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            tag: tag.map(str::to_string),
            output: None,
            parallel: None,
        }
    }

    #[test]
    fn selects_by_id_tag_or_everything() {
        let catalog = builtin_catalog().unwrap();
        assert_eq!(select(&catalog, &args(&["vm-power-on"], None)).unwrap().len(), 1);
        assert_eq!(select(&catalog, &args(&[], Some("smoke"))).unwrap().len(), 1);
        assert!(select(&catalog, &args(&[], Some("network"))).unwrap().is_empty());
        assert_eq!(select(&catalog, &args(&[], None)).unwrap().len(), catalog.len());
    }

    #[test]
    fn unknown_id_is_an_error() {
        let catalog = builtin_catalog().unwrap();
        match select(&catalog, &args(&["vm-power-on", "vm-reboot"], None)) {
            Err(err) => assert!(err.to_string().contains("vm-reboot")),
            Ok(selected) => panic!("selected {} workflow(s) for an unknown id", selected.len()),
        }
    }

    #[tokio::test]
    async fn runs_power_on_and_writes_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings::load(dir.path().join("vflow.toml"), None).unwrap();
        let mut run = args(&["vm-power-on"], None);
        run.output = Some(dir.path().join("reports"));

        let report = execute(run, settings, OutputFormat::Plain).await.unwrap();
        assert_eq!(report.passed, 1);
        assert!(dir.path().join("reports").join("suite-results.json").exists());
    }
}
