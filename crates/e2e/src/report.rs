//! Run results and the sinks that receive them

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;
use vflow_common::{Error, Phase, Result, StepKind, Verdict};

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed { cause: String, retryable: bool },
}

impl StepOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, StepOutcome::Passed)
    }
}

/// One executed step as seen by a sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub label: String,
    pub phase: Phase,
    pub kind: StepKind,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Where a failed run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Label of the failing step, absent when the run failed before any step
    pub step: Option<String>,
    pub phase: Phase,
    pub cause: String,
}

/// Final verdict of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunVerdict {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub verdict: Verdict,
    pub failure: Option<FailureSummary>,
    pub duration_ms: u64,
}

/// Receives the outcome of each executed step and the final verdict.
///
/// A sink sees zero or more `record_step` calls followed by exactly one
/// `finalize`.
pub trait ResultSink: Send {
    fn record_step(&mut self, record: &StepRecord);

    fn finalize(&mut self, verdict: &RunVerdict);
}

/// Full report of a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub verdict: Verdict,
    pub steps: Vec<StepRecord>,
    pub failure: Option<FailureSummary>,
    pub duration_ms: u64,
    /// Typed cause of the failure, not serialized
    #[serde(skip)]
    pub error: Option<Arc<Error>>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    /// Report of a run that could not be driven at all
    pub fn aborted(workflow_id: impl Into<String>, phase: Phase, error: Error) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            verdict: Verdict::Failed,
            steps: Vec::new(),
            failure: Some(FailureSummary {
                step: None,
                phase,
                cause: error.to_string(),
            }),
            duration_ms: 0,
            error: Some(Arc::new(error)),
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }

    /// `<workflow-id>-<run-id>.json`; runs of the same workflow never share a file
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.workflow_id, self.run_id)
    }

    /// Write the report to `<dir>/<workflow-id>-<run-id>.json`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[derive(Default)]
struct MemoryState {
    records: Vec<StepRecord>,
    verdict: Option<RunVerdict>,
}

/// Keeps everything it receives; clones share the same storage
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StepRecord> {
        self.state.lock().records.clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.state.lock().records.iter().map(|r| r.label.clone()).collect()
    }

    pub fn verdict(&self) -> Option<RunVerdict> {
        self.state.lock().verdict.clone()
    }
}

impl ResultSink for MemorySink {
    fn record_step(&mut self, record: &StepRecord) {
        self.state.lock().records.push(record.clone());
    }

    fn finalize(&mut self, verdict: &RunVerdict) {
        self.state.lock().verdict = Some(verdict.clone());
    }
}

/// Emits one log line per step and per verdict
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn record_step(&mut self, record: &StepRecord) {
        match &record.outcome {
            StepOutcome::Passed => {
                info!("✓ [{}] {} ({} ms)", record.phase, record.label, record.duration_ms)
            }
            StepOutcome::Failed { cause, .. } => {
                error!("✗ [{}] {} - {}", record.phase, record.label, cause)
            }
        }
    }

    fn finalize(&mut self, verdict: &RunVerdict) {
        match &verdict.failure {
            None => info!(run = %verdict.run_id, "{} PASSED ({} ms)", verdict.workflow_id, verdict.duration_ms),
            Some(failure) => error!(
                run = %verdict.run_id,
                "{} FAILED in {} at {}: {}",
                verdict.workflow_id,
                failure.phase,
                failure.step.as_deref().unwrap_or("<before first step>"),
                failure.cause
            ),
        }
    }
}

/// Writes a JSON report per run at finalize
pub struct JsonFileSink {
    output_dir: PathBuf,
    steps: Vec<StepRecord>,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            steps: Vec::new(),
        }
    }
}

impl ResultSink for JsonFileSink {
    fn record_step(&mut self, record: &StepRecord) {
        self.steps.push(record.clone());
    }

    fn finalize(&mut self, verdict: &RunVerdict) {
        let report = RunReport {
            run_id: verdict.run_id,
            workflow_id: verdict.workflow_id.clone(),
            verdict: verdict.verdict,
            steps: std::mem::take(&mut self.steps),
            failure: verdict.failure.clone(),
            duration_ms: verdict.duration_ms,
            error: None,
        };
        match report.write(&self.output_dir) {
            Ok(path) => info!("Results written to: {}", path.display()),
            Err(e) => error!(workflow = %verdict.workflow_id, "Failed to write run report: {}", e),
        }
    }
}

/// Forwards everything to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for FanoutSink {
    fn record_step(&mut self, record: &StepRecord) {
        for sink in &mut self.sinks {
            sink.record_step(record);
        }
    }

    fn finalize(&mut self, verdict: &RunVerdict) {
        for sink in &mut self.sinks {
            sink.finalize(verdict);
        }
    }
}
