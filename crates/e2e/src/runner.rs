//! Workflow orchestrator and suite runner
//!
//! A [`WorkflowRunner`] drives one definition through
//! `Init → SpecBuilding → PrereqRunning → TestRunning → Passed | Failed`.
//! Steps run strictly in order on the calling task and the first failure
//! ends the run. A [`SuiteRunner`] runs many definitions, each with its own
//! runner and context.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;
use vflow_common::{Error, Phase, Result, Verdict};

use crate::collab::SessionFactory;
use crate::config::EngineConfig;
use crate::poll::PollPolicy;
use crate::report::{
    FailureSummary, FanoutSink, JsonFileSink, ResultSink, RunReport, RunVerdict, StepOutcome, StepRecord, TracingSink,
};
use crate::sequence::StepSequence;
use crate::step::StepContext;
use crate::testbed::TestbedBridge;
use crate::workflow::{build_specs, compose_steps, SpecEnv, WorkflowDefinition};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    SpecBuilding,
    PrereqRunning,
    TestRunning,
    Passed,
    Failed,
}

impl RunState {
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, SpecBuilding)
                | (SpecBuilding, PrereqRunning)
                | (SpecBuilding, Failed)
                | (PrereqRunning, TestRunning)
                | (PrereqRunning, Failed)
                | (TestRunning, Passed)
                | (TestRunning, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Passed | RunState::Failed)
    }

    /// Phase failures in this state are attributed to
    fn phase(&self) -> Phase {
        match self {
            RunState::PrereqRunning => Phase::Prerequisite,
            RunState::TestRunning | RunState::Passed => Phase::Test,
            _ => Phase::Setup,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::SpecBuilding => "spec_building",
            RunState::PrereqRunning => "prereq_running",
            RunState::TestRunning => "test_running",
            RunState::Passed => "passed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a run needs from outside the definition
#[derive(Clone)]
pub struct RunEnv {
    pub testbed: Arc<TestbedBridge>,
    pub sessions: Arc<dyn SessionFactory>,
    pub poll: PollPolicy,
}

impl RunEnv {
    pub fn new(testbed: Arc<TestbedBridge>, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            testbed,
            sessions,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}

struct RunFailure {
    step: Option<String>,
    phase: Phase,
    error: Error,
}

/// Drives a single workflow definition to a verdict
pub struct WorkflowRunner {
    definition: Arc<dyn WorkflowDefinition>,
    env: RunEnv,
    sink: Box<dyn ResultSink>,
    state: RunState,
    run_id: Uuid,
    records: Vec<StepRecord>,
}

impl WorkflowRunner {
    pub fn new(definition: Arc<dyn WorkflowDefinition>, env: RunEnv) -> Self {
        Self {
            definition,
            env,
            sink: Box::new(TracingSink),
            state: RunState::Init,
            run_id: Uuid::new_v4(),
            records: Vec::new(),
        }
    }

    /// Replace the default tracing sink
    pub fn with_sink(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(run = %self.run_id, from = %self.state, to = %next, "Run state change");
        self.state = next;
        Ok(())
    }

    /// Execute the workflow and report the verdict.
    ///
    /// Consumes the runner; a second run needs a new runner.
    pub async fn run(mut self) -> RunReport {
        let started = Instant::now();
        let workflow_id = self.definition.metadata().id.clone();
        info!(run = %self.run_id, workflow = %workflow_id, "Starting workflow");

        let outcome = self.drive().await;

        let failure = match outcome {
            Ok(()) => None,
            Err(failure) => {
                if !self.state.is_terminal() {
                    self.state = RunState::Failed;
                }
                Some(failure)
            }
        };

        let verdict = RunVerdict {
            run_id: self.run_id,
            workflow_id: workflow_id.clone(),
            verdict: if failure.is_none() { Verdict::Passed } else { Verdict::Failed },
            failure: failure.as_ref().map(|f| FailureSummary {
                step: f.step.clone(),
                phase: f.phase,
                cause: f.error.to_string(),
            }),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.sink.finalize(&verdict);
        info!(
            run = %self.run_id,
            workflow = %workflow_id,
            verdict = %verdict.verdict,
            steps = self.records.len(),
            "Workflow finished in {} ms",
            verdict.duration_ms
        );

        RunReport {
            run_id: verdict.run_id,
            workflow_id,
            verdict: verdict.verdict,
            steps: self.records,
            failure: verdict.failure,
            duration_ms: verdict.duration_ms,
            error: failure.map(|f| Arc::new(f.error)),
        }
    }

    async fn drive(&mut self) -> std::result::Result<(), RunFailure> {
        let definition = Arc::clone(&self.definition);

        self.advance(RunState::SpecBuilding).map_err(|e| self.setup_failure(e))?;
        let collaborators = self.env.sessions.open_session();
        let env = SpecEnv {
            testbed: self.env.testbed.as_ref(),
            localizer: collaborators.localizer.as_ref(),
        };
        let specs = build_specs(definition.as_ref(), &env).map_err(|e| self.setup_failure(e))?;
        debug!(run = %self.run_id, specs = ?specs.kinds(), "Specs built");

        let (prereq, test) = compose_steps(definition.as_ref());
        let requirements: Vec<_> = prereq.requirements().into_iter().chain(test.requirements()).collect();
        specs.check(&requirements).map_err(|e| self.setup_failure(e))?;

        let mut ctx = StepContext::new(self.run_id, Arc::new(specs), collaborators, self.env.poll);

        self.advance(RunState::PrereqRunning).map_err(|e| self.setup_failure(e))?;
        self.run_sequence(&prereq, &mut ctx).await?;

        self.advance(RunState::TestRunning).map_err(|e| self.setup_failure(e))?;
        self.run_sequence(&test, &mut ctx).await?;

        self.advance(RunState::Passed).map_err(|e| self.setup_failure(e))?;
        Ok(())
    }

    fn setup_failure(&self, error: Error) -> RunFailure {
        RunFailure {
            step: None,
            phase: self.state.phase(),
            error,
        }
    }

    async fn run_sequence(&mut self, flow: &StepSequence, ctx: &mut StepContext) -> std::result::Result<(), RunFailure> {
        let phase = flow.phase();
        for labeled in flow.iter() {
            debug!(run = %self.run_id, phase = %phase, step = %labeled.label, "Executing step");
            let started_at = Utc::now();
            let started = Instant::now();
            let result = labeled.step.execute(ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (outcome, failure) = match result {
                Ok(()) => (StepOutcome::Passed, None),
                Err(cause) => {
                    let error = Error::step_failed(labeled.label.clone(), phase, cause);
                    let outcome = StepOutcome::Failed {
                        cause: error.root_cause().to_string(),
                        retryable: error.is_retryable(),
                    };
                    (outcome, Some(error))
                }
            };

            let record = StepRecord {
                label: labeled.label.clone(),
                phase,
                kind: labeled.step.kind(),
                outcome,
                started_at,
                duration_ms,
            };
            self.sink.record_step(&record);
            self.records.push(record);

            if let Some(error) = failure {
                return Err(RunFailure {
                    step: Some(labeled.label.clone()),
                    phase,
                    error,
                });
            }
        }
        Ok(())
    }
}

/// Outcome of a suite of runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub runs: Vec<RunReport>,
}

impl SuiteReport {
    /// Write the report to `<dir>/suite-results.json`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("suite-results.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Runs many workflow definitions, each isolated in its own run
pub struct SuiteRunner {
    env: RunEnv,
    max_parallel: usize,
    output_dir: Option<PathBuf>,
}

impl SuiteRunner {
    pub fn new(env: RunEnv) -> Self {
        Self {
            env,
            max_parallel: 1,
            output_dir: None,
        }
    }

    /// Parallelism, poll policy and report directory from `config`
    pub fn from_config(env: RunEnv, config: &EngineConfig) -> Self {
        Self::new(env.with_poll_policy(config.poll_policy()))
            .with_max_parallel(config.suite.max_parallel_runs)
            .with_output_dir(config.report.output_dir.clone())
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Write a JSON report per run plus the suite report into `dir`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub async fn run(&self, definitions: Vec<Arc<dyn WorkflowDefinition>>) -> SuiteReport {
        let started = Instant::now();
        info!("Running {} workflow(s), at most {} at once", definitions.len(), self.max_parallel);

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut handles = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let workflow_id = definition.metadata().id.clone();
            let semaphore = Arc::clone(&semaphore);
            let env = self.env.clone();
            let output_dir = self.output_dir.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut sink = FanoutSink::new().with(TracingSink);
                if let Some(dir) = output_dir {
                    sink = sink.with(JsonFileSink::new(dir));
                }
                WorkflowRunner::new(definition, env).with_sink(sink).run().await
            });
            handles.push((workflow_id, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (workflow_id, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(workflow = %workflow_id, "Run aborted: {}", e);
                    RunReport::aborted(workflow_id, Phase::Setup, Error::Internal(format!("run aborted: {}", e)))
                }
            };
            runs.push(report);
        }

        let passed = runs.iter().filter(|r| r.passed()).count();
        let report = SuiteReport {
            total: runs.len(),
            passed,
            failed: runs.len() - passed,
            duration_ms: started.elapsed().as_millis() as u64,
            runs,
        };

        info!(
            "Suite results: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );

        if let Some(dir) = &self.output_dir {
            if let Err(e) = report.write(dir) {
                error!("Failed to write suite report: {}", e);
            }
        }
        report
    }
}
