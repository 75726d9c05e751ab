//! Orchestrator behaviour with instrumented steps

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use vflow_common::{Error, Phase, Result, StepKind, Verdict};
use vflow_e2e::report::StepOutcome;
use vflow_e2e::{
    DefaultStepProvider, InventoryLab, MemorySink, RunEnv, Spec, SpecEnv, SpecRegistry, SpecRequirement, Step,
    StepContext, StepSequence, TestbedBridge, WorkflowDefinition, WorkflowMetadata, WorkflowRunner,
};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct Greeting {
    text: String,
}

impl Spec for Greeting {
    const KIND: &'static str = "Greeting";
}

#[derive(Debug)]
struct Farewell;

impl Spec for Farewell {
    const KIND: &'static str = "Farewell";
}

#[derive(Clone, Copy)]
enum Behaviour {
    Pass,
    Fail,
    FailTransport,
    NeedsFarewell,
}

struct ScriptedStep {
    name: &'static str,
    behaviour: Behaviour,
    log: Log,
}

#[async_trait]
impl Step for ScriptedStep {
    fn kind(&self) -> StepKind {
        StepKind::Other
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        match self.behaviour {
            Behaviour::NeedsFarewell => vec![SpecRequirement::of::<Farewell>()],
            _ => vec![SpecRequirement::of::<Greeting>()],
        }
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let greeting = ctx.spec::<Greeting>()?;
        self.log.lock().push(format!("{}:{}", self.name, greeting.text));
        match self.behaviour {
            Behaviour::Pass | Behaviour::NeedsFarewell => Ok(()),
            Behaviour::Fail => Err(Error::Domain(format!("{} refused", self.name))),
            Behaviour::FailTransport => Err(Error::Transport("connection reset".into())),
        }
    }
}

struct Banner {
    log: Log,
}

impl DefaultStepProvider for Banner {
    fn name(&self) -> &str {
        "banner"
    }

    fn compose_prereq_steps(&self, flow: &mut StepSequence) {
        flow.append_step("open session", scripted("open", Behaviour::Pass, &self.log));
    }

    fn compose_test_steps(&self, flow: &mut StepSequence) {
        flow.append_step("dismiss banner", scripted("banner", Behaviour::Pass, &self.log));
    }
}

fn scripted(name: &'static str, behaviour: Behaviour, log: &Log) -> ScriptedStep {
    ScriptedStep {
        name,
        behaviour,
        log: Arc::clone(log),
    }
}

struct Scripted {
    metadata: WorkflowMetadata,
    defaults: Vec<Arc<dyn DefaultStepProvider>>,
    prereq: Vec<(&'static str, Behaviour)>,
    test: Vec<(&'static str, Behaviour)>,
    testbed_provider: Option<&'static str>,
    log: Log,
}

impl Scripted {
    fn new(prereq: Vec<(&'static str, Behaviour)>, test: Vec<(&'static str, Behaviour)>) -> Self {
        Self {
            metadata: WorkflowMetadata::new("scripted", "Scripted workflow"),
            defaults: Vec::new(),
            prereq,
            test,
            testbed_provider: None,
            log: Log::default(),
        }
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().iter().map(|e| e.split(':').next().unwrap_or_default().to_string()).collect()
    }
}

impl WorkflowDefinition for Scripted {
    fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    fn default_providers(&self) -> &[Arc<dyn DefaultStepProvider>] {
        &self.defaults
    }

    fn init_spec(&self, specs: &mut SpecRegistry, env: &SpecEnv<'_>) -> Result<()> {
        if let Some(provider) = self.testbed_provider {
            env.testbed.request_testbed(provider, true)?;
        }
        specs.add(Arc::new(Greeting { text: "hello".into() }))?;
        Ok(())
    }

    fn compose_prereq_steps(&self, flow: &mut StepSequence) {
        for (name, behaviour) in &self.prereq {
            flow.append_step(*name, scripted(*name, *behaviour, &self.log));
        }
    }

    fn compose_test_steps(&self, flow: &mut StepSequence) {
        for (name, behaviour) in &self.test {
            flow.append_step(*name, scripted(*name, *behaviour, &self.log));
        }
    }
}

async fn run(definition: Arc<Scripted>) -> (vflow_e2e::RunReport, MemorySink) {
    let lab = InventoryLab::default();
    let env = RunEnv::new(Arc::new(TestbedBridge::new()), Arc::new(lab));
    let sink = MemorySink::new();
    let report = WorkflowRunner::new(definition, env).with_sink(sink.clone()).run().await;
    (report, sink)
}

#[tokio::test]
async fn steps_run_in_definition_order() {
    let definition = Arc::new(Scripted::new(
        vec![("p1", Behaviour::Pass), ("p2", Behaviour::Pass)],
        vec![("t1", Behaviour::Pass), ("t2", Behaviour::Pass), ("t3", Behaviour::Pass)],
    ));

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.failure.is_none());
    assert_eq!(definition.entries(), vec!["p1", "p2", "t1", "t2", "t3"]);
    assert_eq!(sink.labels(), vec!["p1", "p2", "t1", "t2", "t3"]);
    assert_eq!(report.labels(), vec!["p1", "p2", "t1", "t2", "t3"]);

    let phases: Vec<Phase> = sink.records().iter().map(|r| r.phase).collect();
    assert_eq!(
        phases,
        vec![Phase::Prerequisite, Phase::Prerequisite, Phase::Test, Phase::Test, Phase::Test]
    );
    assert_eq!(sink.verdict().map(|v| v.verdict), Some(Verdict::Passed));
    assert!(definition.log.lock().iter().all(|e| e.ends_with(":hello")));
}

#[tokio::test]
async fn prerequisite_failure_skips_test_steps() {
    let definition = Arc::new(Scripted::new(
        vec![("p1", Behaviour::Pass), ("p2", Behaviour::Fail)],
        vec![("t1", Behaviour::Pass)],
    ));

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(definition.entries(), vec!["p1", "p2"]);
    assert_eq!(sink.labels(), vec!["p1", "p2"]);

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step.as_deref(), Some("p2"));
    assert_eq!(failure.phase, Phase::Prerequisite);
    assert!(failure.cause.contains("p2 refused"));

    match report.error.as_deref() {
        Some(Error::StepExecution { step, phase, retryable, .. }) => {
            assert_eq!(step, "p2");
            assert_eq!(*phase, Phase::Prerequisite);
            assert!(!retryable);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_halts_remaining_steps() {
    let definition = Arc::new(Scripted::new(
        vec![("p1", Behaviour::Pass)],
        vec![("t1", Behaviour::Pass), ("t2", Behaviour::Fail), ("t3", Behaviour::Pass)],
    ));

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(definition.entries(), vec!["p1", "t1", "t2"]);
    let records = sink.records();
    assert_eq!(records.len(), 3);
    assert!(records[1].outcome.is_passed());
    assert!(matches!(records[2].outcome, StepOutcome::Failed { .. }));
    assert_eq!(report.failure.as_ref().unwrap().phase, Phase::Test);
}

#[tokio::test]
async fn transport_failures_are_marked_retryable() {
    let definition = Arc::new(Scripted::new(vec![], vec![("t1", Behaviour::FailTransport)]));

    let (report, sink) = run(definition).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert_eq!(
        sink.records()[0].outcome,
        StepOutcome::Failed {
            cause: "Transport error: connection reset".to_string(),
            retryable: true,
        }
    );
    assert!(report.error.unwrap().is_retryable());
}

#[tokio::test]
async fn missing_spec_fails_before_any_step() {
    let definition = Arc::new(Scripted::new(
        vec![("p1", Behaviour::Pass)],
        vec![("t1", Behaviour::NeedsFarewell)],
    ));

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert!(definition.entries().is_empty());
    assert!(sink.records().is_empty());

    let verdict = sink.verdict().expect("finalize is called for setup failures");
    let failure = verdict.failure.unwrap();
    assert_eq!(failure.step, None);
    assert_eq!(failure.phase, Phase::Setup);
    assert!(matches!(report.error.as_deref(), Some(Error::SpecNotFound { .. })));
}

#[tokio::test]
async fn unknown_testbed_provider_fails_setup() {
    let mut scripted = Scripted::new(vec![("p1", Behaviour::Pass)], vec![]);
    scripted.testbed_provider = Some("nightly");
    let definition = Arc::new(scripted);

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert_eq!(report.verdict, Verdict::Failed);
    assert!(sink.records().is_empty());
    assert!(matches!(report.error.as_deref(), Some(Error::TestbedResolution { .. })));
    assert_eq!(report.failure.unwrap().phase, Phase::Setup);
}

#[tokio::test]
async fn default_providers_run_first() {
    let mut scripted = Scripted::new(vec![("p1", Behaviour::Pass)], vec![("t1", Behaviour::Pass)]);
    scripted.defaults = vec![Arc::new(Banner {
        log: Arc::clone(&scripted.log),
    })];
    let definition = Arc::new(scripted);

    let (report, sink) = run(Arc::clone(&definition)).await;

    assert!(report.passed());
    assert_eq!(definition.entries(), vec!["open", "p1", "banner", "t1"]);
    assert_eq!(sink.labels(), vec!["open session", "p1", "dismiss banner", "t1"]);
}
