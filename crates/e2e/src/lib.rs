//! vflow workflow engine
//!
//! Declarative end-to-end test workflows for a virtualization management
//! client. A workflow registers typed fixture specs, composes prerequisite
//! and test steps, and is driven to a binary verdict by the orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowRunner                           │
//! │    Init → SpecBuilding → PrereqRunning → TestRunning        │
//! │                                     → Passed | Failed       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WorkflowDefinition + DefaultStepProviders                  │
//! │    ├── init_spec()      -> SpecRegistry (via TestbedBridge) │
//! │    ├── compose_prereq_steps() -> StepSequence               │
//! │    └── compose_test_steps()   -> StepSequence               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Step::execute(&mut StepContext)                            │
//! │    ├── DomainApi   create / invoke / query                  │
//! │    ├── UiDriver    navigate / trigger / read state          │
//! │    └── Localizer   display strings                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ResultSink: record_step() ... finalize(verdict)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod collab;
pub mod config;
pub mod lab;
pub mod poll;
pub mod report;
pub mod runner;
pub mod sequence;
pub mod spec;
pub mod step;
pub mod testbed;
pub mod vsphere;
pub mod workflow;

pub use collab::{Collaborators, DomainApi, Localizer, Location, MessageCatalog, SessionFactory, UiDriver, UiTarget};
pub use config::EngineConfig;
pub use lab::InventoryLab;
pub use poll::{poll_until, PollPolicy};
pub use report::{
    FanoutSink, JsonFileSink, MemorySink, ResultSink, RunReport, RunVerdict, StepOutcome, StepRecord, TracingSink,
};
pub use runner::{RunEnv, RunState, SuiteReport, SuiteRunner, WorkflowRunner};
pub use sequence::StepSequence;
pub use spec::{Spec, SpecRegistry, SpecRequirement};
pub use step::{LocationSpec, NavigationStep, Step, StepContext};
pub use testbed::{PublishedTestbed, TestbedBridge, TestbedHandle, TestbedProvider};
pub use workflow::{DefaultStepProvider, SpecEnv, WorkflowCatalog, WorkflowDefinition, WorkflowMetadata};
