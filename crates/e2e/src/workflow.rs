//! Workflow definitions and the catalog that holds them
//!
//! A definition declares its identity, registers its fixture specs and
//! composes its prerequisite and test steps. Framework-standard behaviour
//! (opening a client session, for example) comes from an ordered list of
//! [`DefaultStepProvider`]s whose steps are composed ahead of the
//! definition's own.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vflow_common::{Error, Phase, Result};

use crate::collab::Localizer;
use crate::sequence::StepSequence;
use crate::spec::SpecRegistry;
use crate::testbed::TestbedBridge;

/// Identity of a workflow, used for selection and reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Stable identifier
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkflowMetadata {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// What spec building may consult
pub struct SpecEnv<'a> {
    pub testbed: &'a TestbedBridge,
    pub localizer: &'a dyn Localizer,
}

/// Reusable specs and steps shared by many workflows
pub trait DefaultStepProvider: Send + Sync {
    fn name(&self) -> &str;

    fn init_spec(&self, _specs: &mut SpecRegistry, _env: &SpecEnv<'_>) -> Result<()> {
        Ok(())
    }

    fn compose_prereq_steps(&self, _flow: &mut StepSequence) {}

    fn compose_test_steps(&self, _flow: &mut StepSequence) {}
}

/// A declarative end-to-end test
pub trait WorkflowDefinition: Send + Sync {
    fn metadata(&self) -> &WorkflowMetadata;

    /// Providers composed ahead of this definition, in order
    fn default_providers(&self) -> &[Arc<dyn DefaultStepProvider>] {
        &[]
    }

    /// Register the fixture specs of the workflow
    fn init_spec(&self, specs: &mut SpecRegistry, env: &SpecEnv<'_>) -> Result<()>;

    fn compose_prereq_steps(&self, _flow: &mut StepSequence) {}

    fn compose_test_steps(&self, flow: &mut StepSequence);
}

/// Build the complete spec set of `definition`.
///
/// The definition registers first, then each default provider; providers
/// may read what the definition registered.
pub fn build_specs(definition: &dyn WorkflowDefinition, env: &SpecEnv<'_>) -> Result<SpecRegistry> {
    let mut specs = SpecRegistry::new();
    definition.init_spec(&mut specs, env)?;
    for provider in definition.default_providers() {
        provider.init_spec(&mut specs, env)?;
    }
    Ok(specs)
}

/// Compose the prerequisite and test sequences of `definition`, default
/// providers first
pub fn compose_steps(definition: &dyn WorkflowDefinition) -> (StepSequence, StepSequence) {
    let mut prereq = StepSequence::new(Phase::Prerequisite);
    let mut test = StepSequence::new(Phase::Test);

    for provider in definition.default_providers() {
        provider.compose_prereq_steps(&mut prereq);
    }
    definition.compose_prereq_steps(&mut prereq);

    for provider in definition.default_providers() {
        provider.compose_test_steps(&mut test);
    }
    definition.compose_test_steps(&mut test);

    (prereq, test)
}

/// Registered workflow definitions, in registration order
#[derive(Default, Clone)]
pub struct WorkflowCatalog {
    workflows: Vec<Arc<dyn WorkflowDefinition>>,
    index: HashMap<String, usize>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: Arc<dyn WorkflowDefinition>) -> Result<()> {
        let id = definition.metadata().id.clone();
        if self.index.contains_key(&id) {
            return Err(Error::AlreadyExists {
                kind: "workflow".to_string(),
                id,
            });
        }
        self.index.insert(id, self.workflows.len());
        self.workflows.push(definition);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn WorkflowDefinition>> {
        self.index.get(id).map(|&i| Arc::clone(&self.workflows[i]))
    }

    pub fn tagged(&self, tag: &str) -> Vec<Arc<dyn WorkflowDefinition>> {
        self.workflows
            .iter()
            .filter(|w| w.metadata().has_tag(tag))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn WorkflowDefinition>> {
        self.workflows.clone()
    }

    pub fn metadata(&self) -> Vec<WorkflowMetadata> {
        self.workflows.iter().map(|w| w.metadata().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Step, StepContext};
    use async_trait::async_trait;
    use vflow_common::StepKind;

    struct Noop;

    #[async_trait]
    impl Step for Noop {
        fn kind(&self) -> StepKind {
            StepKind::Other
        }

        async fn execute(&self, _ctx: &mut StepContext) -> Result<()> {
            Ok(())
        }
    }

    struct Session;

    impl DefaultStepProvider for Session {
        fn name(&self) -> &str {
            "session"
        }

        fn compose_prereq_steps(&self, flow: &mut StepSequence) {
            flow.append_step("Open browser", Noop);
            flow.append_step("Login", Noop);
        }

        fn compose_test_steps(&self, flow: &mut StepSequence) {
            flow.append_step("Dismiss banner", Noop);
        }
    }

    struct Smoke {
        metadata: WorkflowMetadata,
        defaults: Vec<Arc<dyn DefaultStepProvider>>,
    }

    impl Smoke {
        fn new(id: &str, tags: &[&str]) -> Self {
            Self {
                metadata: WorkflowMetadata::new(id, "Smoke").with_tags(tags.iter().copied()),
                defaults: vec![Arc::new(Session)],
            }
        }
    }

    impl WorkflowDefinition for Smoke {
        fn metadata(&self) -> &WorkflowMetadata {
            &self.metadata
        }

        fn default_providers(&self) -> &[Arc<dyn DefaultStepProvider>] {
            &self.defaults
        }

        fn init_spec(&self, _specs: &mut SpecRegistry, _env: &SpecEnv<'_>) -> Result<()> {
            Ok(())
        }

        fn compose_prereq_steps(&self, flow: &mut StepSequence) {
            flow.append_step("Create VM", Noop);
        }

        fn compose_test_steps(&self, flow: &mut StepSequence) {
            flow.append_step("Power on", Noop);
        }
    }

    #[test]
    fn default_providers_compose_first() {
        let (prereq, test) = compose_steps(&Smoke::new("smoke", &[]));
        assert_eq!(prereq.labels(), vec!["Open browser", "Login", "Create VM"]);
        assert_eq!(test.labels(), vec!["Dismiss banner", "Power on"]);
        assert_eq!(prereq.phase(), Phase::Prerequisite);
        assert_eq!(test.phase(), Phase::Test);
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        let mut catalog = WorkflowCatalog::new();
        catalog.register(Arc::new(Smoke::new("smoke", &[]))).unwrap();
        let err = catalog.register(Arc::new(Smoke::new("smoke", &[]))).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn catalog_filters_by_tag() {
        let mut catalog = WorkflowCatalog::new();
        catalog.register(Arc::new(Smoke::new("a", &["vm", "smoke"]))).unwrap();
        catalog.register(Arc::new(Smoke::new("b", &["host"]))).unwrap();
        catalog.register(Arc::new(Smoke::new("c", &["vm"]))).unwrap();

        let ids: Vec<String> = catalog.tagged("vm").iter().map(|w| w.metadata().id.clone()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(catalog.get("b").is_some());
        assert!(catalog.get("z").is_none());
    }
}
