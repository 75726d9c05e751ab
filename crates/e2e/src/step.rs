//! The step contract and the per-run execution context

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;
use vflow_common::{Error, Result, StepKind};

use crate::collab::{Collaborators, DomainApi, Localizer, Location, UiDriver};
use crate::poll::PollPolicy;
use crate::spec::{Spec, SpecRegistry, SpecRequirement};

/// One atomic unit of workflow execution.
///
/// Steps hold no state between runs. Everything they need comes from the
/// [`StepContext`]; anything they produce for later steps goes back into it.
/// A step fails by returning the cause; the runner attaches the label and
/// phase.
#[async_trait]
pub trait Step: Send + Sync {
    fn kind(&self) -> StepKind;

    /// Specs this step reads, checked before the run starts
    fn requires(&self) -> Vec<SpecRequirement> {
        Vec::new()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()>;
}

/// Shared state of a single run
pub struct StepContext {
    run_id: Uuid,
    specs: Arc<SpecRegistry>,
    collaborators: Collaborators,
    poll: PollPolicy,
    resources: HashMap<(TypeId, String), Box<dyn Any + Send + Sync>>,
}

impl StepContext {
    pub fn new(run_id: Uuid, specs: Arc<SpecRegistry>, collaborators: Collaborators, poll: PollPolicy) -> Self {
        Self {
            run_id,
            specs,
            collaborators,
            poll,
            resources: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    pub fn spec<T: Spec>(&self) -> Result<Arc<T>> {
        self.specs.get::<T>()
    }

    pub fn tagged_spec<T: Spec>(&self, tag: &str) -> Result<Arc<T>> {
        self.specs.get_tagged::<T>(tag)
    }

    pub fn api(&self) -> Arc<dyn DomainApi> {
        Arc::clone(&self.collaborators.api)
    }

    pub fn ui(&self) -> Arc<dyn UiDriver> {
        Arc::clone(&self.collaborators.ui)
    }

    pub fn localizer(&self) -> &dyn Localizer {
        self.collaborators.localizer.as_ref()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    /// Store a live resource under a logical key, returning any previous one
    pub fn insert_resource<R: Any + Send + Sync>(&mut self, key: impl Into<String>, resource: R) -> Option<R> {
        let key = key.into();
        debug!(key = %key, "Storing resource in run context");
        self.resources
            .insert((TypeId::of::<R>(), key), Box::new(resource))
            .and_then(|previous| previous.downcast::<R>().ok())
            .map(|previous| *previous)
    }

    /// A resource stored by an earlier step
    pub fn resource<R: Any + Send + Sync>(&self, key: &str) -> Result<&R> {
        self.resources
            .get(&(TypeId::of::<R>(), key.to_string()))
            .and_then(|r| r.downcast_ref::<R>())
            .ok_or_else(|| Error::NotFound {
                kind: std::any::type_name::<R>().to_string(),
                id: key.to_string(),
            })
    }

    pub fn has_resource<R: Any + Send + Sync>(&self, key: &str) -> bool {
        self.resource::<R>(key).is_ok()
    }
}

/// A spec that names a place in the UI
pub trait LocationSpec: Spec {
    fn location(&self) -> Location;
}

/// Drive the UI to the location described by the registered `L` spec
pub struct NavigationStep<L> {
    _location: PhantomData<fn() -> L>,
}

impl<L: LocationSpec> NavigationStep<L> {
    pub fn new() -> Self {
        Self { _location: PhantomData }
    }
}

impl<L: LocationSpec> Default for NavigationStep<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<L: LocationSpec> Step for NavigationStep<L> {
    fn kind(&self) -> StepKind {
        StepKind::Navigation
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<L>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let location = ctx.spec::<L>()?.location();
        info!(location = %location, "Navigating");
        ctx.ui().navigate_to(&location).await
    }
}
