//! Workflow definitions shipped with the engine

use std::sync::Arc;

use vflow_common::{PowerState, Result, TaskStatus};

use super::nav;
use super::specs::{
    DatacenterLocationSpec, DatacenterSpec, DatastoreSpec, HostSpec, TaskSpec, UserSpec, VcSpec, VmLocationSpec,
    VmPowerStateSpec, VmSpec,
};
use super::steps::{
    CreateVmByApiStep, DatacenterNavigationStep, InvokeVmPowerOperationUiStep, LoginStep, VerifyTaskByUiStep,
    VerifyVmPowerStateOnVmsViewStep, VerifyVmPowerStateViaApiStep, VmNavigationStep,
};
use super::testbed::CommonTestbedProvider;
use crate::sequence::StepSequence;
use crate::spec::{SpecRegistry, SpecRequirement};
use crate::workflow::{DefaultStepProvider, SpecEnv, WorkflowCatalog, WorkflowDefinition, WorkflowMetadata};

/// Opens a client session before any workflow step runs.
///
/// Logs in with the credentials of the registered [`VcSpec`] unless the
/// workflow registered its own [`UserSpec`].
#[derive(Debug, Default)]
pub struct ClientSessionDefaults;

impl DefaultStepProvider for ClientSessionDefaults {
    fn name(&self) -> &str {
        "client-session"
    }

    fn init_spec(&self, specs: &mut SpecRegistry, _env: &SpecEnv<'_>) -> Result<()> {
        if specs.contains(&SpecRequirement::of::<UserSpec>()) {
            return Ok(());
        }
        let vc = specs.get::<VcSpec>()?;
        specs.add(Arc::new(UserSpec {
            username: vc.username.clone(),
            password: vc.password.clone(),
        }))?;
        Ok(())
    }

    fn compose_prereq_steps(&self, flow: &mut StepSequence) {
        flow.append_step("Login as admin user", LoginStep);
    }
}

/// Power on a freshly created VM from the client and verify it through the
/// UI and the API:
///
/// 1. Create a VM through the API (prerequisite)
/// 2. Navigate to the VM
/// 3. Power on the VM
/// 4. Verify via UI that the power on task completes
/// 5. Navigate to the datacenter's VMs view
/// 6. Verify via UI that the VM is powered on
/// 7. Verify via API that the VM is powered on
pub struct VmPowerOnTest {
    metadata: WorkflowMetadata,
    defaults: Vec<Arc<dyn DefaultStepProvider>>,
}

impl VmPowerOnTest {
    pub const ID: &'static str = "vm-power-on";

    /// The workflow without any default providers
    pub fn new() -> Self {
        Self {
            metadata: WorkflowMetadata::new(Self::ID, "Power on a VM").with_tags(["vm", "power", "smoke"]),
            defaults: Vec::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: Vec<Arc<dyn DefaultStepProvider>>) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Default for VmPowerOnTest {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowDefinition for VmPowerOnTest {
    fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    fn default_providers(&self) -> &[Arc<dyn DefaultStepProvider>] {
        &self.defaults
    }

    fn init_spec(&self, specs: &mut SpecRegistry, env: &SpecEnv<'_>) -> Result<()> {
        let testbed = env.testbed.request_testbed(CommonTestbedProvider::ID, true)?;

        let vc = testbed.published_entity_spec::<VcSpec>(CommonTestbedProvider::VC_ENTITY)?;
        let datacenter = testbed.published_entity_spec::<DatacenterSpec>(CommonTestbedProvider::DC_ENTITY)?;
        let host = testbed.published_entity_spec::<HostSpec>(CommonTestbedProvider::CLUSTER_HOST_ENTITY)?;
        let datastore =
            testbed.published_entity_spec::<DatastoreSpec>(CommonTestbedProvider::CLUSTER_HOST_DS_ENTITY)?;

        let vm = Arc::new(VmSpec::for_host(Arc::clone(&host)).with_datastore(Arc::clone(&datastore)));
        let power_state = VmPowerStateSpec::new(Arc::clone(&vm), PowerState::PowerOn);
        let vm_location = VmLocationSpec::new(Arc::clone(&vm));
        let datacenter_location = DatacenterLocationSpec::new(
            Arc::clone(&datacenter),
            [nav::ENTITY_PRIMARY_TAB_VMS, nav::DATACENTER_VMS_TAB_VMS],
        );
        let power_on_task = TaskSpec::new(
            env.localizer.message(PowerState::PowerOn.task_key()),
            TaskStatus::Completed,
            Arc::clone(&vm),
        );

        specs
            .add(vc)?
            .add(datacenter)?
            .add(host)?
            .add(datastore)?
            .add(vm)?
            .add(Arc::new(power_state))?
            .add(Arc::new(vm_location))?
            .add(Arc::new(power_on_task))?
            .add(Arc::new(datacenter_location))?;
        Ok(())
    }

    fn compose_prereq_steps(&self, flow: &mut StepSequence) {
        flow.append_step("Create new test VM through the API", CreateVmByApiStep);
    }

    fn compose_test_steps(&self, flow: &mut StepSequence) {
        flow.append_step("Navigate to VM", VmNavigationStep::new())
            .append_step("Power On VM", InvokeVmPowerOperationUiStep)
            .append_step("Verify Power On VM task via UI", VerifyTaskByUiStep)
            .append_step(
                "Navigate to Datacenter > VMs > Virtual Machines view.",
                DatacenterNavigationStep::new(),
            )
            .append_step("Verify via UI that the VM is powered on", VerifyVmPowerStateOnVmsViewStep)
            .append_step("Verify via API that the VM is powered on", VerifyVmPowerStateViaApiStep);
    }
}

/// Catalog of the built-in workflows with the client session defaults
pub fn builtin_catalog() -> Result<WorkflowCatalog> {
    let session: Arc<dyn DefaultStepProvider> = Arc::new(ClientSessionDefaults);
    let mut catalog = WorkflowCatalog::new();
    catalog.register(Arc::new(VmPowerOnTest::new().with_defaults(vec![session])))?;
    Ok(catalog)
}
