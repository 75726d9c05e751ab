//! Steps of the virtual machine workflows

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use vflow_common::{ResourceHandle, Result, StepKind};

use super::specs::{DatacenterLocationSpec, TaskSpec, UserSpec, VmLocationSpec, VmPowerStateSpec, VmSpec};
use super::views;
use crate::collab::UiTarget;
use crate::poll::poll_until;
use crate::spec::SpecRequirement;
use crate::step::{NavigationStep, Step, StepContext};

pub type VmNavigationStep = NavigationStep<VmLocationSpec>;

pub type DatacenterNavigationStep = NavigationStep<DatacenterLocationSpec>;

/// Create the VM described by the [`VmSpec`] through the domain API.
///
/// The returned handle is stored in the run context under the VM's name.
#[derive(Debug, Default)]
pub struct CreateVmByApiStep;

#[async_trait]
impl Step for CreateVmByApiStep {
    fn kind(&self) -> StepKind {
        StepKind::Creation
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let vm = ctx.spec::<VmSpec>()?;
        let handle = ctx.api().create("vm", vm.to_request()).await?;
        info!(vm = %handle, host = %vm.host.name, "Created VM");
        ctx.insert_resource(vm.name.clone(), handle);
        Ok(())
    }
}

/// Trigger the power operation of the [`VmPowerStateSpec`] from the UI
#[derive(Debug, Default)]
pub struct InvokeVmPowerOperationUiStep;

#[async_trait]
impl Step for InvokeVmPowerOperationUiStep {
    fn kind(&self) -> StepKind {
        StepKind::Invocation
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmPowerStateSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let spec = ctx.spec::<VmPowerStateSpec>()?;
        let target = UiTarget::view(views::INVENTORY).item(&spec.vm.name);
        info!(vm = %spec.vm.name, action = spec.power_state.action(), "Invoking power operation");
        ctx.ui().trigger(spec.power_state.action(), &target).await
    }
}

/// Wait for the [`TaskSpec`] task to show up in the recent tasks view
#[derive(Debug, Default)]
pub struct VerifyTaskByUiStep;

fn task_matches(tasks: &Value, expected: &TaskSpec) -> bool {
    let status = expected.status.to_string();
    tasks.as_array().is_some_and(|tasks| {
        tasks.iter().any(|task| {
            task["name"].as_str() == Some(expected.name.as_str())
                && task["target"].as_str() == Some(expected.target.name.as_str())
                && task["status"].as_str() == Some(status.as_str())
        })
    })
}

#[async_trait]
impl Step for VerifyTaskByUiStep {
    fn kind(&self) -> StepKind {
        StepKind::Verification
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<TaskSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let task = ctx.spec::<TaskSpec>()?;
        let ui = ctx.ui();
        let what = format!("task '{}' on {} is {}", task.name, task.target.name, task.status);
        let target = UiTarget::view(views::RECENT_TASKS);

        poll_until(
            &what,
            ctx.poll_policy(),
            || {
                let ui = ui.clone();
                let target = target.clone();
                async move { ui.read_displayed_state(&target).await }
            },
            |tasks| task_matches(tasks, &task),
        )
        .await?;
        Ok(())
    }
}

/// Wait for the VMs view to show the VM in the expected power state
#[derive(Debug, Default)]
pub struct VerifyVmPowerStateOnVmsViewStep;

#[async_trait]
impl Step for VerifyVmPowerStateOnVmsViewStep {
    fn kind(&self) -> StepKind {
        StepKind::Verification
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmPowerStateSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let spec = ctx.spec::<VmPowerStateSpec>()?;
        let expected = ctx.localizer().message(spec.power_state.display_key());
        let ui = ctx.ui();
        let target = UiTarget::view(views::VMS).item(&spec.vm.name);
        let what = format!("VMs view shows {} as '{}'", spec.vm.name, expected);

        poll_until(
            &what,
            ctx.poll_policy(),
            || {
                let ui = ui.clone();
                let target = target.clone();
                async move { ui.read_displayed_state(&target).await }
            },
            |row: &Value| row["state"].as_str() == Some(expected.as_str()),
        )
        .await?;
        Ok(())
    }
}

/// Wait for the domain API to report the VM in the expected power state
#[derive(Debug, Default)]
pub struct VerifyVmPowerStateViaApiStep;

#[async_trait]
impl Step for VerifyVmPowerStateViaApiStep {
    fn kind(&self) -> StepKind {
        StepKind::Verification
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmPowerStateSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let spec = ctx.spec::<VmPowerStateSpec>()?;
        let handle = ctx.resource::<ResourceHandle>(&spec.vm.name)?.clone();
        let expected = spec.power_state.to_string();
        let api = ctx.api();
        let what = format!("{} reports power state {}", handle, expected);

        poll_until(
            &what,
            ctx.poll_policy(),
            || {
                let api = api.clone();
                let handle = handle.clone();
                async move { api.query(&handle).await }
            },
            |vm: &Value| vm["power_state"].as_str() == Some(expected.as_str()),
        )
        .await?;
        Ok(())
    }
}

/// Log into the client with the [`UserSpec`] credentials
#[derive(Debug, Default)]
pub struct LoginStep;

#[async_trait]
impl Step for LoginStep {
    fn kind(&self) -> StepKind {
        StepKind::Invocation
    }

    fn requires(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<UserSpec>()]
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<()> {
        let user = ctx.spec::<UserSpec>()?;
        info!(user = %user.username, "Logging in");
        ctx.ui()
            .trigger("login", &UiTarget::view(views::LOGIN).item(&user.username))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsphere::specs::HostSpec;
    use serde_json::json;
    use std::sync::Arc;
    use vflow_common::TaskStatus;

    fn task() -> TaskSpec {
        let vm = Arc::new(VmSpec::for_host(Arc::new(HostSpec { name: "esx-01".into() })).with_name("web-01"));
        TaskSpec::new("Power On virtual machine", TaskStatus::Completed, vm)
    }

    #[test]
    fn task_match_needs_name_target_and_status() {
        let expected = task();
        let running = json!([{ "name": "Power On virtual machine", "target": "web-01", "status": "RUNNING" }]);
        let other_vm = json!([{ "name": "Power On virtual machine", "target": "db-01", "status": "COMPLETED" }]);
        let done = json!([
            { "name": "Create virtual machine", "target": "web-01", "status": "COMPLETED" },
            { "name": "Power On virtual machine", "target": "web-01", "status": "COMPLETED" },
        ]);

        assert!(!task_matches(&running, &expected));
        assert!(!task_matches(&other_vm, &expected));
        assert!(!task_matches(&json!({}), &expected));
        assert!(task_matches(&done, &expected));
    }
}
