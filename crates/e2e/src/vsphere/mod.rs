//! Virtual machine fixtures, steps and workflows
//!
//! Everything here is built on the engine's public contracts only: specs
//! published by [`CommonTestbedProvider`], steps that talk to the domain API
//! and the UI driver, and the [`VmPowerOnTest`] workflow that strings them
//! together.

pub mod specs;
pub mod steps;
pub mod testbed;
pub mod workflows;

pub use specs::{
    DatacenterLocationSpec, DatacenterSpec, DatastoreSpec, HostSpec, TaskSpec, UserSpec, VcSpec, VmLocationSpec,
    VmPowerStateSpec, VmSpec,
};
pub use steps::{
    CreateVmByApiStep, DatacenterNavigationStep, InvokeVmPowerOperationUiStep, LoginStep, VerifyTaskByUiStep,
    VerifyVmPowerStateOnVmsViewStep, VerifyVmPowerStateViaApiStep, VmNavigationStep,
};
pub use testbed::{CommonTestbedProvider, TestbedConfig, VcConfig};
pub use workflows::{builtin_catalog, ClientSessionDefaults, VmPowerOnTest};

/// Navigation ids of the client's tabs
pub mod nav {
    /// "VMs" primary tab of an inventory object
    pub const ENTITY_PRIMARY_TAB_VMS: &str = "entity.primary.vms";
    /// "Virtual Machines" sub tab of a datacenter's VMs tab
    pub const DATACENTER_VMS_TAB_VMS: &str = "datacenter.vms.virtual_machines";
}

/// Ids of the client views steps read from or act on
pub mod views {
    pub const LOGIN: &str = "login";
    pub const INVENTORY: &str = "inventory";
    pub const RECENT_TASKS: &str = "recent-tasks";
    pub const VMS: &str = "vms";
}
