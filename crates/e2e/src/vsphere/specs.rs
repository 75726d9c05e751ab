//! Fixture specs of the virtual machine workflows

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use vflow_common::{Error, PowerState, Result, TaskStatus};

use crate::collab::Location;
use crate::spec::{Spec, SpecRequirement};
use crate::step::LocationSpec;

const MAX_VM_NAME_LEN: usize = 80;

fn require_non_empty(kind: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidSpec {
            kind: kind.to_string(),
            reason: format!("{} must not be empty", field),
        });
    }
    Ok(())
}

/// Management server of a testbed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcSpec {
    pub name: String,
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl Spec for VcSpec {
    const KIND: &'static str = "VcSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)?;
        require_non_empty(Self::KIND, "endpoint", &self.endpoint)?;
        require_non_empty(Self::KIND, "username", &self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterSpec {
    pub name: String,
}

impl Spec for DatacenterSpec {
    const KIND: &'static str = "DatacenterSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
}

impl Spec for HostSpec {
    const KIND: &'static str = "HostSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreSpec {
    pub name: String,
}

impl Spec for DatastoreSpec {
    const KIND: &'static str = "DatastoreSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)
    }
}

/// A virtual machine to create on a host
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub name: String,
    pub host: Arc<HostSpec>,
    pub datastore: Option<Arc<DatastoreSpec>>,
}

impl VmSpec {
    /// A VM with a generated, unique name placed on `host`
    pub fn for_host(host: Arc<HostSpec>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            name: format!("vflow-vm-{}", &suffix[..8]),
            host,
            datastore: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_datastore(mut self, datastore: Arc<DatastoreSpec>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Creation request for the domain API
    pub fn to_request(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "host": self.host.name,
            "datastore": self.datastore.as_ref().map(|d| d.name.clone()),
        })
    }
}

impl Spec for VmSpec {
    const KIND: &'static str = "VmSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)?;
        if self.name.len() > MAX_VM_NAME_LEN {
            return Err(Error::InvalidSpec {
                kind: Self::KIND.to_string(),
                reason: format!("name is longer than {} characters", MAX_VM_NAME_LEN),
            });
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidSpec {
                kind: Self::KIND.to_string(),
                reason: format!("name contains invalid character '{}'", c),
            });
        }
        Ok(())
    }

    fn references(&self) -> Vec<SpecRequirement> {
        let mut refs = vec![SpecRequirement::of::<HostSpec>()];
        if self.datastore.is_some() {
            refs.push(SpecRequirement::of::<DatastoreSpec>());
        }
        refs
    }
}

/// The power state a VM is expected to reach
#[derive(Debug, Clone)]
pub struct VmPowerStateSpec {
    pub vm: Arc<VmSpec>,
    pub power_state: PowerState,
}

impl VmPowerStateSpec {
    pub fn new(vm: Arc<VmSpec>, power_state: PowerState) -> Self {
        Self { vm, power_state }
    }
}

impl Spec for VmPowerStateSpec {
    const KIND: &'static str = "VmPowerStateSpec";

    fn references(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmSpec>()]
    }
}

/// A task expected in the client's task console
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Localized task name as the client displays it
    pub name: String,
    pub status: TaskStatus,
    pub target: Arc<VmSpec>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, status: TaskStatus, target: Arc<VmSpec>) -> Self {
        Self {
            name: name.into(),
            status,
            target,
        }
    }
}

impl Spec for TaskSpec {
    const KIND: &'static str = "TaskSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "name", &self.name)
    }

    fn references(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmSpec>()]
    }
}

/// The summary page of a VM
#[derive(Debug, Clone)]
pub struct VmLocationSpec {
    pub vm: Arc<VmSpec>,
}

impl VmLocationSpec {
    pub fn new(vm: Arc<VmSpec>) -> Self {
        Self { vm }
    }
}

impl Spec for VmLocationSpec {
    const KIND: &'static str = "VmLocationSpec";

    fn references(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<VmSpec>()]
    }
}

impl LocationSpec for VmLocationSpec {
    fn location(&self) -> Location {
        Location::new("vm", &self.vm.name)
    }
}

/// A tab path below a datacenter
#[derive(Debug, Clone)]
pub struct DatacenterLocationSpec {
    pub datacenter: Arc<DatacenterSpec>,
    pub tabs: Vec<String>,
}

impl DatacenterLocationSpec {
    pub fn new<I, S>(datacenter: Arc<DatacenterSpec>, tabs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datacenter,
            tabs: tabs.into_iter().map(Into::into).collect(),
        }
    }
}

impl Spec for DatacenterLocationSpec {
    const KIND: &'static str = "DatacenterLocationSpec";

    fn validate(&self) -> Result<()> {
        if self.tabs.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::InvalidSpec {
                kind: Self::KIND.to_string(),
                reason: "tab ids must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn references(&self) -> Vec<SpecRequirement> {
        vec![SpecRequirement::of::<DatacenterSpec>()]
    }
}

impl LocationSpec for DatacenterLocationSpec {
    fn location(&self) -> Location {
        Location::new("datacenter", &self.datacenter.name).with_tabs(self.tabs.iter().cloned())
    }
}

/// Credentials used to log into the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
}

impl Spec for UserSpec {
    const KIND: &'static str = "UserSpec";

    fn validate(&self) -> Result<()> {
        require_non_empty(Self::KIND, "username", &self.username)
    }
}
