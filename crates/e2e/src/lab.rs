//! In-memory inventory lab
//!
//! Stands in for the management endpoint and the web client so workflows can
//! run without a real testbed or browser. The inventory is shared; each
//! session opened on the lab gets its own UI state (current location and
//! logged-in user), like a separate browser would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use vflow_common::{Error, PowerState, ResourceHandle, Result, TaskStatus};

use crate::collab::{Collaborators, DomainApi, Localizer, Location, MessageCatalog, SessionFactory, UiDriver, UiTarget};
use crate::vsphere::{views, TestbedConfig};

/// A VM known to the lab
#[derive(Debug, Clone, Serialize)]
pub struct LabVm {
    pub id: String,
    pub name: String,
    pub host: String,
    pub datastore: Option<String>,
    pub power_state: PowerState,
}

/// An entry of the lab's task console
#[derive(Debug, Clone, Serialize)]
pub struct LabTask {
    pub name: String,
    pub target: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inventory {
    datacenters: BTreeSet<String>,
    hosts: BTreeSet<String>,
    vms: BTreeMap<String, LabVm>,
    tasks: Vec<LabTask>,
    next_vm_id: u64,
}

impl Inventory {
    fn vm_by_id(&self, id: &str) -> Result<&LabVm> {
        self.vms
            .values()
            .find(|vm| vm.id == id)
            .ok_or_else(|| Error::Domain(format!("no VM with id '{}'", id)))
    }

    fn vm_by_id_mut(&mut self, id: &str) -> Result<&mut LabVm> {
        self.vms
            .values_mut()
            .find(|vm| vm.id == id)
            .ok_or_else(|| Error::Domain(format!("no VM with id '{}'", id)))
    }

    fn record_task(&mut self, name: String, target: &str) {
        debug!(task = %name, target, "Task completed");
        self.tasks.push(LabTask {
            name,
            target: target.to_string(),
            status: TaskStatus::Completed,
            started_at: Utc::now(),
        });
    }
}

/// A shared in-memory inventory with domain API and UI access
#[derive(Clone)]
pub struct InventoryLab {
    inventory: Arc<RwLock<Inventory>>,
    localizer: Arc<dyn Localizer>,
}

impl Default for InventoryLab {
    fn default() -> Self {
        Self::new(Arc::new(MessageCatalog::default()))
    }
}

impl InventoryLab {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self {
            inventory: Arc::new(RwLock::new(Inventory::default())),
            localizer,
        }
    }

    /// A lab holding the datacenter and host of `testbed`
    pub fn from_testbed(testbed: &TestbedConfig, localizer: Arc<dyn Localizer>) -> Self {
        let lab = Self::new(localizer);
        lab.add_datacenter(&testbed.datacenter);
        lab.add_host(&testbed.cluster_host);
        lab
    }

    pub fn add_datacenter(&self, name: &str) {
        self.inventory.write().datacenters.insert(name.to_string());
    }

    pub fn add_host(&self, name: &str) {
        self.inventory.write().hosts.insert(name.to_string());
    }

    pub fn api(&self) -> Arc<LabApi> {
        Arc::new(LabApi { lab: self.clone() })
    }

    /// UI of a new session
    pub fn ui(&self) -> Arc<LabUi> {
        Arc::new(LabUi {
            lab: self.clone(),
            session: Mutex::new(UiSession::default()),
        })
    }

    /// Collaborators of a new session
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.api(), self.ui(), Arc::clone(&self.localizer))
    }

    pub fn vm(&self, name: &str) -> Option<LabVm> {
        self.inventory.read().vms.get(name).cloned()
    }

    pub fn vms(&self) -> Vec<LabVm> {
        self.inventory.read().vms.values().cloned().collect()
    }

    pub fn tasks(&self) -> Vec<LabTask> {
        self.inventory.read().tasks.clone()
    }

    fn set_power_state(&self, vm: &mut LabVm, state: PowerState) -> String {
        vm.power_state = state;
        self.localizer.message(state.task_key())
    }
}

impl SessionFactory for InventoryLab {
    fn open_session(&self) -> Collaborators {
        self.collaborators()
    }
}

/// Domain API backed by the lab
pub struct LabApi {
    lab: InventoryLab,
}

#[async_trait]
impl DomainApi for LabApi {
    async fn create(&self, kind: &str, request: Value) -> Result<ResourceHandle> {
        if kind != "vm" {
            return Err(Error::Domain(format!("cannot create resources of kind '{}'", kind)));
        }
        let name = request["name"]
            .as_str()
            .ok_or_else(|| Error::Domain("VM request without a name".to_string()))?
            .to_string();
        let host = request["host"]
            .as_str()
            .ok_or_else(|| Error::Domain("VM request without a host".to_string()))?
            .to_string();
        let datastore = request["datastore"].as_str().map(str::to_string);

        let mut inventory = self.lab.inventory.write();
        if !inventory.hosts.contains(&host) {
            return Err(Error::Domain(format!("no host named '{}'", host)));
        }
        if inventory.vms.contains_key(&name) {
            return Err(Error::Domain(format!("a VM named '{}' already exists", name)));
        }

        inventory.next_vm_id += 1;
        let vm = LabVm {
            id: format!("vm-{}", inventory.next_vm_id),
            name: name.clone(),
            host,
            datastore,
            power_state: PowerState::PowerOff,
        };
        let handle = ResourceHandle::new("vm", &vm.id, &vm.name);
        inventory.vms.insert(name.clone(), vm);
        inventory.record_task(self.lab.localizer.message("vm.task.create"), &name);
        info!(vm = %handle, "Lab created VM");
        Ok(handle)
    }

    async fn invoke(&self, action: &str, target: &ResourceHandle) -> Result<()> {
        let state = PowerState::from_action(action)
            .ok_or_else(|| Error::Domain(format!("unsupported action '{}'", action)))?;
        let mut inventory = self.lab.inventory.write();
        let vm = inventory.vm_by_id_mut(&target.id)?;
        let task = self.lab.set_power_state(vm, state);
        let name = vm.name.clone();
        inventory.record_task(task, &name);
        Ok(())
    }

    async fn query(&self, target: &ResourceHandle) -> Result<Value> {
        let inventory = self.lab.inventory.read();
        Ok(serde_json::to_value(inventory.vm_by_id(&target.id)?)?)
    }
}

#[derive(Default)]
struct UiSession {
    location: Option<Location>,
    user: Option<String>,
}

/// One browser session on the lab
pub struct LabUi {
    lab: InventoryLab,
    session: Mutex<UiSession>,
}

impl LabUi {
    pub fn current_location(&self) -> Option<Location> {
        self.session.lock().location.clone()
    }

    pub fn user(&self) -> Option<String> {
        self.session.lock().user.clone()
    }

    fn require_login(&self, what: &str) -> Result<()> {
        if self.session.lock().user.is_none() {
            return Err(Error::Ui(format!("cannot {} before logging in", what)));
        }
        Ok(())
    }

    fn vms_row(&self, vm: &LabVm) -> Value {
        json!({
            "name": vm.name,
            "state": self.lab.localizer.message(vm.power_state.display_key()),
        })
    }
}

#[async_trait]
impl UiDriver for LabUi {
    async fn navigate_to(&self, location: &Location) -> Result<()> {
        self.require_login(&format!("navigate to {}", location))?;
        {
            let inventory = self.lab.inventory.read();
            let known = match location.entity_kind.as_str() {
                "vm" => inventory.vms.contains_key(&location.entity),
                "datacenter" => inventory.datacenters.contains(&location.entity),
                "host" => inventory.hosts.contains(&location.entity),
                other => return Err(Error::Ui(format!("cannot navigate to a {}", other))),
            };
            if !known {
                return Err(Error::Ui(format!("{} not found in inventory", location)));
            }
        }
        debug!(location = %location, "Lab UI navigated");
        self.session.lock().location = Some(location.clone());
        Ok(())
    }

    async fn trigger(&self, action: &str, target: &UiTarget) -> Result<()> {
        if action == "login" {
            let user = target
                .item
                .clone()
                .ok_or_else(|| Error::Ui("login needs a user name".to_string()))?;
            self.session.lock().user = Some(user);
            return Ok(());
        }

        let state =
            PowerState::from_action(action).ok_or_else(|| Error::Ui(format!("no '{}' action in the UI", action)))?;
        self.require_login(action)?;
        let vm_name = target
            .item
            .as_deref()
            .ok_or_else(|| Error::Ui(format!("'{}' needs a VM", action)))?;

        let on_vm = self
            .session
            .lock()
            .location
            .as_ref()
            .is_some_and(|l| l.entity_kind == "vm" && l.entity == vm_name);
        if !on_vm {
            return Err(Error::Ui(format!("'{}' is not available outside the page of VM '{}'", action, vm_name)));
        }

        let mut inventory = self.lab.inventory.write();
        let vm = inventory
            .vms
            .get_mut(vm_name)
            .ok_or_else(|| Error::Ui(format!("VM '{}' disappeared", vm_name)))?;
        let task = self.lab.set_power_state(vm, state);
        inventory.record_task(task, vm_name);
        Ok(())
    }

    async fn read_displayed_state(&self, target: &UiTarget) -> Result<Value> {
        match target.view.as_str() {
            views::RECENT_TASKS => {
                let inventory = self.lab.inventory.read();
                let tasks: Vec<Value> = inventory
                    .tasks
                    .iter()
                    .rev()
                    .map(|t| json!({ "name": t.name, "target": t.target, "status": t.status }))
                    .collect();
                Ok(Value::Array(tasks))
            }
            views::VMS => {
                let in_datacenter = self
                    .session
                    .lock()
                    .location
                    .as_ref()
                    .is_some_and(|l| l.entity_kind == "datacenter");
                if !in_datacenter {
                    return Err(Error::Ui("the VMs view is only shown below a datacenter".to_string()));
                }
                let inventory = self.lab.inventory.read();
                match &target.item {
                    Some(name) => {
                        let vm = inventory
                            .vms
                            .get(name)
                            .ok_or_else(|| Error::Ui(format!("VM '{}' is not listed", name)))?;
                        Ok(self.vms_row(vm))
                    }
                    None => Ok(Value::Array(inventory.vms.values().map(|vm| self.vms_row(vm)).collect())),
                }
            }
            other => Err(Error::Ui(format!("unknown view '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab() -> InventoryLab {
        InventoryLab::from_testbed(&TestbedConfig::default(), Arc::new(MessageCatalog::default()))
    }

    async fn logged_in(lab: &InventoryLab) -> Arc<LabUi> {
        let ui = lab.ui();
        ui.trigger("login", &UiTarget::view(views::LOGIN).item("administrator@vsphere.local"))
            .await
            .unwrap();
        ui
    }

    fn vm_request(name: &str) -> Value {
        json!({ "name": name, "host": "esx-01.lab.local", "datastore": "datastore-01" })
    }

    #[tokio::test]
    async fn created_vms_start_powered_off() {
        let lab = lab();
        let handle = lab.api().create("vm", vm_request("web-01")).await.unwrap();

        let vm = lab.api().query(&handle).await.unwrap();
        assert_eq!(vm["power_state"], "POWER_OFF");
        assert_eq!(vm["datastore"], "datastore-01");
        assert_eq!(lab.tasks()[0].name, "Create virtual machine");
    }

    #[tokio::test]
    async fn queries_only_take_a_shared_lock() {
        let lab = lab();
        let handle = lab.api().create("vm", vm_request("web-01")).await.unwrap();

        let reader = lab.inventory.read();
        let vm = lab.api().query(&handle).await.unwrap();
        assert_eq!(vm["name"], "web-01");
        drop(reader);

        let err = lab
            .api()
            .query(&ResourceHandle::new("vm", "vm-99", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
    }

    #[tokio::test]
    async fn duplicate_and_misplaced_vms_are_refused() {
        let lab = lab();
        lab.api().create("vm", vm_request("web-01")).await.unwrap();

        let err = lab.api().create("vm", vm_request("web-01")).await.unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
        let err = lab
            .api()
            .create("vm", json!({ "name": "web-02", "host": "esx-99" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("esx-99"));
    }

    #[tokio::test]
    async fn power_on_from_vm_page() {
        let lab = lab();
        lab.api().create("vm", vm_request("web-01")).await.unwrap();
        let ui = logged_in(&lab).await;
        let target = UiTarget::view(views::INVENTORY).item("web-01");

        let err = ui.trigger("power_on", &target).await.unwrap_err();
        assert!(matches!(err, Error::Ui(_)));

        ui.navigate_to(&Location::new("vm", "web-01")).await.unwrap();
        ui.trigger("power_on", &target).await.unwrap();
        assert_eq!(lab.vm("web-01").unwrap().power_state, PowerState::PowerOn);

        let tasks = ui.read_displayed_state(&UiTarget::view(views::RECENT_TASKS)).await.unwrap();
        assert_eq!(tasks[0]["name"], "Power On virtual machine");
        assert_eq!(tasks[0]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn vms_view_shows_localized_state() {
        let lab = lab();
        lab.api().create("vm", vm_request("web-01")).await.unwrap();
        let ui = logged_in(&lab).await;
        let row = UiTarget::view(views::VMS).item("web-01");

        assert!(ui.read_displayed_state(&row).await.is_err());

        ui.navigate_to(&Location::new("datacenter", "dc-01")).await.unwrap();
        let shown = ui.read_displayed_state(&row).await.unwrap();
        assert_eq!(shown["state"], "Powered Off");
    }

    #[tokio::test]
    async fn sessions_do_not_share_location() {
        let lab = lab();
        let a = logged_in(&lab).await;
        let b = logged_in(&lab).await;
        a.navigate_to(&Location::new("datacenter", "dc-01")).await.unwrap();

        assert!(a.current_location().is_some());
        assert!(b.current_location().is_none());
        assert!(b.navigate_to(&Location::new("vm", "missing")).await.is_err());
    }

    #[tokio::test]
    async fn login_is_required_per_session() {
        let lab = lab();
        lab.api().create("vm", vm_request("web-01")).await.unwrap();
        let anonymous = lab.ui();

        let err = anonymous
            .navigate_to(&Location::new("datacenter", "dc-01"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("before logging in"));
        let err = anonymous
            .trigger("power_on", &UiTarget::view(views::INVENTORY).item("web-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ui(_)));
        assert_eq!(lab.vm("web-01").unwrap().power_state, PowerState::PowerOff);

        let admin = logged_in(&lab).await;
        assert_eq!(admin.user().as_deref(), Some("administrator@vsphere.local"));
        admin.navigate_to(&Location::new("vm", "web-01")).await.unwrap();
        assert!(anonymous.user().is_none());
    }
}
