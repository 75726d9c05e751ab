//! Interfaces to the external collaborators a workflow drives
//!
//! The engine never talks to a browser or a management endpoint directly.
//! Steps reach them through these narrow traits:
//!
//! - [`DomainApi`]: create resources, trigger actions, query live state
//! - [`UiDriver`]: navigate, trigger on-screen actions, read displayed state
//! - [`Localizer`]: resolve display strings, injected instead of looked up globally

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vflow_common::{ResourceHandle, Result};

/// A place in the client's UI: an inventory object plus a tab path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Inventory object kind, e.g. `vm` or `datacenter`
    pub entity_kind: String,
    /// Inventory object name
    pub entity: String,
    /// Navigation ids of the tabs to open, outermost first
    #[serde(default)]
    pub tabs: Vec<String>,
}

impl Location {
    pub fn new(entity_kind: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            entity: entity.into(),
            tabs: Vec::new(),
        }
    }

    pub fn with_tabs<I, S>(mut self, tabs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tabs = tabs.into_iter().map(Into::into).collect();
        self
    }

    /// Innermost tab, if any
    pub fn current_tab(&self) -> Option<&str> {
        self.tabs.last().map(String::as_str)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.entity_kind, self.entity)?;
        for tab in &self.tabs {
            write!(f, " > {}", tab)?;
        }
        Ok(())
    }
}

/// An on-screen element: a view and optionally an item within it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiTarget {
    pub view: String,
    #[serde(default)]
    pub item: Option<String>,
}

impl UiTarget {
    pub fn view(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            item: None,
        }
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }
}

impl fmt::Display for UiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "{}[{}]", self.view, item),
            None => write!(f, "{}", self.view),
        }
    }
}

/// Management API of the system under test.
///
/// Implementations report connection-level trouble as
/// [`vflow_common::Error::Transport`] and refusals as
/// [`vflow_common::Error::Domain`].
#[async_trait]
pub trait DomainApi: Send + Sync {
    /// Provision a resource of `kind` described by `request`
    async fn create(&self, kind: &str, request: serde_json::Value) -> Result<ResourceHandle>;

    /// Trigger `action` on `target`
    async fn invoke(&self, action: &str, target: &ResourceHandle) -> Result<()>;

    /// Current state of `target`
    async fn query(&self, target: &ResourceHandle) -> Result<serde_json::Value>;
}

/// Browser-side driver of the web client
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn navigate_to(&self, location: &Location) -> Result<()>;

    async fn trigger(&self, action: &str, target: &UiTarget) -> Result<()>;

    async fn read_displayed_state(&self, target: &UiTarget) -> Result<serde_json::Value>;
}

/// Display-string lookup
pub trait Localizer: Send + Sync {
    fn message(&self, key: &str) -> String;
}

/// In-memory message table with the client's English strings built in
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let messages = [
            ("vm.task.create", "Create virtual machine"),
            ("vm.task.power_on", "Power On virtual machine"),
            ("vm.task.power_off", "Power Off virtual machine"),
            ("vm.task.suspend", "Suspend virtual machine"),
            ("vm.power_state.power_on", "Powered On"),
            ("vm.power_state.power_off", "Powered Off"),
            ("vm.power_state.suspended", "Suspended"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self { messages }
    }
}

impl MessageCatalog {
    /// A catalog with no messages at all
    pub fn empty() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    pub fn with_message(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.messages.insert(key.into(), value.into());
        self
    }
}

impl Localizer for MessageCatalog {
    /// Unknown keys resolve to the key itself
    fn message(&self, key: &str) -> String {
        match self.messages.get(key) {
            Some(message) => message.clone(),
            None => {
                warn!(key, "No message for key");
                key.to_string()
            }
        }
    }
}

/// The collaborators a run hands to its steps
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn DomainApi>,
    pub ui: Arc<dyn UiDriver>,
    pub localizer: Arc<dyn Localizer>,
}

impl Collaborators {
    pub fn new(api: Arc<dyn DomainApi>, ui: Arc<dyn UiDriver>, localizer: Arc<dyn Localizer>) -> Self {
        Self { api, ui, localizer }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Opens the collaborators of one run.
///
/// Every run gets its own session so that UI state such as the current
/// location is never shared between concurrent runs.
pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> Collaborators;
}

/// A fixed set of collaborators is handed to every run as is
impl SessionFactory for Collaborators {
    fn open_session(&self) -> Collaborators {
        self.clone()
    }
}
