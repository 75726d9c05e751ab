//! Core types for vflow

use serde::{Deserialize, Serialize};

/// Phase of a workflow run a step or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Spec building and definition-time validation
    Setup,
    Prerequisite,
    Test,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Prerequisite => write!(f, "prerequisite"),
            Phase::Test => write!(f, "test"),
        }
    }
}

/// What a step does, used for reporting only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigation,
    Invocation,
    Verification,
    Creation,
    Other,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Navigation => write!(f, "navigation"),
            StepKind::Invocation => write!(f, "invocation"),
            StepKind::Verification => write!(f, "verification"),
            StepKind::Creation => write!(f, "creation"),
            StepKind::Other => write!(f, "other"),
        }
    }
}

/// Final verdict of a run. There is no partial success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => write!(f, "PASSED"),
            Verdict::Failed => write!(f, "FAILED"),
        }
    }
}

/// VM power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    PowerOn,
    PowerOff,
    Suspended,
}

impl Default for PowerState {
    fn default() -> Self {
        Self::PowerOff
    }
}

impl PowerState {
    /// Domain action that drives a VM into this state
    pub fn action(&self) -> &'static str {
        match self {
            PowerState::PowerOn => "power_on",
            PowerState::PowerOff => "power_off",
            PowerState::Suspended => "suspend",
        }
    }

    /// Inverse of [`PowerState::action`]
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "power_on" => Some(PowerState::PowerOn),
            "power_off" => Some(PowerState::PowerOff),
            "suspend" => Some(PowerState::Suspended),
            _ => None,
        }
    }

    /// Message key of the label the client displays for this state
    pub fn display_key(&self) -> &'static str {
        match self {
            PowerState::PowerOn => "vm.power_state.power_on",
            PowerState::PowerOff => "vm.power_state.power_off",
            PowerState::Suspended => "vm.power_state.suspended",
        }
    }

    /// Message key of the task the client shows while changing into this state
    pub fn task_key(&self) -> &'static str {
        match self {
            PowerState::PowerOn => "vm.task.power_on",
            PowerState::PowerOff => "vm.task.power_off",
            PowerState::Suspended => "vm.task.suspend",
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::PowerOn => write!(f, "POWER_ON"),
            PowerState::PowerOff => write!(f, "POWER_OFF"),
            PowerState::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

/// Status of a task in the client's task console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "QUEUED"),
            TaskStatus::Running => write!(f, "RUNNING"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Live handle to a resource created through the domain API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: String,
    pub id: String,
    pub name: String,
}

impl ResourceHandle {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' ({})", self.kind, self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_state_uses_wire_names() {
        assert_eq!(serde_json::to_value(PowerState::PowerOn).unwrap(), serde_json::json!("POWER_ON"));
        assert_eq!(PowerState::PowerOff.to_string(), "POWER_OFF");
    }

    #[test]
    fn power_state_action_round_trips() {
        for state in [PowerState::PowerOn, PowerState::PowerOff, PowerState::Suspended] {
            assert_eq!(PowerState::from_action(state.action()), Some(state));
        }
        assert_eq!(PowerState::from_action("reboot"), None);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Prerequisite.to_string(), "prerequisite");
        assert_eq!(serde_json::to_value(Phase::Test).unwrap(), serde_json::json!("test"));
    }
}
