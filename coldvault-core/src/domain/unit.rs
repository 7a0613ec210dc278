//! Unit domain model
//!
//! Represents a systemd unit scheduled by fleet, as seen by the backup agent.

use serde::{Deserialize, Serialize};

/// Snapshot of a single unit as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    /// Unit name, e.g. "neo4j-red@1.service"
    pub name: String,

    /// systemd active state of the unit
    pub active_state: ActiveState,

    /// systemd load state, kept opaque
    pub load_state: String,

    /// systemd sub state (e.g. "running", "dead")
    pub sub_state: Option<String>,

    /// Machine the unit is scheduled on
    pub machine_id: Option<String>,
}

impl UnitState {
    /// Creates a unit state with only the fields the agent reasons about
    pub fn new(name: impl Into<String>, active_state: ActiveState) -> Self {
        Self {
            name: name.into(),
            active_state,
            load_state: "loaded".to_string(),
            sub_state: None,
            machine_id: None,
        }
    }

    /// Returns true if systemd reports the unit as "active"
    pub fn is_active(&self) -> bool {
        self.active_state == ActiveState::Active
    }
}

/// systemd active state
///
/// Only "active" and "inactive" are distinguished; every other state
/// ("failed", "activating", ...) is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveState {
    Active,
    Inactive,
    Unknown(String),
}

impl ActiveState {
    pub fn as_str(&self) -> &str {
        match self {
            ActiveState::Active => "active",
            ActiveState::Inactive => "inactive",
            ActiveState::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for ActiveState {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => ActiveState::Active,
            "inactive" => ActiveState::Inactive,
            other => ActiveState::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ActiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired state that can be requested from fleet for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Unit is stopped and unloaded from its machine
    Inactive,

    /// Unit is loaded on a machine but not started
    Loaded,

    /// Unit is loaded and started
    Launched,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Inactive => "inactive",
            TargetState::Loaded => "loaded",
            TargetState::Launched => "launched",
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
