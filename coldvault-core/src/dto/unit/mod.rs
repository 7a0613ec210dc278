//! Unit DTOs
//!
//! Wire types for fleet's `/fleet/v1/state` and `/fleet/v1/units` endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::unit::{ActiveState, TargetState, UnitState};

/// One page of `GET /fleet/v1/state`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatePage {
    #[serde(default)]
    pub states: Vec<UnitStateRecord>,

    /// Token for the next page; absent or empty on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// A unit state as serialized by fleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitStateRecord {
    pub name: String,

    #[serde(rename = "systemdActiveState", default)]
    pub systemd_active_state: String,

    #[serde(rename = "systemdLoadState", default)]
    pub systemd_load_state: String,

    #[serde(rename = "systemdSubState", default)]
    pub systemd_sub_state: Option<String>,

    #[serde(rename = "machineID", default)]
    pub machine_id: Option<String>,
}

impl From<UnitStateRecord> for UnitState {
    fn from(record: UnitStateRecord) -> Self {
        UnitState {
            active_state: ActiveState::from(record.systemd_active_state.as_str()),
            name: record.name,
            load_state: record.systemd_load_state,
            sub_state: record.systemd_sub_state,
            machine_id: record.machine_id,
        }
    }
}

/// Body of `PUT /fleet/v1/units/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDesiredState {
    pub name: String,
    pub desired_state: TargetState,
}
