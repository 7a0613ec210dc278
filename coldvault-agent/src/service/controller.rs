//! Service controller
//!
//! Asks fleet about unit states and requests state changes, logging every
//! request with the unit and target involved.
//!
//! Stop and start requests are fire-and-forget: fleet acknowledging the
//! request is all that is checked.

use coldvault_client::UnitApi;
use coldvault_core::domain::unit::{ActiveState, TargetState, UnitState};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::BackupError;

/// Controls the run-state of units through the scheduler
pub struct ServiceController {
    api: Arc<dyn UnitApi>,
}

impl ServiceController {
    /// Creates a controller over any scheduler client
    pub fn new(api: Arc<dyn UnitApi>) -> Self {
        Self { api }
    }

    /// Returns whether `name` is currently "active"
    ///
    /// The first unit with a matching name decides. A unit missing from the
    /// roster is treated as inactive and only logged.
    pub async fn is_service_active(&self, name: &str) -> Result<bool, BackupError> {
        Ok(self.find_unit(name).await?.is_some_and(|unit| unit.is_active()))
    }

    /// Fails unless `dependent` is affirmatively observed not to be active
    ///
    /// A failed roster query fails the check just like an active unit.
    pub async fn ensure_inactive(&self, dependent: &str) -> Result<(), BackupError> {
        match self.is_service_active(dependent).await {
            Ok(true) => {
                error!(
                    unit = %dependent,
                    "Dependent unit is still active; the database could be restarted during the backup"
                );
                Err(BackupError::SafetyViolation {
                    unit: dependent.to_string(),
                    state: ActiveState::Active.to_string(),
                })
            }
            Ok(false) => {
                info!(unit = %dependent, "Dependent unit is inactive");
                Ok(())
            }
            Err(e) => {
                error!(
                    unit = %dependent,
                    error = %e,
                    "Could not determine whether the dependent unit is active"
                );
                Err(e)
            }
        }
    }

    /// Requests `target` for the unit `name`
    pub async fn set_target_state(&self, name: &str, target: TargetState) -> Result<(), BackupError> {
        match self.api.set_unit_target_state(name, target).await {
            Ok(()) => {
                info!(unit = %name, target = %target, "Set unit target state successfully");
                Ok(())
            }
            Err(e) => {
                error!(unit = %name, target = %target, error = %e, "Problem setting unit target state");
                Err(e.into())
            }
        }
    }

    /// Requests that the unit be stopped
    pub async fn stop(&self, name: &str) -> Result<(), BackupError> {
        self.set_target_state(name, TargetState::Inactive).await
    }

    /// Requests that the unit be launched
    pub async fn start(&self, name: &str) -> Result<(), BackupError> {
        self.set_target_state(name, TargetState::Launched).await
    }

    async fn find_unit(&self, name: &str) -> Result<Option<UnitState>, BackupError> {
        let units = self.api.unit_states().await.map_err(|e| {
            error!(
                error = %e,
                "Could not retrieve list of units from fleet API, do you need to start a SOCKS proxy?"
            );
            BackupError::from(e)
        })?;

        info!(count = units.len(), "Retrieved units from fleet API");

        match units.into_iter().enumerate().find(|(_, unit)| unit.name == name) {
            Some((index, unit)) => {
                info!(
                    index,
                    unit = %unit.name,
                    active_state = %unit.active_state,
                    load_state = %unit.load_state,
                    "Found unit"
                );
                Ok(Some(unit))
            }
            None => {
                warn!(
                    unit = %name,
                    "Could not find unit in fleet, assuming it is inactive"
                );
                Ok(None)
            }
        }
    }
}
