//! Calibration tracking and the park workflow.
//!
//! Calibration state is derived from every module state message: a module
//! is calibrating while it is paused and reports calibration data.
//!
//! The park workflow is a two-phase exchange with each dockable module:
//!
//! 1. **Requested**: `CALIBRATION_START` with position `PARK` is sent and a
//!    park token is recorded for the module.
//! 2. **Awaiting selection**: the module reports calibrating with no action
//!    running.
//! 3. **Selected**: the token is consumed and `CALIBRATION_SELECT` with
//!    position `PARK` is sent. If that send fails the token is restored and
//!    the next matching report retries.

use chrono::Utc;
use dashmap::DashSet;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use ccu_core::action::{Action, InstantActions};
use ccu_core::bus::{topics, PublishOptions, SharedPublisher};
use ccu_core::{ModuleType, Result};
use ccu_devices::PairingRegistry;

use crate::command::{
    CalibrationCommand, CalibrationOptions, CalibrationRequest, LedState, SET_STATUS_LED,
};
use crate::telemetry::{CalibrationReference, ModuleState};

/// Body of the calibration view message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationView {
    pub serial_number: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub calibrating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<CalibrationReference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<CalibrationReference>>,
}

/// Watches module telemetry for calibration and drives the park workflow.
pub struct CalibrationCoordinator {
    modules: Arc<PairingRegistry>,
    publisher: SharedPublisher,
    park_tokens: DashSet<String>,
}

impl CalibrationCoordinator {
    pub fn new(modules: Arc<PairingRegistry>, publisher: SharedPublisher) -> Self {
        Self {
            modules,
            publisher,
            park_tokens: DashSet::new(),
        }
    }

    /// Serial numbers still waiting for their park selection, sorted.
    pub fn pending_park_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.park_tokens.iter().map(|t| t.key().clone()).collect();
        tokens.sort();
        tokens
    }

    /// Process one module state message.
    pub async fn handle_module_state(&self, state: &ModuleState) {
        let serial = state.serial_number.as_str();
        let calibrating = state.is_calibrating();

        if let Some(action_id) = state.finished_action_id() {
            if self.modules.record_finished_action(serial, action_id) {
                debug!(category = "calibration", serial = %serial, action_id, "Action finished");
            }
        }

        if calibrating && state.is_idle() {
            self.advance_park(serial).await;
        }

        if self.modules.set_calibrating(serial, calibrating) {
            self.modules.notify_changed(serial);
            info!(category = "calibration", serial = %serial, calibrating, "Calibration mode changed");

            if !calibrating {
                if self.park_tokens.remove(serial).is_some() {
                    debug!(category = "calibration", serial = %serial, "Pending park dropped");
                }
                self.publish_view(CalibrationView {
                    serial_number: serial.to_string(),
                    timestamp: Utc::now(),
                    calibrating: false,
                    references: None,
                    status: None,
                })
                .await;
            }
        }

        if let Some(data) = state.calibration_data() {
            self.publish_view(CalibrationView {
                serial_number: serial.to_string(),
                timestamp: Utc::now(),
                calibrating,
                references: Some(data.references.clone()),
                status: state.calibration_status().map(|s| s.references.clone()),
            })
            .await;
        }
    }

    /// Send a calibration command. Returns the action id.
    pub async fn send_calibration_command(
        &self,
        serial: &str,
        command: CalibrationCommand,
        options: CalibrationOptions,
    ) -> Result<String> {
        let action = Action::new(command.action_type()).with_metadata(options.to_metadata());
        self.send_action(serial, action).await
    }

    /// Dispatch an inbound calibration request.
    pub async fn handle_calibration_request(&self, request: CalibrationRequest) -> Result<String> {
        self.send_calibration_command(&request.serial_number, request.command, request.options)
            .await
    }

    /// Start parking every paired dockable module. Returns how many were asked.
    pub async fn handle_park_request(&self) -> usize {
        let serials = self.modules.paired_serials_of_types(ModuleType::DOCKABLE);
        info!(category = "calibration", count = serials.len(), "Park requested");

        for serial in &serials {
            self.park_tokens.insert(serial.clone());
            // A failed start leaves the token pending
            let _ = self
                .send_calibration_command(
                    serial,
                    CalibrationCommand::Start,
                    CalibrationOptions::park(),
                )
                .await;
        }
        serials.len()
    }

    /// Switch the status LED of a module.
    pub async fn set_status_led(&self, serial: &str, led: LedState) -> Result<String> {
        let metadata = serde_json::to_value(led)?;
        self.send_action(serial, Action::new(SET_STATUS_LED).with_metadata(metadata))
            .await
    }

    async fn advance_park(&self, serial: &str) {
        if self.park_tokens.remove(serial).is_none() {
            return;
        }
        let sent = self
            .send_calibration_command(
                serial,
                CalibrationCommand::Select,
                CalibrationOptions::park(),
            )
            .await;
        if sent.is_err() {
            self.park_tokens.insert(serial.to_string());
            debug!(category = "calibration", serial = %serial, "Park selection will be retried");
        } else {
            info!(category = "calibration", serial = %serial, "Park position selected");
        }
    }

    async fn send_action(&self, serial: &str, action: Action) -> Result<String> {
        let action_id = action.action_id.clone();
        let action_type = action.action_type.clone();
        let body = InstantActions::single(serial, action).to_json()?;
        let topic = topics::instant_action(topics::MODULE_PREFIX, serial);

        match self
            .publisher
            .publish(&topic, &body, PublishOptions::command())
            .await
        {
            Ok(()) => {
                debug!(
                    category = "calibration",
                    serial = %serial,
                    action_type = %action_type,
                    action_id = %action_id,
                    "Command sent"
                );
                Ok(action_id)
            }
            Err(e) => {
                warn!(
                    category = "calibration",
                    serial = %serial,
                    action_type = %action_type,
                    error = %e,
                    "Command send failed"
                );
                Err(e)
            }
        }
    }

    async fn publish_view(&self, view: CalibrationView) {
        let topic = topics::calibration_state(&view.serial_number);
        let body = match serde_json::to_value(&view) {
            Ok(body) => body,
            Err(e) => {
                warn!(category = "calibration", error = %e, "Calibration view not serializable");
                return;
            }
        };
        if let Err(e) = self
            .publisher
            .publish(&topic, &body, PublishOptions::retained())
            .await
        {
            warn!(
                category = "calibration",
                serial = %view.serial_number,
                error = %e,
                "Calibration view publish failed"
            );
        }
    }
}
