//! Module state telemetry as far as calibration is concerned.

use serde::{Deserialize, Serialize};

/// Information entry type carrying the live calibration reference values.
pub const CALIBRATION_DATA: &str = "CALIBRATION_DATA";
/// Information entry type carrying the calibration status values.
pub const CALIBRATION_STATUS: &str = "CALIBRATION_STATUS";

/// A single reference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReference {
    pub reference_key: String,
    #[serde(default)]
    pub reference_value: serde_json::Value,
}

impl CalibrationReference {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            reference_key: key.into(),
            reference_value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformationEntry {
    #[serde(rename = "type")]
    pub info_type: String,
    #[serde(default)]
    pub references: Vec<CalibrationReference>,
}

/// Lifecycle state of a device action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Waiting,
    Initializing,
    Running,
    Paused,
    Finished,
    Failed,
    #[serde(other)]
    Unknown,
}

/// The action a module is working on (or last worked on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub id: String,
    #[serde(default)]
    pub command: Option<String>,
    pub state: ActionStatus,
}

/// Module state telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub serial_number: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub action_state: Option<ActionState>,
    #[serde(default)]
    pub information: Vec<InformationEntry>,
}

impl ModuleState {
    fn information(&self, info_type: &str) -> Option<&InformationEntry> {
        self.information.iter().find(|i| i.info_type == info_type)
    }

    pub fn calibration_data(&self) -> Option<&InformationEntry> {
        self.information(CALIBRATION_DATA)
    }

    pub fn calibration_status(&self) -> Option<&InformationEntry> {
        self.information(CALIBRATION_STATUS)
    }

    /// Paused with calibration data on hand.
    pub fn is_calibrating(&self) -> bool {
        self.paused && self.calibration_data().is_some()
    }

    /// No action running, or the reported one has finished.
    pub fn is_idle(&self) -> bool {
        self.action_state
            .as_ref()
            .map_or(true, |a| a.state == ActionStatus::Finished)
    }

    /// Id of the reported action if it has finished.
    pub fn finished_action_id(&self) -> Option<&str> {
        self.action_state
            .as_ref()
            .filter(|a| a.state == ActionStatus::Finished)
            .map(|a| a.id.as_str())
    }
}
