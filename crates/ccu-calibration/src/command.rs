//! Calibration command vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::telemetry::CalibrationReference;

/// Position name that drives a dockable module into its parking position.
pub const PARK_POSITION: &str = "PARK";

/// Action type for the status LED.
pub const SET_STATUS_LED: &str = "SET_STATUS_LED";

/// Calibration commands a module understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationCommand {
    #[serde(alias = "CALIBRATION_SET_VALUES")]
    SetValues,
    #[serde(alias = "CALIBRATION_RESET")]
    Reset,
    #[serde(alias = "CALIBRATION_STORE")]
    Store,
    #[serde(alias = "CALIBRATION_SELECT")]
    Select,
    #[serde(alias = "CALIBRATION_TEST")]
    Test,
    #[serde(alias = "CALIBRATION_START")]
    Start,
    #[serde(alias = "CALIBRATION_STOP")]
    Stop,
}

impl CalibrationCommand {
    /// Instant-action type on the wire.
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::SetValues => "CALIBRATION_SET_VALUES",
            Self::Reset => "CALIBRATION_RESET",
            Self::Store => "CALIBRATION_STORE",
            Self::Select => "CALIBRATION_SELECT",
            Self::Test => "CALIBRATION_TEST",
            Self::Start => "CALIBRATION_START",
            Self::Stop => "CALIBRATION_STOP",
        }
    }
}

impl fmt::Display for CalibrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_type())
    }
}

/// Optional parameters of a calibration command.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalibrationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    pub references: Vec<CalibrationReference>,
}

impl CalibrationOptions {
    /// Options that target the parking position.
    pub fn park() -> Self {
        Self {
            position: Some(PARK_POSITION.to_string()),
            ..Default::default()
        }
    }

    pub fn with_factory(mut self, factory: impl Into<String>) -> Self {
        self.factory = Some(factory.into());
        self
    }

    pub fn with_references(mut self, references: Vec<CalibrationReference>) -> Self {
        self.references = references;
        self
    }

    /// Action metadata.
    pub fn to_metadata(&self) -> serde_json::Value {
        // Serializing plain strings and references cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Inbound calibration request (`ccu/set/calibration`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRequest {
    pub serial_number: String,
    pub command: CalibrationCommand,
    #[serde(flatten)]
    pub options: CalibrationOptions,
}

/// Status LED pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedState {
    pub red: bool,
    pub yellow: bool,
    pub green: bool,
}

impl LedState {
    pub fn new(red: bool, yellow: bool, green: bool) -> Self {
        Self { red, yellow, green }
    }
}
