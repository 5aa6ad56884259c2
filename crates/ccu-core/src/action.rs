//! Instant actions sent to devices.
//!
//! Both the factsheet request and the calibration commands travel as an
//! instant-action message on `<prefix>/<serial>/instantAction`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action type asking a device to publish its factsheet.
pub const FACTSHEET_REQUEST: &str = "factsheetRequest";

/// One action inside an [`InstantActions`] message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Action {
    /// New action with a fresh id.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Instant-action message addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantActions {
    pub serial_number: String,
    pub timestamp: DateTime<Utc>,
    pub actions: Vec<Action>,
}

impl InstantActions {
    pub fn single(serial_number: impl Into<String>, action: Action) -> Self {
        Self {
            serial_number: serial_number.into(),
            timestamp: Utc::now(),
            actions: vec![action],
        }
    }

    /// JSON body for the bus.
    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
