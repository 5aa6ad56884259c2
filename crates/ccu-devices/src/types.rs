//! Device status and the telemetry wire types the registry consumes.

use ccu_core::{DeviceKind, ModuleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action type a factsheet declares when the device can be calibrated.
pub const CALIBRATION_START_ACTION: &str = "CALIBRATION_START";

/// Whether a device can take work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Availability {
    /// Not usable.
    #[default]
    Blocked,
    /// Usable: unassigned or finished.
    Ready,
    /// Mid-task.
    Busy,
}

/// Connection state reported by a device (or its broker last will).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Online,
    Offline,
    #[serde(rename = "CONNECTIONBROKEN")]
    ConnectionBroken,
}

/// Connection telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    pub serial_number: String,
    pub connection_state: ConnectionState,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

impl ConnectionEvent {
    pub fn new(serial_number: impl Into<String>, connection_state: ConnectionState) -> Self {
        Self {
            serial_number: serial_number.into(),
            connection_state,
            timestamp: Some(Utc::now()),
            version: None,
            ip: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn is_online(&self) -> bool {
        self.connection_state == ConnectionState::Online
    }
}

/// Type section of a factsheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeSpecification {
    pub series_name: String,
    pub module_class: Option<String>,
}

/// An action a device declares it can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescription {
    pub action_type: String,
}

/// Protocol section of a factsheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolFeatures {
    #[serde(alias = "agvActions")]
    pub module_actions: Vec<ActionDescription>,
}

/// Capability sheet ("factsheet") reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factsheet {
    pub serial_number: String,
    #[serde(default)]
    pub type_specification: TypeSpecification,
    #[serde(default)]
    pub protocol_features: ProtocolFeatures,
}

impl Factsheet {
    pub fn new(serial_number: impl Into<String>, module_class: impl Into<String>) -> Self {
        let module_class = module_class.into();
        Self {
            serial_number: serial_number.into(),
            type_specification: TypeSpecification {
                series_name: format!("MOD-FF22+{}", module_class),
                module_class: Some(module_class),
            },
            protocol_features: ProtocolFeatures::default(),
        }
    }

    pub fn with_action(mut self, action_type: impl Into<String>) -> Self {
        self.protocol_features.module_actions.push(ActionDescription {
            action_type: action_type.into(),
        });
        self
    }

    pub fn declares_action(&self, action_type: &str) -> bool {
        self.protocol_features
            .module_actions
            .iter()
            .any(|a| a.action_type == action_type)
    }
}

/// Battery section of AGV telemetry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryState {
    pub charging: bool,
    pub current_voltage: Option<f64>,
    pub percentage: Option<f64>,
}

/// A load carried by an AGV.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Load {
    pub load_id: Option<String>,
    pub load_type: Option<String>,
    pub load_position: Option<String>,
}

/// AGV state telemetry (the parts the registry keeps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgvState {
    pub serial_number: String,
    #[serde(default)]
    pub battery_state: Option<BatteryState>,
    #[serde(default)]
    pub last_node_id: Option<String>,
    #[serde(default)]
    pub loads: Vec<Load>,
}

/// Entry of the configured paired set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedDevice {
    pub serial_number: String,
    #[serde(rename = "type")]
    pub device_type: ModuleType,
}

impl PairedDevice {
    pub fn new(serial_number: impl Into<String>, device_type: ModuleType) -> Self {
        Self {
            serial_number: serial_number.into(),
            device_type,
        }
    }
}

/// Authoritative status of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub serial_number: String,
    pub kind: DeviceKind,
    /// Set once a factsheet arrived or the layout declared the type.
    pub subtype: Option<ModuleType>,
    pub paired_since: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub connected: bool,
    pub availability: Availability,
    pub assigned: bool,
    pub assigned_order_id: Option<String>,
    pub protocol_version: Option<String>,
    pub ip: Option<String>,
    pub has_calibration: bool,
    pub calibrating: bool,
    /// Default production duration in seconds.
    pub production_duration: Option<u64>,

    // AGV only
    pub charging: bool,
    pub battery_voltage: Option<f64>,
    pub battery_percentage: Option<f64>,
    pub last_node_id: Option<String>,
    pub last_load_bay: Option<String>,
}

impl DeviceStatus {
    pub fn new(serial_number: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            serial_number: serial_number.into(),
            kind,
            subtype: None,
            paired_since: None,
            last_seen: None,
            connected: false,
            availability: Availability::Blocked,
            assigned: false,
            assigned_order_id: None,
            protocol_version: None,
            ip: None,
            has_calibration: false,
            calibrating: false,
            production_duration: None,
            charging: false,
            battery_voltage: None,
            battery_percentage: None,
            last_node_id: None,
            last_load_bay: None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.paired_since.is_some()
    }
}
