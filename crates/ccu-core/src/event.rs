//! In-process event types for the CCU.
//!
//! Components publish these on the [`EventBus`](crate::eventbus::EventBus)
//! so that derived views (aggregate pairing state, the published layout) can
//! be refreshed without the producer knowing who renders them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of device a registry instance tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceKind {
    /// Stationary production/storage/inspection station.
    Module,
    /// Driverless transport vehicle ("FTS").
    Agv,
}

impl DeviceKind {
    /// Topic prefix used by devices of this kind.
    pub fn topic_prefix(&self) -> &'static str {
        match self {
            Self::Module => crate::bus::topics::MODULE_PREFIX,
            Self::Agv => crate::bus::topics::FTS_PREFIX,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Agv => write!(f, "agv"),
        }
    }
}

/// Unified event type for the CCU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CcuEvent {
    /// Something that feeds the aggregate pairing state changed.
    PairingChanged {
        kind: DeviceKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        serial_number: Option<String>,
        timestamp: i64,
    },

    /// The shopfloor layout was (re)loaded and the graph rebuilt.
    LayoutChanged {
        node_count: usize,
        edge_count: usize,
        timestamp: i64,
    },
}

impl CcuEvent {
    /// Pairing change for one device.
    pub fn pairing_changed(kind: DeviceKind, serial_number: impl Into<String>) -> Self {
        Self::PairingChanged {
            kind,
            serial_number: Some(serial_number.into()),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Pairing change affecting the whole registry (e.g. a new paired set).
    pub fn pairing_reset(kind: DeviceKind) -> Self {
        Self::PairingChanged {
            kind,
            serial_number: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// The graph was rebuilt from a new layout.
    pub fn layout_changed(node_count: usize, edge_count: usize) -> Self {
        Self::LayoutChanged {
            node_count,
            edge_count,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Get the event type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PairingChanged { .. } => "PairingChanged",
            Self::LayoutChanged { .. } => "LayoutChanged",
        }
    }

    /// Get the event timestamp (unix millis).
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::PairingChanged { timestamp, .. } | Self::LayoutChanged { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Check if this is a pairing event.
    pub fn is_pairing_event(&self) -> bool {
        matches!(self, Self::PairingChanged { .. })
    }

    /// Check if this is a layout event.
    pub fn is_layout_event(&self) -> bool {
        matches!(self, Self::LayoutChanged { .. })
    }
}

/// Event metadata attached by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: String,
    /// Event source (component that published)
    pub source: String,
    /// Event timestamp
    pub timestamp: i64,
}

impl EventMetadata {
    /// Create new event metadata.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
