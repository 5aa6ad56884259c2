//! Core traits and types for the factory CCU.
//!
//! This crate defines the foundational abstractions shared by the device,
//! topology and calibration crates: the unified error type, the in-process
//! event bus, the message-bus publisher seam and configuration.

pub mod action;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod types;

// Error exports
pub use error::{Error, Result};

// Event exports
pub use event::{CcuEvent, DeviceKind, EventMetadata};

// Event bus exports
pub use eventbus::{EventBus, EventBusReceiver, FilteredReceiver, SharedEventBus};

// Message bus exports
pub use bus::{
    MessagePublisher, PublishOptions, PublishedMessage, QoS, RecordingPublisher, SharedPublisher,
};

// Shared vocabulary
pub use action::{Action, InstantActions};
pub use types::ModuleType;

// Configuration exports
pub use config::CcuConfig;

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::bus::{topics, MessagePublisher, PublishOptions, QoS};
    pub use crate::config::CcuConfig;
    pub use crate::error::{Error, Result};
    pub use crate::event::{CcuEvent, DeviceKind};
    pub use crate::eventbus::{EventBus, SharedEventBus};
    pub use crate::types::ModuleType;
}
