//! Device pairing and availability for the factory CCU.
//!
//! ## Architecture
//!
//! - **DeviceRecordStore**: per-serial-number records, kept in first-seen order
//! - **PairingRegistry**: consumes connection, factsheet and AGV telemetry and
//!   answers order-assignment questions; one instance per device kind
//! - **PairingStrategy**: what differs between modules and AGVs
//! - **PairingStatePublisher**: derives and publishes the traffic light

pub mod pairing_state;
pub mod registry;
pub mod store;
pub mod strategy;
pub mod types;

pub use pairing_state::{PairingState, PairingStatePublisher, TrafficLight};
pub use registry::PairingRegistry;
pub use store::{DeviceRecord, DeviceRecordStore};
pub use strategy::{FtsStrategy, ModuleStrategy, PairingStrategy};
pub use types::{
    AgvState, Availability, BatteryState, ConnectionEvent, ConnectionState, DeviceStatus,
    Factsheet, Load, PairedDevice,
};
