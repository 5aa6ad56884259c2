//! Calibration tracking and the park workflow for dockable modules.

pub mod command;
pub mod coordinator;
pub mod telemetry;

pub use command::{CalibrationCommand, CalibrationOptions, CalibrationRequest, LedState};
pub use coordinator::{CalibrationCoordinator, CalibrationView};
pub use telemetry::{ActionState, ActionStatus, CalibrationReference, InformationEntry, ModuleState};
