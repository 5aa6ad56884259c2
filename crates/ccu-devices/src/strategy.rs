//! Per-device-kind pairing behavior.
//!
//! The registry engine is shared by modules and AGVs; what differs between
//! them is injected through [`PairingStrategy`].

use ccu_core::ModuleType;
use std::collections::HashMap;

use crate::types::{Availability, DeviceStatus, Factsheet};

/// Device-kind specific decisions used by [`PairingRegistry`](crate::PairingRegistry).
pub trait PairingStrategy: Send + Sync {
    /// Derive the subtype from a capability sheet.
    fn classify(&self, factsheet: &Factsheet) -> Option<ModuleType>;

    /// Default production duration (seconds) for a subtype, if it has one.
    fn default_production_duration(&self, subtype: ModuleType) -> Option<u64>;

    /// Whether a device can take work right now.
    fn is_ready(&self, status: &DeviceStatus) -> bool;
}

/// Strategy for stationary modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleStrategy {
    durations: HashMap<ModuleType, u64>,
}

impl ModuleStrategy {
    pub fn new(durations: HashMap<ModuleType, u64>) -> Self {
        Self { durations }
    }
}

impl PairingStrategy for ModuleStrategy {
    fn classify(&self, factsheet: &Factsheet) -> Option<ModuleType> {
        let spec = &factsheet.type_specification;
        if let Some(class) = spec.module_class.as_deref() {
            if let Ok(module_type) = class.parse::<ModuleType>() {
                return Some(module_type);
            }
        }
        // Series names look like "MOD-FF22+HBW+24V"
        spec.series_name
            .split(|c: char| c == '+' || c == '-' || c == '_' || c.is_whitespace())
            .filter_map(|token| token.parse::<ModuleType>().ok())
            .find(|t| *t != ModuleType::Fts)
    }

    fn default_production_duration(&self, subtype: ModuleType) -> Option<u64> {
        self.durations.get(&subtype).copied()
    }

    fn is_ready(&self, status: &DeviceStatus) -> bool {
        status.connected && status.availability == Availability::Ready && !status.calibrating
    }
}

/// Strategy for AGVs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FtsStrategy;

impl PairingStrategy for FtsStrategy {
    fn classify(&self, _factsheet: &Factsheet) -> Option<ModuleType> {
        Some(ModuleType::Fts)
    }

    fn default_production_duration(&self, _subtype: ModuleType) -> Option<u64> {
        None
    }

    fn is_ready(&self, status: &DeviceStatus) -> bool {
        status.connected && status.availability == Availability::Ready && !status.charging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeSpecification;
    use ccu_core::DeviceKind;

    #[test]
    fn test_module_classify_prefers_module_class() {
        let strategy = ModuleStrategy::default();
        assert_eq!(
            strategy.classify(&Factsheet::new("A", "drill")),
            Some(ModuleType::Drill)
        );

        let mut sheet = Factsheet::new("B", "unknown");
        sheet.type_specification = TypeSpecification {
            series_name: "MOD-FF22+HBW+24V".to_string(),
            module_class: None,
        };
        assert_eq!(strategy.classify(&sheet), Some(ModuleType::Hbw));

        sheet.type_specification.series_name = "something else".to_string();
        assert_eq!(strategy.classify(&sheet), None);
    }

    #[test]
    fn test_module_ready_requires_not_calibrating() {
        let strategy = ModuleStrategy::default();
        let mut status = DeviceStatus::new("A", DeviceKind::Module);
        status.connected = true;
        status.availability = Availability::Ready;
        assert!(strategy.is_ready(&status));

        status.calibrating = true;
        assert!(!strategy.is_ready(&status));
    }

    #[test]
    fn test_fts_ready_requires_not_charging() {
        let strategy = FtsStrategy;
        let mut status = DeviceStatus::new("5iO4", DeviceKind::Agv);
        status.connected = true;
        status.availability = Availability::Ready;
        assert!(strategy.is_ready(&status));

        status.charging = true;
        assert!(!strategy.is_ready(&status));
        assert_eq!(strategy.default_production_duration(ModuleType::Fts), None);
    }
}
