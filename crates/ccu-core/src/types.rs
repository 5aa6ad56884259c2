//! Shared factory vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of a shopfloor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleType {
    /// Milling station
    Mill,
    /// Drilling station
    Drill,
    /// Oven
    Oven,
    /// AI quality inspection station
    Aiqs,
    /// Delivery and pickup station
    Dps,
    /// High-bay warehouse
    Hbw,
    /// Charging station
    Chrg,
    /// Driverless transport vehicle
    Fts,
}

impl ModuleType {
    /// All known types.
    pub const ALL: &'static [ModuleType] = &[
        ModuleType::Mill,
        ModuleType::Drill,
        ModuleType::Oven,
        ModuleType::Aiqs,
        ModuleType::Dps,
        ModuleType::Hbw,
        ModuleType::Chrg,
        ModuleType::Fts,
    ];

    /// Types that AGVs dock at for parking (storage and delivery).
    pub const DOCKABLE: &'static [ModuleType] = &[ModuleType::Hbw, ModuleType::Dps];

    /// Stations that work on a workpiece as part of a production step.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Mill | Self::Drill | Self::Oven | Self::Aiqs)
    }

    pub fn is_quality_inspection(&self) -> bool {
        matches!(self, Self::Aiqs)
    }

    pub fn is_dockable(&self) -> bool {
        Self::DOCKABLE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mill => "MILL",
            Self::Drill => "DRILL",
            Self::Oven => "OVEN",
            Self::Aiqs => "AIQS",
            Self::Dps => "DPS",
            Self::Hbw => "HBW",
            Self::Chrg => "CHRG",
            Self::Fts => "FTS",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| crate::validation_err!("Unknown module type: {}", s))
    }
}
