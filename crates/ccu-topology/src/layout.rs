//! Declarative shopfloor layout.
//!
//! The layout is what operators edit: modules placed on the floor, track
//! intersections and the roads connecting them. The routing graph is derived
//! from it, never edited directly.

use ccu_core::{validation_err, ModuleType, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Compass heading of a road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Heading when driving the road the other way.
    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::North => "NORTH",
            Self::East => "EAST",
            Self::South => "SOUTH",
            Self::West => "WEST",
        };
        f.write_str(s)
    }
}

/// A module placed on the shopfloor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutModule {
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub serial_number: String,
}

/// A track intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intersection {
    pub id: String,
}

/// A bidirectional road between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Road {
    pub from: String,
    pub to: String,
    pub length_mm: f64,
    /// Heading from `from` to `to`.
    pub direction: Direction,
}

/// Shopfloor layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub modules: Vec<LayoutModule>,
    pub intersections: Vec<Intersection>,
    pub roads: Vec<Road>,
}

impl Layout {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_module(mut self, module_type: ModuleType, serial_number: impl Into<String>) -> Self {
        self.modules.push(LayoutModule {
            module_type,
            serial_number: serial_number.into(),
        });
        self
    }

    pub fn add_intersection(mut self, id: impl Into<String>) -> Self {
        self.intersections.push(Intersection { id: id.into() });
        self
    }

    pub fn add_road(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        length_mm: f64,
        direction: Direction,
    ) -> Self {
        self.roads.push(Road {
            from: from.into(),
            to: to.into(),
            length_mm,
            direction,
        });
        self
    }

    /// Node ids in graph order: modules first, then intersections.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .map(|m| m.serial_number.as_str())
            .chain(self.intersections.iter().map(|i| i.id.as_str()))
    }

    /// Reject layouts the graph cannot be built from.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.node_ids() {
            if id.is_empty() {
                return Err(validation_err!("layout contains an empty node id"));
            }
            if !seen.insert(id) {
                return Err(validation_err!("duplicate node id '{}'", id));
            }
        }

        for (index, road) in self.roads.iter().enumerate() {
            for end in [&road.from, &road.to] {
                if !seen.contains(end.as_str()) {
                    return Err(validation_err!(
                        "road {} references unknown node '{}'",
                        index,
                        end
                    ));
                }
            }
            if road.from == road.to {
                return Err(validation_err!("road {} loops on node '{}'", index, road.from));
            }
            if !road.length_mm.is_finite() || road.length_mm <= 0.0 {
                return Err(validation_err!(
                    "road {} has invalid length {}",
                    index,
                    road.length_mm
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Layout {
        Layout::default()
            .add_module(ModuleType::Hbw, "HBW-1")
            .add_intersection("1")
            .add_road("HBW-1", "1", 380.0, Direction::North)
    }

    #[test]
    fn test_wire_format() {
        let layout = Layout::from_json(
            r#"{
                "modules": [{"type": "HBW", "serialNumber": "HBW-1"}],
                "intersections": [{"id": "1"}],
                "roads": [{"from": "HBW-1", "to": "1", "lengthMm": 380, "direction": "NORTH"}]
            }"#,
        )
        .unwrap();
        assert_eq!(layout, small());

        let json: serde_json::Value = serde_json::from_str(&layout.to_json().unwrap()).unwrap();
        assert_eq!(json["roads"][0]["lengthMm"], 380.0);
        assert_eq!(json["modules"][0]["type"], "HBW");
    }

    #[test]
    fn test_validate_accepts_small_layout() {
        assert!(small().validate().is_ok());
        assert!(Layout::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let layout = small().add_intersection("HBW-1");
        let err = layout.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'HBW-1'"));
    }

    #[test]
    fn test_validate_rejects_unknown_endpoint() {
        let layout = small().add_road("1", "7", 100.0, Direction::East);
        assert!(layout.validate().unwrap_err().to_string().contains("'7'"));
    }

    #[test]
    fn test_validate_rejects_bad_roads() {
        assert!(small()
            .add_road("1", "1", 100.0, Direction::East)
            .validate()
            .is_err());
        assert!(small()
            .add_road("1", "HBW-1", 0.0, Direction::South)
            .validate()
            .is_err());
        assert!(small()
            .add_road("1", "HBW-1", f64::NAN, Direction::South)
            .validate()
            .is_err());
    }

    #[test]
    fn test_direction_opposite() {
        for d in [Direction::North, Direction::East, Direction::South, Direction::West] {
            assert_ne!(d.opposite(), d);
            assert_eq!(d.opposite().opposite(), d);
        }
    }
}
