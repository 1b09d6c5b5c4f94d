use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Vehicle classes recognized by the detector and accepted by event ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::Bus => "bus",
            VehicleType::Truck => "truck",
        }
    }

    /// COCO class id used by the pinned detection model.
    pub fn from_coco_class_id(class_id: usize) -> Option<VehicleType> {
        match class_id {
            2 => Some(VehicleType::Car),
            3 => Some(VehicleType::Motorcycle),
            5 => Some(VehicleType::Bus),
            7 => Some(VehicleType::Truck),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "motorcycle" => Ok(VehicleType::Motorcycle),
            "bus" => Ok(VehicleType::Bus),
            "truck" => Ok(VehicleType::Truck),
            other => Err(format!("unknown vehicle type '{other}'")),
        }
    }
}

/// Semantic direction a crossing is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Entry => Direction::Exit,
            Direction::Exit => Direction::Entry,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(Direction::Entry),
            "exit" => Ok(Direction::Exit),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_type_round_trips_through_str() {
        for v in [
            VehicleType::Car,
            VehicleType::Motorcycle,
            VehicleType::Bus,
            VehicleType::Truck,
        ] {
            assert_eq!(VehicleType::from_str(v.as_str()).unwrap(), v);
        }
    }

    #[test]
    fn vehicle_type_maps_coco_ids() {
        assert_eq!(VehicleType::from_coco_class_id(2), Some(VehicleType::Car));
        assert_eq!(VehicleType::from_coco_class_id(0), None);
    }

    #[test]
    fn direction_opposite_is_involutive() {
        assert_eq!(Direction::Entry.opposite(), Direction::Exit);
        assert_eq!(Direction::Exit.opposite().opposite(), Direction::Exit);
    }

    #[test]
    fn direction_rejects_unknown_strings() {
        assert!(Direction::from_str("sideways").is_err());
    }
}
