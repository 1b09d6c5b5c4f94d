use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::domain::{Direction, VehicleType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Floor {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub total_slots: i64,
    pub current_vehicles: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Floor {
    pub fn available_slots(&self) -> i64 {
        self.total_slots - self.current_vehicles
    }

    pub fn occupancy_percentage(&self) -> f64 {
        if self.total_slots == 0 {
            return 0.0;
        }
        (self.current_vehicles as f64 / self.total_slots as f64) * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub camera_id: String,
    pub floor_id: i64,
    pub track_id: String,
    pub vehicle_type: VehicleType,
    pub direction: Direction,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor(total: i64, current: i64) -> Floor {
        Floor {
            id: 1,
            name: "Ground Floor".to_string(),
            description: None,
            total_slots: total,
            current_vehicles: current,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_slots_and_occupancy_are_derived() {
        let f = floor(20, 5);
        assert_eq!(f.available_slots(), 15);
        assert_eq!(f.occupancy_percentage(), 25.0);
    }

    #[test]
    fn empty_floor_has_zero_occupancy_without_dividing_by_zero() {
        let f = floor(0, 0);
        assert_eq!(f.occupancy_percentage(), 0.0);
    }
}
