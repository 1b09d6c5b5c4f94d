use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::common::domain::{Direction, VehicleType};
use crate::vision::tracker::TrackedObject;

#[derive(Debug, Clone)]
pub struct CrossingEngineConfig {
    pub line_a: (f64, f64),
    pub line_b: (f64, f64),
    pub direction_mapping: HashMap<String, String>,
    pub area_threshold: f64,
    pub duplicate_cooldown_frames: u64,
    pub occlusion_tolerance_frames: u64,
    pub min_crossing_distance_px: f64,
    pub reversal_suppression_frames: u64,
}

impl Default for CrossingEngineConfig {
    fn default() -> Self {
        CrossingEngineConfig {
            line_a: (0.0, 360.0),
            line_b: (1280.0, 360.0),
            direction_mapping: HashMap::new(),
            area_threshold: 100.0,
            duplicate_cooldown_frames: 30,
            occlusion_tolerance_frames: 15,
            min_crossing_distance_px: 5.0,
            reversal_suppression_frames: 45,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub track_id: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub crossing_point: (f64, f64),
    pub camera_id: String,
    pub floor_id: i64,
    pub vehicle_type: VehicleType,
    pub confidence: f32,
    pub frame_id: u64,
}

#[derive(Debug, Clone)]
struct TrackHistoryEntry {
    position: (f64, f64),
    frame_id: u64,
}

#[derive(Debug, Clone)]
struct LastCrossing {
    direction: Direction,
    frame_id: u64,
}

/// Signed area of the triangle (A, B, P); sign flips when P crosses line AB.
fn side_of_line(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

fn default_geometric_mapping(key: &str) -> &'static str {
    match key {
        "down" | "right" => "entry",
        "up" | "left" => "exit",
        _ => "entry",
    }
}

/// Detects crossings of a configured line, maps them to entry/exit, and suppresses
/// duplicate and reversal noise. Owns per-camera `TrackState`/`LastCrossing` state.
pub struct CrossingEngine {
    config: CrossingEngineConfig,
    camera_id: String,
    floor_id: i64,
    track_history: HashMap<String, TrackHistoryEntry>,
    last_crossing: HashMap<String, LastCrossing>,
}

impl CrossingEngine {
    pub fn new(config: CrossingEngineConfig, camera_id: String, floor_id: i64) -> Self {
        CrossingEngine {
            config,
            camera_id,
            floor_id,
            track_history: HashMap::new(),
            last_crossing: HashMap::new(),
        }
    }

    pub fn process_frame(
        &mut self,
        tracked_objects: &[TrackedObject],
        frame_id: u64,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let mut events = Vec::new();

        for obj in tracked_objects {
            if obj.detection.bbox.area() < self.config.area_threshold {
                continue;
            }
            let curr = obj.detection.centroid;

            let prev_entry = match self.track_history.get(&obj.track_id) {
                Some(entry) => entry.clone(),
                None => {
                    self.track_history.insert(
                        obj.track_id.clone(),
                        TrackHistoryEntry {
                            position: curr,
                            frame_id,
                        },
                    );
                    continue;
                }
            };

            if frame_id.saturating_sub(prev_entry.frame_id)
                > self.config.occlusion_tolerance_frames
            {
                self.track_history.insert(
                    obj.track_id.clone(),
                    TrackHistoryEntry {
                        position: curr,
                        frame_id,
                    },
                );
                continue;
            }

            if euclidean(prev_entry.position, curr) < self.config.min_crossing_distance_px {
                self.track_history.insert(
                    obj.track_id.clone(),
                    TrackHistoryEntry {
                        position: curr,
                        frame_id,
                    },
                );
                continue;
            }

            let prev_side = side_of_line(self.config.line_a, self.config.line_b, prev_entry.position);
            let curr_side = side_of_line(self.config.line_a, self.config.line_b, curr);

            // update stored position for next frame regardless of crossing outcome
            self.track_history.insert(
                obj.track_id.clone(),
                TrackHistoryEntry {
                    position: curr,
                    frame_id,
                },
            );

            if prev_side * curr_side >= 0.0 {
                continue;
            }

            let dx_line = (self.config.line_b.0 - self.config.line_a.0).abs();
            let dy_line = (self.config.line_b.1 - self.config.line_a.1).abs();
            let dx = curr.0 - prev_entry.position.0;
            let dy = curr.1 - prev_entry.position.1;
            let geometric_key = if dx_line >= dy_line {
                if dy >= 0.0 { "down" } else { "up" }
            } else if dx >= 0.0 {
                "right"
            } else {
                "left"
            };

            let mapped = self
                .config
                .direction_mapping
                .get(geometric_key)
                .map(|s| s.as_str())
                .unwrap_or_else(|| default_geometric_mapping(geometric_key));
            let direction = mapped.parse::<Direction>().unwrap_or(Direction::Entry);

            if let Some(last) = self.last_crossing.get(&obj.track_id) {
                let within_reversal = frame_id.saturating_sub(last.frame_id)
                    <= self.config.reversal_suppression_frames;
                if last.direction == direction.opposite() && within_reversal {
                    continue;
                }
                let within_cooldown = frame_id.saturating_sub(last.frame_id)
                    <= self.config.duplicate_cooldown_frames;
                if within_cooldown {
                    continue;
                }
            }

            self.last_crossing.insert(
                obj.track_id.clone(),
                LastCrossing { direction, frame_id },
            );

            events.push(Event {
                track_id: obj.track_id.clone(),
                direction,
                timestamp: now,
                crossing_point: midpoint(prev_entry.position, curr),
                camera_id: self.camera_id.clone(),
                floor_id: self.floor_id,
                vehicle_type: obj.detection.vehicle_type,
                confidence: obj.detection.confidence,
                frame_id,
            });
        }

        events
    }

    pub fn clear_old_tracks(&mut self, max_age: u64, current_frame: u64) {
        self.track_history
            .retain(|_, entry| current_frame.saturating_sub(entry.frame_id) <= max_age);
        self.last_crossing
            .retain(|_, last| current_frame.saturating_sub(last.frame_id) <= max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::tracker::{Bbox, Detection};

    fn object_at(track_id: &str, x: f64, y: f64, frame_id: u64) -> TrackedObject {
        let bbox = Bbox {
            x1: (x - 10.0) as i32,
            y1: (y - 10.0) as i32,
            x2: (x + 10.0) as i32,
            y2: (y + 10.0) as i32,
        };
        TrackedObject {
            track_id: track_id.to_string(),
            frame_id,
            detection: Detection {
                vehicle_type: VehicleType::Car,
                confidence: 0.9,
                bbox,
                centroid: (x, y),
            },
        }
    }

    fn horizontal_line_engine() -> CrossingEngine {
        let mut mapping = HashMap::new();
        mapping.insert("down".to_string(), "exit".to_string());
        mapping.insert("up".to_string(), "entry".to_string());
        let config = CrossingEngineConfig {
            line_a: (0.0, 360.0),
            line_b: (1280.0, 360.0),
            direction_mapping: mapping,
            area_threshold: 100.0,
            duplicate_cooldown_frames: 30,
            occlusion_tolerance_frames: 15,
            min_crossing_distance_px: 5.0,
            reversal_suppression_frames: 45,
        };
        CrossingEngine::new(config, "cam-1".to_string(), 1)
    }

    #[test]
    fn two_frame_descent_emits_single_exit_event() {
        let mut engine = horizontal_line_engine();
        engine.process_frame(&[object_at("t1", 200.0, 350.0)], 1, Utc::now());
        let events = engine.process_frame(&[object_at("t1", 200.0, 370.0)], 2, Utc::now());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Exit);
        assert!((events[0].crossing_point.1 - 360.0).abs() < 1.0);
    }

    #[test]
    fn oscillation_within_cooldown_emits_exactly_one_event() {
        let mut engine = horizontal_line_engine();
        engine.process_frame(&[object_at("t1", 200.0, 350.0)], 1, Utc::now());
        let mut total_events = 0;
        total_events += engine
            .process_frame(&[object_at("t1", 200.0, 370.0)], 2, Utc::now())
            .len();
        // jitter back and forth across the line within the cooldown window
        total_events += engine
            .process_frame(&[object_at("t1", 200.0, 350.0)], 3, Utc::now())
            .len();
        total_events += engine
            .process_frame(&[object_at("t1", 200.0, 370.0)], 4, Utc::now())
            .len();

        assert_eq!(total_events, 1);
    }

    #[test]
    fn reversal_within_suppression_window_emits_no_event() {
        let mut mapping = HashMap::new();
        mapping.insert("down".to_string(), "exit".to_string());
        mapping.insert("up".to_string(), "entry".to_string());
        let config = CrossingEngineConfig {
            line_a: (0.0, 360.0),
            line_b: (1280.0, 360.0),
            direction_mapping: mapping,
            area_threshold: 100.0,
            duplicate_cooldown_frames: 10,
            occlusion_tolerance_frames: 100,
            min_crossing_distance_px: 5.0,
            reversal_suppression_frames: 45,
        };
        let mut engine = CrossingEngine::new(config, "cam-1".to_string(), 1);
        engine.process_frame(&[object_at("t1", 200.0, 340.0)], 1, Utc::now());
        let first = engine.process_frame(&[object_at("t1", 200.0, 380.0)], 2, Utc::now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].direction, Direction::Exit);

        // move far enough past the cooldown window to not be suppressed as a duplicate,
        // but still within the reversal suppression window, then reverse direction
        let reversed = engine.process_frame(&[object_at("t1", 200.0, 340.0)], 40, Utc::now());
        assert!(reversed.is_empty());
    }

    #[test]
    fn small_jitter_below_min_distance_is_ignored() {
        let mut engine = horizontal_line_engine();
        engine.process_frame(&[object_at("t1", 200.0, 358.0)], 1, Utc::now());
        let events = engine.process_frame(&[object_at("t1", 200.0, 361.0)], 2, Utc::now());
        assert!(events.is_empty());
    }

    #[test]
    fn occlusion_beyond_tolerance_resets_without_emitting() {
        let mut engine = horizontal_line_engine();
        engine.process_frame(&[object_at("t1", 200.0, 350.0)], 1, Utc::now());
        // frame_id jumps far beyond occlusion_tolerance_frames
        let events = engine.process_frame(&[object_at("t1", 200.0, 370.0)], 100, Utc::now());
        assert!(events.is_empty());
    }

    #[test]
    fn small_bbox_below_area_threshold_is_ignored() {
        let mut engine = horizontal_line_engine();
        let tiny_bbox = Bbox {
            x1: 195,
            y1: 345,
            x2: 200,
            y2: 350,
        };
        let tiny = TrackedObject {
            track_id: "t1".to_string(),
            frame_id: 1,
            detection: Detection {
                vehicle_type: VehicleType::Car,
                confidence: 0.9,
                bbox: tiny_bbox,
                centroid: (197.5, 347.5),
            },
        };
        let events = engine.process_frame(&[tiny], 1, Utc::now());
        assert!(events.is_empty());
    }

    #[test]
    fn clear_old_tracks_evicts_stale_entries() {
        let mut engine = horizontal_line_engine();
        engine.process_frame(&[object_at("t1", 200.0, 350.0)], 1, Utc::now());
        assert!(engine.track_history.contains_key("t1"));
        engine.clear_old_tracks(5, 100);
        assert!(!engine.track_history.contains_key("t1"));
    }
}
