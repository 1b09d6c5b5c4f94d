use std::collections::{HashMap, HashSet, VecDeque};

use mot_rs::mot::{SimpleBlob, SimpleTracker};
use mot_rs::utils::{Point, Rect};

use crate::common::domain::VehicleType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bbox {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        (self.width().max(0) as f64) * (self.height().max(0) as f64)
    }

    /// Per the detector contract, centroids are bbox midpoints (not bottom-center).
    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.x1 + self.x2) as f64 / 2.0,
            (self.y1 + self.y2) as f64 / 2.0,
        )
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub vehicle_type: VehicleType,
    pub confidence: f32,
    pub bbox: Bbox,
    pub centroid: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub track_id: String,
    pub detection: Detection,
    pub frame_id: u64,
}

#[derive(Debug, Clone)]
pub struct TrackState {
    pub track_id: String,
    pub vehicle_type: VehicleType,
    pub last_centroid: (f64, f64),
    pub last_seen_frame: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub history: VecDeque<(f64, f64)>,
}

pub trait Track {
    fn update(&mut self, detections: &[Detection], frame_id: u64) -> Vec<TrackedObject>;
    fn active_tracks(&self) -> &HashMap<String, TrackState>;
}

/// Applies the per-track lifecycle bookkeeping described by the tracker contract:
/// hit/miss counters, bounded history, eviction past `track_buffer` consecutive misses.
/// Kept free of the matching engine so it is testable in isolation.
fn apply_track_lifecycle(
    active: &mut HashMap<String, TrackState>,
    tracked: &[TrackedObject],
    frame_id: u64,
    track_buffer: usize,
) {
    let seen: HashSet<&str> = tracked.iter().map(|t| t.track_id.as_str()).collect();

    for t in tracked {
        let entry = active
            .entry(t.track_id.clone())
            .or_insert_with(|| TrackState {
                track_id: t.track_id.clone(),
                vehicle_type: t.detection.vehicle_type,
                last_centroid: t.detection.centroid,
                last_seen_frame: frame_id,
                hit_count: 0,
                miss_count: 0,
                history: VecDeque::new(),
            });
        entry.last_centroid = t.detection.centroid;
        entry.last_seen_frame = frame_id;
        entry.vehicle_type = t.detection.vehicle_type;
        entry.hit_count += 1;
        entry.miss_count = 0;
        entry.history.push_back(t.detection.centroid);
        while entry.history.len() > track_buffer {
            entry.history.pop_front();
        }
    }

    let mut evict = Vec::new();
    for (id, state) in active.iter_mut() {
        if !seen.contains(id.as_str()) {
            state.miss_count += 1;
            if state.miss_count as usize > track_buffer {
                evict.push(id.clone());
            }
        }
    }
    for id in evict {
        active.remove(&id);
    }
}

/// Wraps the external multi-object tracker behind the `Track` contract, synthesizing
/// ids if the engine call fails rather than propagating the error.
pub struct VehicleTracker {
    engine: SimpleTracker,
    track_buffer: usize,
    frame_interval_seconds: f32,
    active_tracks: HashMap<String, TrackState>,
}

impl VehicleTracker {
    pub fn new(max_no_match: usize, min_dist_threshold: f32, track_buffer: usize, fps: f32) -> Self {
        VehicleTracker {
            engine: SimpleTracker::new(max_no_match, min_dist_threshold),
            track_buffer,
            frame_interval_seconds: if fps > 0.0 { 1.0 / fps } else { 1.0 / 15.0 },
            active_tracks: HashMap::new(),
        }
    }
}

impl Track for VehicleTracker {
    fn update(&mut self, detections: &[Detection], frame_id: u64) -> Vec<TrackedObject> {
        let mut blobs: Vec<SimpleBlob> = detections
            .iter()
            .map(|d| {
                SimpleBlob::new_with_center_dt(
                    Point::new(d.centroid.0 as f32, d.centroid.1 as f32),
                    Rect::new(
                        d.bbox.x1 as f32,
                        d.bbox.y1 as f32,
                        d.bbox.width() as f32,
                        d.bbox.height() as f32,
                    ),
                    self.frame_interval_seconds,
                )
            })
            .collect();

        let tracked = match self.engine.match_objects(&mut blobs) {
            Ok(()) => blobs
                .iter()
                .zip(detections.iter())
                .map(|(blob, detection)| TrackedObject {
                    track_id: blob.get_id().to_string(),
                    detection: detection.clone(),
                    frame_id,
                })
                .collect::<Vec<_>>(),
            Err(err) => {
                tracing::warn!(%err, "tracker engine failed, falling back to synthetic ids");
                detections
                    .iter()
                    .enumerate()
                    .map(|(idx, detection)| TrackedObject {
                        track_id: format!("track_{frame_id}_{idx}"),
                        detection: detection.clone(),
                        frame_id,
                    })
                    .collect()
            }
        };

        apply_track_lifecycle(&mut self.active_tracks, &tracked, frame_id, self.track_buffer);
        tracked
    }

    fn active_tracks(&self) -> &HashMap<String, TrackState> {
        &self.active_tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection_at(x1: i32, y1: i32) -> Detection {
        let bbox = Bbox {
            x1,
            y1,
            x2: x1 + 20,
            y2: y1 + 20,
        };
        Detection {
            vehicle_type: VehicleType::Car,
            confidence: 0.9,
            centroid: bbox.midpoint(),
            bbox,
        }
    }

    fn tracked(id: &str, frame_id: u64, x1: i32, y1: i32) -> TrackedObject {
        TrackedObject {
            track_id: id.to_string(),
            detection: detection_at(x1, y1),
            frame_id,
        }
    }

    #[test]
    fn bbox_midpoint_is_the_centroid() {
        let bbox = Bbox {
            x1: 10,
            y1: 10,
            x2: 30,
            y2: 50,
        };
        assert_eq!(bbox.midpoint(), (20.0, 30.0));
        assert_eq!(bbox.area(), 800.0);
    }

    #[test]
    fn new_track_is_inserted_with_one_hit_and_no_misses() {
        let mut active = HashMap::new();
        apply_track_lifecycle(&mut active, &[tracked("t1", 1, 0, 0)], 1, 5);
        let state = active.get("t1").unwrap();
        assert_eq!(state.hit_count, 1);
        assert_eq!(state.miss_count, 0);
    }

    #[test]
    fn repeated_hits_accumulate_bounded_history() {
        let mut active = HashMap::new();
        for frame in 0..10u64 {
            apply_track_lifecycle(
                &mut active,
                &[tracked("t1", frame, frame as i32, 0)],
                frame,
                3,
            );
        }
        let state = active.get("t1").unwrap();
        assert_eq!(state.hit_count, 10);
        assert_eq!(state.history.len(), 3);
    }

    #[test]
    fn track_is_evicted_after_exceeding_miss_budget() {
        let mut active = HashMap::new();
        apply_track_lifecycle(&mut active, &[tracked("t1", 0, 0, 0)], 0, 2);
        assert!(active.contains_key("t1"));

        for frame in 1..=3u64 {
            apply_track_lifecycle(&mut active, &[], frame, 2);
        }
        assert!(
            !active.contains_key("t1"),
            "track should be evicted once miss_count exceeds track_buffer"
        );
    }

    #[test]
    fn track_survives_misses_within_budget() {
        let mut active = HashMap::new();
        apply_track_lifecycle(&mut active, &[tracked("t1", 0, 0, 0)], 0, 2);
        apply_track_lifecycle(&mut active, &[], 1, 2);
        apply_track_lifecycle(&mut active, &[], 2, 2);
        assert!(active.contains_key("t1"));
        assert_eq!(active.get("t1").unwrap().miss_count, 2);
    }
}
