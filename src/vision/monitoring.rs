use std::collections::HashMap;
use std::fs;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Initializing,
    Running,
    Degraded,
    Offline,
}

impl CameraStatus {
    pub fn from_consecutive_failures(failures: u32) -> CameraStatus {
        match failures {
            0 => CameraStatus::Running,
            1..=4 => CameraStatus::Degraded,
            _ => CameraStatus::Offline,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Totals {
    frames: u64,
    detections: u64,
    tracked_objects: u64,
    events_generated: u64,
    events_transmitted: u64,
    events_queued: u64,
}

/// Accumulates per-stage latency and throughput counters for one camera and
/// periodically writes a dashboard snapshot to disk.
pub struct PerformanceMonitor {
    dashboard_path: String,
    started_at: Instant,
    camera_id: String,
    status: CameraStatus,
    consecutive_read_failures: u32,
    totals: Totals,
    stage_latency_ms_sum: HashMap<&'static str, f64>,
}

impl PerformanceMonitor {
    pub fn new(dashboard_path: String, camera_id: String) -> Self {
        PerformanceMonitor {
            dashboard_path,
            started_at: Instant::now(),
            camera_id,
            status: CameraStatus::Initializing,
            consecutive_read_failures: 0,
            totals: Totals::default(),
            stage_latency_ms_sum: HashMap::new(),
        }
    }

    pub fn record_frame(&mut self) {
        self.totals.frames += 1;
    }

    pub fn record_detections(&mut self, count: usize) {
        self.totals.detections += count as u64;
    }

    pub fn record_tracked(&mut self, count: usize) {
        self.totals.tracked_objects += count as u64;
    }

    pub fn record_events(&mut self, generated: usize, transmitted: usize, queued: usize) {
        self.totals.events_generated += generated as u64;
        self.totals.events_transmitted += transmitted as u64;
        self.totals.events_queued += queued as u64;
    }

    pub fn record_stage_latency(&mut self, stage: &'static str, millis: f64) {
        *self.stage_latency_ms_sum.entry(stage).or_insert(0.0) += millis;
    }

    pub fn record_read_outcome(&mut self, ok: bool) {
        if ok {
            self.consecutive_read_failures = 0;
        } else {
            self.consecutive_read_failures += 1;
        }
        self.status = CameraStatus::from_consecutive_failures(self.consecutive_read_failures);
    }

    pub fn mark_running(&mut self) {
        self.status = CameraStatus::Running;
    }

    pub fn write_dashboard(&self, backend_online: bool, queue_size: usize) {
        let snapshot = serde_json::json!({
            "camera_id": self.camera_id,
            "status": self.status,
            "uptime_seconds": self.started_at.elapsed().as_secs(),
            "consecutive_read_failures": self.consecutive_read_failures,
            "backend_online": backend_online,
            "queue_size": queue_size,
            "totals": self.totals,
            "stage_latency_ms_sum": self.stage_latency_ms_sum,
        });
        if let Ok(body) = serde_json::to_string_pretty(&snapshot) {
            if let Err(err) = fs::write(&self.dashboard_path, body) {
                tracing::error!(%err, "failed to write monitoring dashboard snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_escalates_with_consecutive_failures() {
        assert_eq!(CameraStatus::from_consecutive_failures(0), CameraStatus::Running);
        assert_eq!(CameraStatus::from_consecutive_failures(1), CameraStatus::Degraded);
        assert_eq!(CameraStatus::from_consecutive_failures(5), CameraStatus::Offline);
    }

    #[test]
    fn record_read_outcome_resets_on_success() {
        let mut monitor = PerformanceMonitor::new("dashboard.json".to_string(), "cam-1".to_string());
        monitor.record_read_outcome(false);
        monitor.record_read_outcome(false);
        assert_eq!(monitor.status, CameraStatus::Degraded);
        monitor.record_read_outcome(true);
        assert_eq!(monitor.status, CameraStatus::Running);
    }
}
