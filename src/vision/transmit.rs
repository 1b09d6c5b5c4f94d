use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::vision::crossing::Event;

/// The wire payload sent to the backend's `/event` endpoint. Normalization is
/// deterministic: the same `Event` always produces the same payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedPayload {
    pub camera_id: String,
    pub floor_id: i64,
    pub track_id: String,
    pub vehicle_type: String,
    pub direction: String,
    pub confidence: f32,
}

impl From<&Event> for NormalizedPayload {
    fn from(event: &Event) -> Self {
        NormalizedPayload {
            camera_id: event.camera_id.clone(),
            floor_id: event.floor_id,
            track_id: event.track_id.clone(),
            vehicle_type: event.vehicle_type.as_str().to_string(),
            direction: event.direction.as_str().to_string(),
            confidence: event.confidence,
        }
    }
}

pub struct FlushResult {
    pub flushed: usize,
    pub failed: usize,
}

/// Submits normalized event payloads to the backend over HTTP, retrying transient
/// failures and falling back to a durable on-disk queue when the backend is unreachable.
pub struct BackendClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    local_log_path: PathBuf,
    queue_path: PathBuf,
    http: reqwest::blocking::Client,
    queue: Mutex<Vec<NormalizedPayload>>,
    is_online: AtomicBool,
}

impl BackendClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
        local_log_path: PathBuf,
        queue_path: PathBuf,
    ) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        let queue = Self::load_queue_from_disk(&queue_path);

        BackendClient {
            base_url,
            api_key,
            timeout,
            retry_attempts,
            retry_delay,
            local_log_path,
            queue_path,
            http,
            queue: Mutex::new(queue),
            is_online: AtomicBool::new(true),
        }
    }

    fn load_queue_from_disk(queue_path: &PathBuf) -> Vec<NormalizedPayload> {
        let Ok(contents) = fs::read_to_string(queue_path) else {
            return Vec::new();
        };
        let mut queue = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<NormalizedPayload>(line) {
                Ok(payload) => queue.push(payload),
                Err(err) => {
                    tracing::warn!(line_no, %err, "skipping malformed queue line");
                }
            }
        }
        queue
    }

    fn rewrite_queue_file(&self, queue: &[NormalizedPayload]) {
        let mut contents = String::new();
        for payload in queue {
            if let Ok(line) = serde_json::to_string(payload) {
                contents.push_str(&line);
                contents.push('\n');
            }
        }
        if let Err(err) = fs::write(&self.queue_path, contents) {
            tracing::error!(%err, "failed to rewrite offline queue file");
        }
    }

    fn append_to_queue_file(&self, payload: &NormalizedPayload) {
        let Ok(line) = serde_json::to_string(payload) else {
            return;
        };
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{line}");
            }
            Err(err) => tracing::error!(%err, "failed to append to offline queue file"),
        }
    }

    fn log_event_locally(&self, event: &Event) {
        let Ok(line) = serde_json::to_string(&serde_json::json!({
            "logged_at": chrono::Utc::now().to_rfc3339(),
            "event": {
                "track_id": event.track_id,
                "direction": event.direction.as_str(),
                "timestamp": event.timestamp.to_rfc3339(),
                "camera_id": event.camera_id,
                "floor_id": event.floor_id,
                "vehicle_type": event.vehicle_type.as_str(),
                "confidence": event.confidence,
                "frame_id": event.frame_id,
            }
        })) else {
            return;
        };
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.local_log_path)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "{line}");
            }
            Err(err) => tracing::error!(%err, "failed to append to local event log"),
        }
    }

    pub fn process_event(&self, event: &Event) -> bool {
        self.log_event_locally(event);
        let payload = NormalizedPayload::from(event);
        self.submit(&payload, true)
    }

    fn post(&self, payload: &NormalizedPayload) -> Result<u16, reqwest::Error> {
        let url = format!("{}/event", self.base_url.trim_end_matches('/'));
        let mut request = self.http.post(url).json(payload).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request.send()?;
        Ok(response.status().as_u16())
    }

    pub fn submit(&self, payload: &NormalizedPayload, queue_on_failure: bool) -> bool {
        for attempt in 1..=self.retry_attempts.max(1) {
            match self.post(payload) {
                Ok(status) if status == 200 || status == 201 => {
                    self.is_online.store(true, Ordering::Relaxed);
                    return true;
                }
                Ok(status) => {
                    tracing::warn!(attempt, status, "event submission rejected");
                }
                Err(err) => {
                    tracing::warn!(attempt, %err, "event submission failed");
                }
            }
            if attempt < self.retry_attempts {
                std::thread::sleep(self.retry_delay);
            }
        }

        self.is_online.store(false, Ordering::Relaxed);
        if queue_on_failure {
            let mut queue = self.queue.lock().expect("offline queue mutex poisoned");
            queue.push(payload.clone());
            self.append_to_queue_file(payload);
        }
        false
    }

    pub fn flush_queued_events(&self, max: usize) -> FlushResult {
        let pending: Vec<NormalizedPayload> = {
            let queue = self.queue.lock().expect("offline queue mutex poisoned");
            queue.iter().take(max).cloned().collect()
        };

        let mut flushed = 0;
        let mut retained = Vec::new();
        for payload in &pending {
            if self.submit(payload, false) {
                flushed += 1;
            } else {
                retained.push(payload.clone());
            }
        }

        let failed = retained.len();
        let mut queue = self.queue.lock().expect("offline queue mutex poisoned");
        let leftover: Vec<NormalizedPayload> = queue.split_off(pending.len().min(queue.len()));
        *queue = retained.into_iter().chain(leftover).collect();
        self.rewrite_queue_file(&queue);

        FlushResult { flushed, failed }
    }

    pub fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        let healthy = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .map(|resp| resp.status().as_u16() == 200)
            .unwrap_or(false);
        self.is_online.store(healthy, Ordering::Relaxed);
        healthy
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("offline queue mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::domain::{Direction, VehicleType};

    fn sample_event() -> Event {
        Event {
            track_id: "t1".to_string(),
            direction: Direction::Exit,
            timestamp: chrono::Utc::now(),
            crossing_point: (200.0, 360.0),
            camera_id: "cam-1".to_string(),
            floor_id: 1,
            vehicle_type: VehicleType::Car,
            confidence: 0.9,
            frame_id: 2,
        }
    }

    #[test]
    fn normalized_payload_is_deterministic() {
        let event = sample_event();
        let a = NormalizedPayload::from(&event);
        let b = NormalizedPayload::from(&event);
        assert_eq!(a, b);
        assert_eq!(a.direction, "exit");
        assert_eq!(a.vehicle_type, "car");
    }

    #[test]
    fn failed_submission_queues_payload_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let client = BackendClient::new(
            "http://127.0.0.1:1".to_string(),
            None,
            Duration::from_millis(100),
            2,
            Duration::from_millis(1),
            dir.path().join("events_local.jsonl"),
            dir.path().join("events_queue.jsonl"),
        );

        let event = sample_event();
        let ok = client.process_event(&event);
        assert!(!ok);
        assert_eq!(client.queue_len(), 1);
        assert!(!client.is_online());

        let contents = fs::read_to_string(dir.path().join("events_queue.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn malformed_queue_lines_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let queue_path = dir.path().join("events_queue.jsonl");
        fs::write(&queue_path, "not json\n{\"camera_id\":\"cam-1\",\"floor_id\":1,\"track_id\":\"t1\",\"vehicle_type\":\"car\",\"direction\":\"exit\",\"confidence\":0.9}\n").unwrap();

        let client = BackendClient::new(
            "http://127.0.0.1:1".to_string(),
            None,
            Duration::from_millis(100),
            1,
            Duration::from_millis(1),
            dir.path().join("events_local.jsonl"),
            queue_path,
        );
        assert_eq!(client.queue_len(), 1);
    }
}
