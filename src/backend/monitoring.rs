use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use crate::backend::models::Floor;

#[derive(Debug, Clone)]
struct RequestSample {
    method: String,
    path: String,
    status_code: u16,
    duration_ms: f64,
}

pub struct MonitoringThresholds {
    pub error_rate_threshold: f64,
    pub latency_ms_threshold: f64,
    pub low_availability_threshold: i64,
}

/// Bounded history of recent request outcomes, used to compute error rate/latency
/// aggregates and to evaluate the three alert conditions.
pub struct MonitoringState {
    history_size: usize,
    thresholds: MonitoringThresholds,
    samples: Mutex<VecDeque<RequestSample>>,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub request_count: usize,
    pub error_rate: f64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub status_code_tally: std::collections::HashMap<u16, usize>,
}

#[derive(Serialize, Clone)]
pub struct Alert {
    pub code: String,
    pub detail: String,
}

impl MonitoringState {
    pub fn new(history_size: usize, thresholds: MonitoringThresholds) -> Self {
        MonitoringState {
            history_size,
            thresholds,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_request(&self, method: &str, path: &str, status_code: u16, duration_ms: f64) {
        let mut samples = self.samples.lock().expect("monitoring mutex poisoned");
        samples.push_back(RequestSample {
            method: method.to_string(),
            path: path.to_string(),
            status_code,
            duration_ms,
        });
        while samples.len() > self.history_size {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.samples.lock().expect("monitoring mutex poisoned");
        let request_count = samples.len();
        if request_count == 0 {
            return MetricsSnapshot {
                request_count: 0,
                error_rate: 0.0,
                average_latency_ms: 0.0,
                p95_latency_ms: 0.0,
                status_code_tally: Default::default(),
            };
        }

        let error_count = samples.iter().filter(|s| s.status_code >= 500).count();
        let mut latencies: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let average_latency_ms = latencies.iter().sum::<f64>() / request_count as f64;
        let p95_index = ((request_count as f64) * 0.95).ceil() as usize;
        let p95_latency_ms = latencies[p95_index.saturating_sub(1).min(request_count - 1)];

        let mut status_code_tally = std::collections::HashMap::new();
        for sample in samples.iter() {
            *status_code_tally.entry(sample.status_code).or_insert(0) += 1;
        }

        MetricsSnapshot {
            request_count,
            error_rate: error_count as f64 / request_count as f64,
            average_latency_ms,
            p95_latency_ms,
            status_code_tally,
        }
    }

    pub fn evaluate_alerts(&self, active_floors: &[Floor]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let snapshot = self.snapshot();

        if snapshot.request_count > 0 && snapshot.error_rate >= self.thresholds.error_rate_threshold
        {
            alerts.push(Alert {
                code: "HIGH_ERROR_RATE".to_string(),
                detail: format!("error rate {:.2} over last {} requests", snapshot.error_rate, snapshot.request_count),
            });
        }

        if snapshot.request_count > 0
            && snapshot.average_latency_ms >= self.thresholds.latency_ms_threshold
        {
            alerts.push(Alert {
                code: "HIGH_LATENCY".to_string(),
                detail: format!("average latency {:.1}ms over last {} requests", snapshot.average_latency_ms, snapshot.request_count),
            });
        }

        for floor in active_floors {
            if floor.available_slots() <= self.thresholds.low_availability_threshold {
                alerts.push(Alert {
                    code: "LOW_PARKING_AVAILABILITY".to_string(),
                    detail: format!("floor '{}' has {} slots available", floor.name, floor.available_slots()),
                });
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn floor(available: i64) -> Floor {
        Floor {
            id: 1,
            name: "Ground Floor".to_string(),
            description: None,
            total_slots: 20,
            current_vehicles: 20 - available,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn high_error_rate_alert_fires_above_threshold() {
        let state = MonitoringState::new(
            100,
            MonitoringThresholds {
                error_rate_threshold: 0.5,
                latency_ms_threshold: 10_000.0,
                low_availability_threshold: 0,
            },
        );
        state.record_request("GET", "/event", 500, 10.0);
        state.record_request("GET", "/event", 200, 10.0);
        let alerts = state.evaluate_alerts(&[]);
        assert!(alerts.iter().any(|a| a.code == "HIGH_ERROR_RATE"));
    }

    #[test]
    fn low_availability_alert_fires_at_threshold() {
        let state = MonitoringState::new(
            100,
            MonitoringThresholds {
                error_rate_threshold: 1.1,
                latency_ms_threshold: 10_000.0,
                low_availability_threshold: 5,
            },
        );
        let alerts = state.evaluate_alerts(&[floor(5)]);
        assert!(alerts.iter().any(|a| a.code == "LOW_PARKING_AVAILABILITY"));
    }

    #[test]
    fn no_alerts_on_empty_history_and_healthy_floors() {
        let state = MonitoringState::new(
            100,
            MonitoringThresholds {
                error_rate_threshold: 0.1,
                latency_ms_threshold: 500.0,
                low_availability_threshold: 2,
            },
        );
        let alerts = state.evaluate_alerts(&[floor(10)]);
        assert!(alerts.is_empty());
    }
}
