use std::env;
use std::fmt;
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "invalid env value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Runtime configuration for one vision-pipeline process, resolved from the environment
/// with typed defaults. One process instance is created per camera.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub camera_id: String,
    pub floor_id: i64,

    pub video_source: String,
    pub video_source_type: String,
    pub video_width: Option<i32>,
    pub video_height: Option<i32>,
    pub video_target_fps: f64,
    pub video_reconnect_delay: Duration,

    pub model_path: String,
    pub model_config_path: String,
    pub model_conf_threshold: f32,
    pub model_iou_threshold: f32,

    pub tracker_max_age: u64,
    pub tracker_track_buffer: u32,
    pub tracker_match_threshold: f32,

    pub event_area_threshold: f64,
    pub event_duplicate_cooldown_frames: u64,
    pub event_occlusion_tolerance_frames: u64,
    pub event_min_crossing_distance_px: f64,
    pub event_reversal_suppression_frames: u64,

    pub low_light_enabled: bool,
    pub low_light_dark_threshold: f64,
    pub low_light_factor: f32,
    pub low_light_min_conf: f32,

    pub monitor_dashboard_path: String,
    pub monitor_snapshot_interval_frames: u64,

    pub backend_api_url: String,
    pub backend_api_key: Option<String>,
    pub backend_timeout_seconds: u64,
    pub backend_retry_attempts: u32,
    pub backend_retry_delay: Duration,

    pub vision_frame_dir: String,
    pub events_local_log_path: String,
    pub events_queue_path: String,

    pub sentry_dsn: Option<String>,
    pub sentry_environment: String,
    pub sentry_traces_sample_rate: f32,

    pub log_level: String,
    pub log_format: String,
}

impl Default for VisionSettings {
    fn default() -> Self {
        VisionSettings {
            camera_id: "cam-1".to_string(),
            floor_id: 1,

            video_source: "0".to_string(),
            video_source_type: "file".to_string(),
            video_width: None,
            video_height: None,
            video_target_fps: 15.0,
            video_reconnect_delay: Duration::from_secs(5),

            model_path: "models/yolov8n.onnx".to_string(),
            model_config_path: String::new(),
            model_conf_threshold: 0.35,
            model_iou_threshold: 0.45,

            tracker_max_age: 30,
            tracker_track_buffer: 30,
            tracker_match_threshold: 0.3,

            event_area_threshold: 100.0,
            event_duplicate_cooldown_frames: 30,
            event_occlusion_tolerance_frames: 15,
            event_min_crossing_distance_px: 5.0,
            event_reversal_suppression_frames: 45,

            low_light_enabled: true,
            low_light_dark_threshold: 60.0,
            low_light_factor: 0.7,
            low_light_min_conf: 0.2,

            monitor_dashboard_path: "monitoring_dashboard.json".to_string(),
            monitor_snapshot_interval_frames: 60,

            backend_api_url: "http://127.0.0.1:8000".to_string(),
            backend_api_key: None,
            backend_timeout_seconds: 5,
            backend_retry_attempts: 3,
            backend_retry_delay: Duration::from_secs(2),

            vision_frame_dir: "frames".to_string(),
            events_local_log_path: "events_local.jsonl".to_string(),
            events_queue_path: "events_queue.jsonl".to_string(),

            sentry_dsn: None,
            sentry_environment: "development".to_string(),
            sentry_traces_sample_rate: 0.0,

            log_level: "info".to_string(),
            log_format: "plain".to_string(),
        }
    }
}

impl VisionSettings {
    pub fn from_env() -> VisionSettings {
        let defaults = VisionSettings::default();
        VisionSettings {
            camera_id: env_string("CAMERA_ID", &defaults.camera_id),
            floor_id: env_parsed("FLOOR_ID", defaults.floor_id),

            video_source: env_string("VIDEO_SOURCE", &defaults.video_source),
            video_source_type: env_string("VIDEO_SOURCE_TYPE", &defaults.video_source_type),
            video_width: env::var("VIDEO_WIDTH").ok().and_then(|v| v.parse().ok()),
            video_height: env::var("VIDEO_HEIGHT").ok().and_then(|v| v.parse().ok()),
            video_target_fps: env_parsed("VIDEO_TARGET_FPS", defaults.video_target_fps),
            video_reconnect_delay: Duration::from_secs(env_parsed(
                "VIDEO_RECONNECT_DELAY_SECONDS",
                defaults.video_reconnect_delay.as_secs(),
            )),

            model_path: env_string("MODEL_PATH", &defaults.model_path),
            model_config_path: env_string("MODEL_CONFIG_PATH", &defaults.model_config_path),
            model_conf_threshold: env_parsed(
                "MODEL_CONF_THRESHOLD",
                defaults.model_conf_threshold,
            ),
            model_iou_threshold: env_parsed("MODEL_IOU_THRESHOLD", defaults.model_iou_threshold),

            tracker_max_age: env_parsed("TRACKER_MAX_AGE", defaults.tracker_max_age),
            tracker_track_buffer: env_parsed(
                "TRACKER_TRACK_BUFFER",
                defaults.tracker_track_buffer,
            ),
            tracker_match_threshold: env_parsed(
                "TRACKER_MATCH_THRESHOLD",
                defaults.tracker_match_threshold,
            ),

            event_area_threshold: env_parsed(
                "EVENT_AREA_THRESHOLD",
                defaults.event_area_threshold,
            ),
            event_duplicate_cooldown_frames: env_parsed(
                "EVENT_DUPLICATE_COOLDOWN_FRAMES",
                defaults.event_duplicate_cooldown_frames,
            ),
            event_occlusion_tolerance_frames: env_parsed(
                "EVENT_OCCLUSION_TOLERANCE_FRAMES",
                defaults.event_occlusion_tolerance_frames,
            ),
            event_min_crossing_distance_px: env_parsed(
                "EVENT_MIN_CROSSING_DISTANCE_PX",
                defaults.event_min_crossing_distance_px,
            ),
            event_reversal_suppression_frames: env_parsed(
                "EVENT_REVERSAL_SUPPRESSION_FRAMES",
                defaults.event_reversal_suppression_frames,
            ),

            low_light_enabled: env_parsed("LOW_LIGHT_ENABLED", defaults.low_light_enabled),
            low_light_dark_threshold: env_parsed(
                "LOW_LIGHT_DARK_THRESHOLD",
                defaults.low_light_dark_threshold,
            ),
            low_light_factor: env_parsed("LOW_LIGHT_FACTOR", defaults.low_light_factor),
            low_light_min_conf: env_parsed("LOW_LIGHT_MIN_CONF", defaults.low_light_min_conf),

            monitor_dashboard_path: env_string(
                "MONITOR_DASHBOARD_PATH",
                &defaults.monitor_dashboard_path,
            ),
            monitor_snapshot_interval_frames: env_parsed(
                "MONITOR_SNAPSHOT_INTERVAL_FRAMES",
                defaults.monitor_snapshot_interval_frames,
            ),

            backend_api_url: env_string("BACKEND_API_URL", &defaults.backend_api_url),
            backend_api_key: env::var("BACKEND_API_KEY").ok(),
            backend_timeout_seconds: env_parsed(
                "BACKEND_TIMEOUT_SECONDS",
                defaults.backend_timeout_seconds,
            ),
            backend_retry_attempts: env_parsed(
                "BACKEND_RETRY_ATTEMPTS",
                defaults.backend_retry_attempts,
            ),
            backend_retry_delay: Duration::from_secs(env_parsed(
                "BACKEND_RETRY_DELAY_SECONDS",
                defaults.backend_retry_delay.as_secs(),
            )),

            vision_frame_dir: env_string("VISION_FRAME_DIR", &defaults.vision_frame_dir),
            events_local_log_path: env_string(
                "EVENTS_LOCAL_LOG_PATH",
                &defaults.events_local_log_path,
            ),
            events_queue_path: env_string("EVENTS_QUEUE_PATH", &defaults.events_queue_path),

            sentry_dsn: env::var("SENTRY_DSN").ok(),
            sentry_environment: env_string("SENTRY_ENVIRONMENT", &defaults.sentry_environment),
            sentry_traces_sample_rate: env_parsed(
                "SENTRY_TRACES_SAMPLE_RATE",
                defaults.sentry_traces_sample_rate,
            ),

            log_level: env_string("LOG_LEVEL", &defaults.log_level),
            log_format: env_string("LOG_FORMAT", &defaults.log_format),
        }
    }
}

impl fmt::Display for VisionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "camera={} floor={} source={} ({}) fps={} model={} backend={}",
            self.camera_id,
            self.floor_id,
            self.video_source,
            self.video_source_type,
            self.video_target_fps,
            self.model_path,
            self.backend_api_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let settings = VisionSettings::default();
        assert!(settings.video_target_fps > 0.0);
        assert!(settings.low_light_min_conf <= settings.model_conf_threshold);
    }
}
