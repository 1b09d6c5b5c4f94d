use std::env;

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

pub fn parse_csv_setting(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub project_name: String,
    pub database_url: String,

    pub api_keys: Vec<String>,
    pub api_rate_limit: u32,
    pub api_rate_limit_window_seconds: u64,

    pub cors_allow_origins: Vec<String>,
    pub cors_allow_methods: Vec<String>,
    pub cors_allow_headers: Vec<String>,

    pub sentry_dsn: Option<String>,
    pub sentry_environment: String,
    pub sentry_traces_sample_rate: f32,

    pub monitoring_history_size: usize,
    pub monitoring_error_rate_threshold: f64,
    pub monitoring_latency_ms_threshold: f64,
    pub monitoring_low_availability_threshold: i64,

    pub vision_frame_dir: String,
    pub event_idempotency_window_seconds: i64,

    pub bind_address: String,
    pub bind_port: u16,

    pub log_level: String,
    pub log_format: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            project_name: "SmartPark".to_string(),
            database_url: "sqlite://smartpark.db".to_string(),

            api_keys: vec!["dev-key".to_string()],
            api_rate_limit: 120,
            api_rate_limit_window_seconds: 60,

            cors_allow_origins: vec!["*".to_string()],
            cors_allow_methods: vec!["*".to_string()],
            cors_allow_headers: vec!["*".to_string()],

            sentry_dsn: None,
            sentry_environment: "development".to_string(),
            sentry_traces_sample_rate: 0.0,

            monitoring_history_size: 500,
            monitoring_error_rate_threshold: 0.1,
            monitoring_latency_ms_threshold: 500.0,
            monitoring_low_availability_threshold: 5,

            vision_frame_dir: "../vision/frames".to_string(),
            event_idempotency_window_seconds: 5,

            bind_address: "0.0.0.0".to_string(),
            bind_port: 8000,

            log_level: "info".to_string(),
            log_format: "plain".to_string(),
        }
    }
}

impl BackendSettings {
    pub fn from_env() -> BackendSettings {
        let defaults = BackendSettings::default();
        BackendSettings {
            project_name: env_string("PROJECT_NAME", &defaults.project_name),
            database_url: env_string("DATABASE_URL", &defaults.database_url),

            api_keys: env::var("API_KEYS")
                .ok()
                .map(|raw| parse_csv_setting(&raw))
                .unwrap_or(defaults.api_keys),
            api_rate_limit: env_parsed("API_RATE_LIMIT", defaults.api_rate_limit),
            api_rate_limit_window_seconds: env_parsed(
                "API_RATE_LIMIT_WINDOW_SECONDS",
                defaults.api_rate_limit_window_seconds,
            ),

            cors_allow_origins: env::var("CORS_ALLOW_ORIGINS")
                .ok()
                .map(|raw| parse_csv_setting(&raw))
                .unwrap_or(defaults.cors_allow_origins),
            cors_allow_methods: env::var("CORS_ALLOW_METHODS")
                .ok()
                .map(|raw| parse_csv_setting(&raw))
                .unwrap_or(defaults.cors_allow_methods),
            cors_allow_headers: env::var("CORS_ALLOW_HEADERS")
                .ok()
                .map(|raw| parse_csv_setting(&raw))
                .unwrap_or(defaults.cors_allow_headers),

            sentry_dsn: env::var("SENTRY_DSN").ok(),
            sentry_environment: env_string("SENTRY_ENVIRONMENT", &defaults.sentry_environment),
            sentry_traces_sample_rate: env_parsed(
                "SENTRY_TRACES_SAMPLE_RATE",
                defaults.sentry_traces_sample_rate,
            ),

            monitoring_history_size: env_parsed(
                "MONITORING_HISTORY_SIZE",
                defaults.monitoring_history_size,
            ),
            monitoring_error_rate_threshold: env_parsed(
                "MONITORING_ERROR_RATE_THRESHOLD",
                defaults.monitoring_error_rate_threshold,
            ),
            monitoring_latency_ms_threshold: env_parsed(
                "MONITORING_LATENCY_MS_THRESHOLD",
                defaults.monitoring_latency_ms_threshold,
            ),
            monitoring_low_availability_threshold: env_parsed(
                "MONITORING_LOW_AVAILABILITY_THRESHOLD",
                defaults.monitoring_low_availability_threshold,
            ),

            vision_frame_dir: env_string("VISION_FRAME_DIR", &defaults.vision_frame_dir),
            event_idempotency_window_seconds: env_parsed(
                "EVENT_IDEMPOTENCY_WINDOW_SECONDS",
                defaults.event_idempotency_window_seconds,
            ),

            bind_address: env_string("BIND_ADDRESS", &defaults.bind_address),
            bind_port: env_parsed("BIND_PORT", defaults.bind_port),

            log_level: env_string("LOG_LEVEL", &defaults.log_level),
            log_format: env_string("LOG_FORMAT", &defaults.log_format),
        }
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        matches!(path, "/" | "/health" | "/health/live" | "/health/ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_setting_trims_and_drops_empties() {
        assert_eq!(
            parse_csv_setting(" a, b ,,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn public_paths_match_health_and_root() {
        let settings = BackendSettings::default();
        assert!(settings.is_public_path("/health/ready"));
        assert!(!settings.is_public_path("/event"));
    }
}
