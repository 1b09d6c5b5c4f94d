use tracing_subscriber::EnvFilter;

/// Log record format selector, controlled by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: &str) -> LogFormat {
        match value.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Plain,
        }
    }
}

/// Installs the global tracing subscriber for a binary. `default_level` is used when
/// `LOG_LEVEL` is unset or invalid; `format` picks between human-readable and JSON output.
pub fn init(default_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Json => subscriber.json().try_init(),
        LogFormat::Plain => subscriber.try_init(),
    };

    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}
