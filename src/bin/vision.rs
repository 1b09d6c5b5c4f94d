use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_ledger::common::logging::{self, LogFormat};
use parking_ledger::common::telemetry;
use parking_ledger::vision::cameras_config::load_cameras_config;
use parking_ledger::vision::config::VisionSettings;
use parking_ledger::vision::crossing::CrossingEngineConfig;
use parking_ledger::vision::pipeline;

fn main() {
    let settings = VisionSettings::from_env();
    logging::init(&settings.log_level, LogFormat::from_env_value(&settings.log_format));
    let _sentry_guard = telemetry::init_sentry(
        settings.sentry_dsn.as_deref(),
        &settings.sentry_environment,
        settings.sentry_traces_sample_rate,
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_handle = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        running_handle.store(false, Ordering::Relaxed);
    }) {
        tracing::warn!(%err, "failed to install signal handler");
    }

    let crossing_config = resolve_crossing_config(&settings);

    if let Err(err) = pipeline::run(settings, crossing_config, running) {
        tracing::error!(%err, "vision pipeline exited with a fatal error");
        exit(1);
    }
    exit(0);
}

fn resolve_crossing_config(settings: &VisionSettings) -> CrossingEngineConfig {
    let cameras = load_cameras_config(std::path::Path::new("cameras.json")).unwrap_or_default();

    let mut config = CrossingEngineConfig {
        area_threshold: settings.event_area_threshold,
        duplicate_cooldown_frames: settings.event_duplicate_cooldown_frames,
        occlusion_tolerance_frames: settings.event_occlusion_tolerance_frames,
        min_crossing_distance_px: settings.event_min_crossing_distance_px,
        reversal_suppression_frames: settings.event_reversal_suppression_frames,
        ..CrossingEngineConfig::default()
    };

    if let Some(camera) = cameras.get(&settings.camera_id) {
        let ((ax, ay), (bx, by)) = camera.line_crossing_points;
        config.line_a = (ax as f64, ay as f64);
        config.line_b = (bx as f64, by as f64);
        config.direction_mapping = camera.direction_mapping.clone();
    }

    config
}
