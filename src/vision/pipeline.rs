use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::vision::config::VisionSettings;
use crate::vision::crossing::{CrossingEngine, CrossingEngineConfig};
use crate::vision::detector::{Detect, DetectorConfig, YoloDetector};
use crate::vision::frame_source::{FrameRateRegulator, FrameSourceConfig, OpenCvFrameSource, SourceType};
use crate::vision::monitoring::PerformanceMonitor;
use crate::vision::tracker::{Track, VehicleTracker};
use crate::vision::transmit::BackendClient;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to open video source: {0}")]
    SourceOpenFailed(String),
    #[error("failed to load detection model: {0}")]
    ModelLoadFailed(String),
}

/// Runs one camera's acquire → detect → track → crossing → transmit loop until the
/// source is exhausted or `running` is cleared (e.g. by a SIGINT handler).
pub fn run(settings: VisionSettings, crossing_config: CrossingEngineConfig, running: Arc<AtomicBool>) -> Result<(), PipelineError> {
    tracing::info!(%settings, "starting vision pipeline");

    let mut frame_source = OpenCvFrameSource::new(FrameSourceConfig {
        source: settings.video_source.clone(),
        source_type: SourceType::from_str_loose(&settings.video_source_type),
        width: settings.video_width,
        height: settings.video_height,
        reconnect_delay: settings.video_reconnect_delay,
    });
    if !frame_source.open() {
        return Err(PipelineError::SourceOpenFailed(settings.video_source.clone()));
    }

    let mut detector = YoloDetector::new(DetectorConfig {
        model_path: settings.model_path.clone(),
        model_config_path: settings.model_config_path.clone(),
        base_conf_threshold: settings.model_conf_threshold,
        iou_threshold: settings.model_iou_threshold,
        low_light_enabled: settings.low_light_enabled,
        dark_threshold: settings.low_light_dark_threshold,
        low_light_factor: settings.low_light_factor,
        low_light_min_conf: settings.low_light_min_conf,
    })
    .map_err(PipelineError::ModelLoadFailed)?;
    detector.warm_up(
        settings.video_width.unwrap_or(1280),
        settings.video_height.unwrap_or(720),
    );

    let mut tracker = VehicleTracker::new(
        settings.tracker_max_age as usize,
        settings.tracker_match_threshold,
        settings.tracker_track_buffer as usize,
        settings.video_target_fps as f32,
    );

    let mut crossing_engine = CrossingEngine::new(
        crossing_config,
        settings.camera_id.clone(),
        settings.floor_id,
    );

    let backend = BackendClient::new(
        settings.backend_api_url.clone(),
        settings.backend_api_key.clone(),
        std::time::Duration::from_secs(settings.backend_timeout_seconds),
        settings.backend_retry_attempts,
        settings.backend_retry_delay,
        PathBuf::from(&settings.events_local_log_path),
        PathBuf::from(&settings.events_queue_path),
    );

    let mut monitor = PerformanceMonitor::new(settings.monitor_dashboard_path.clone(), settings.camera_id.clone());
    let mut regulator = FrameRateRegulator::new(settings.video_target_fps);

    let mut frame_id: u64 = 0;
    while running.load(Ordering::Relaxed) {
        regulator.tick();

        let read_start = Instant::now();
        let (ok, frame) = frame_source.read();
        monitor.record_stage_latency("acquire", read_start.elapsed().as_secs_f64() * 1000.0);
        monitor.record_read_outcome(ok);

        let Some(frame) = frame else {
            if matches!(
                SourceType::from_str_loose(&settings.video_source_type),
                SourceType::File
            ) {
                tracing::info!(camera_id = %settings.camera_id, "video source exhausted, stopping");
                break;
            }
            continue;
        };

        monitor.record_frame();
        frame_id += 1;

        let detect_start = Instant::now();
        let detections = detector.detect(&frame);
        monitor.record_stage_latency("detect", detect_start.elapsed().as_secs_f64() * 1000.0);
        monitor.record_detections(detections.len());

        let track_start = Instant::now();
        let tracked = tracker.update(&detections, frame_id);
        monitor.record_stage_latency("track", track_start.elapsed().as_secs_f64() * 1000.0);
        monitor.record_tracked(tracked.len());

        let crossing_start = Instant::now();
        let events = crossing_engine.process_frame(&tracked, frame_id, chrono::Utc::now());
        monitor.record_stage_latency("crossing", crossing_start.elapsed().as_secs_f64() * 1000.0);

        let transmit_start = Instant::now();
        let mut transmitted = 0;
        let mut queued = 0;
        for event in &events {
            if backend.process_event(event) {
                transmitted += 1;
            } else {
                queued += 1;
            }
        }
        monitor.record_stage_latency("transmit", transmit_start.elapsed().as_secs_f64() * 1000.0);
        monitor.record_events(events.len(), transmitted, queued);

        if frame_id % settings.monitor_snapshot_interval_frames.max(1) == 0 {
            backend.health_check();
            let flush_result = backend.flush_queued_events(50);
            if flush_result.flushed > 0 {
                tracing::info!(flushed = flush_result.flushed, "flushed queued events");
            }
            crossing_engine.clear_old_tracks(settings.tracker_max_age, frame_id);
            monitor.write_dashboard(backend.is_online(), backend.queue_len());
        }
    }

    monitor.write_dashboard(backend.is_online(), backend.queue_len());
    frame_source.close();
    tracing::info!(camera_id = %settings.camera_id, "vision pipeline stopped");
    Ok(())
}
