use std::thread;
use std::time::{Duration, Instant};

use opencv::core::Mat;
use opencv::videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceType {
    File,
    Rtsp,
}

impl SourceType {
    pub fn from_str_loose(s: &str) -> SourceType {
        match s.to_ascii_lowercase().as_str() {
            "rtsp" => SourceType::Rtsp,
            _ => SourceType::File,
        }
    }
}

pub struct FrameSourceConfig {
    pub source: String,
    pub source_type: SourceType,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub reconnect_delay: Duration,
}

/// Opens a video source and paces frame delivery to the configured FPS. On a file
/// source, EOF is terminal. On an RTSP source, a read failure triggers one
/// close-reopen-retry cycle per call.
pub struct OpenCvFrameSource {
    config: FrameSourceConfig,
    capture: Option<VideoCapture>,
}

impl OpenCvFrameSource {
    pub fn new(config: FrameSourceConfig) -> Self {
        OpenCvFrameSource {
            config,
            capture: None,
        }
    }

    pub fn open(&mut self) -> bool {
        let capture = match VideoCapture::from_file(&self.config.source, videoio::CAP_FFMPEG) {
            Ok(cap) => cap,
            Err(err) => {
                tracing::error!(%err, source = %self.config.source, "failed to open video source");
                return false;
            }
        };
        let opened = VideoCaptureTraitConst::is_opened(&capture).unwrap_or(false);
        if !opened {
            tracing::error!(source = %self.config.source, "video source did not open");
            return false;
        }

        let mut capture = capture;
        if let Some(width) = self.config.width {
            let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        }
        if let Some(height) = self.config.height {
            let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
        }

        self.capture = Some(capture);
        true
    }

    pub fn read(&mut self) -> (bool, Option<Mat>) {
        let Some(capture) = self.capture.as_mut() else {
            return (false, None);
        };

        let mut frame = Mat::default();
        let ok = capture.read(&mut frame).unwrap_or(false);
        if ok && !frame.empty() {
            return (true, Some(frame));
        }

        match self.config.source_type {
            SourceType::File => {
                self.close();
                (false, None)
            }
            SourceType::Rtsp => {
                self.close();
                thread::sleep(self.config.reconnect_delay);
                if !self.open() {
                    return (false, None);
                }
                let Some(capture) = self.capture.as_mut() else {
                    return (false, None);
                };
                let mut retry_frame = Mat::default();
                let retry_ok = capture.read(&mut retry_frame).unwrap_or(false);
                if retry_ok && !retry_frame.empty() {
                    (true, Some(retry_frame))
                } else {
                    (false, None)
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.capture = None;
    }
}

/// Paces an outer loop to a target frame rate: the first tick arms the clock, every
/// subsequent tick sleeps the remaining budget of `1/fps` before returning.
pub struct FrameRateRegulator {
    frame_interval: Duration,
    last_tick: Option<Instant>,
}

impl FrameRateRegulator {
    pub fn new(target_fps: f64) -> Self {
        let fps = if target_fps > 0.0 { target_fps } else { 15.0 };
        FrameRateRegulator {
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            last_tick: None,
        }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
            }
            Some(last) => {
                let elapsed = now.duration_since(last);
                if elapsed < self.frame_interval {
                    thread::sleep(self.frame_interval - elapsed);
                }
                self.last_tick = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_defaults_to_file_on_unknown_value() {
        assert_eq!(SourceType::from_str_loose("weird"), SourceType::File);
        assert_eq!(SourceType::from_str_loose("RTSP"), SourceType::Rtsp);
    }

    #[test]
    fn regulator_arms_on_first_tick_without_sleeping() {
        let mut regulator = FrameRateRegulator::new(30.0);
        let start = Instant::now();
        regulator.tick();
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
