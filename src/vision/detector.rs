use std::collections::HashSet;

use od_opencv::model_format::ModelFormat;
use od_opencv::model::{ModelTrait, ModelYOLO};
use opencv::core::{self, Mat, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::common::domain::VehicleType;
use crate::vision::tracker::{Bbox, Detection};

pub struct DetectorConfig {
    pub model_path: String,
    pub model_config_path: String,
    pub base_conf_threshold: f32,
    pub iou_threshold: f32,
    pub low_light_enabled: bool,
    pub dark_threshold: f64,
    pub low_light_factor: f32,
    pub low_light_min_conf: f32,
}

pub trait Detect {
    fn detect(&mut self, frame: &Mat) -> Vec<Detection>;
}

/// `base_conf` if brightness is at or above `dark_threshold`, else the
/// low-light-relaxed threshold floored at `low_light_min_conf`.
fn effective_conf_threshold(
    brightness: f64,
    dark_threshold: f64,
    base_conf: f32,
    low_light_factor: f32,
    low_light_min_conf: f32,
) -> f32 {
    if brightness >= dark_threshold {
        base_conf
    } else {
        low_light_min_conf.max(base_conf * low_light_factor)
    }
}

/// Wraps the YOLO-format detector: preprocess (optional low-light enhancement) →
/// infer (effective confidence threshold scaled by brightness) → postprocess
/// (class + confidence filtering, integer bbox truncation, midpoint centroid).
pub struct YoloDetector {
    model: Box<dyn ModelTrait>,
    config: DetectorConfig,
}

impl YoloDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, String> {
        let model = ModelYOLO::new_from_file(
            &config.model_path,
            if config.model_config_path.is_empty() {
                None
            } else {
                Some(&config.model_config_path)
            },
            (640, 640),
            ModelFormat::ONNX,
            -1,
            -1,
        )
        .map_err(|err| format!("failed to load detection model: {err}"))?;

        Ok(YoloDetector {
            model: Box::new(model),
            config,
        })
    }

    /// Runs a single inference pass on a blank frame so first-frame latency does not
    /// land on the camera's real first detection.
    pub fn warm_up(&mut self, width: i32, height: i32) {
        let blank = Mat::zeros(height, width, core::CV_8UC3)
            .and_then(|m| m.to_mat())
            .unwrap_or_else(|_| Mat::default());
        let _ = self.infer(&blank, self.config.base_conf_threshold);
    }

    fn estimate_brightness(&self, frame: &Mat) -> f64 {
        core::mean(frame, &core::no_array())
            .map(|scalar| (scalar[0] + scalar[1] + scalar[2]) / 3.0)
            .unwrap_or(255.0)
    }

    fn preprocess(&self, frame: &Mat, brightness: f64) -> Mat {
        if !self.config.low_light_enabled || brightness >= self.config.dark_threshold {
            return frame.clone();
        }

        let mut ycrcb = Mat::default();
        if imgproc::cvt_color(frame, &mut ycrcb, imgproc::COLOR_BGR2YCrCb, 0).is_err() {
            return frame.clone();
        }

        let mut channels: Vector<Mat> = Vector::new();
        if core::split(&ycrcb, &mut channels).is_err() || channels.len() != 3 {
            return frame.clone();
        }

        let mut equalized_y = Mat::default();
        if imgproc::equalize_hist(&channels.get(0).unwrap(), &mut equalized_y).is_err() {
            return frame.clone();
        }
        let _ = channels.set(0, equalized_y);

        let mut merged = Mat::default();
        if core::merge(&channels, &mut merged).is_err() {
            return frame.clone();
        }

        let mut bgr = Mat::default();
        if imgproc::cvt_color(&merged, &mut bgr, imgproc::COLOR_YCrCb2BGR, 0).is_err() {
            return frame.clone();
        }
        bgr
    }

    fn effective_conf_threshold(&self, brightness: f64) -> f32 {
        effective_conf_threshold(
            brightness,
            self.config.dark_threshold,
            self.config.base_conf_threshold,
            self.config.low_light_factor,
            self.config.low_light_min_conf,
        )
    }

    fn infer(
        &mut self,
        frame: &Mat,
        conf_threshold: f32,
    ) -> Result<(Vec<core::Rect>, Vec<usize>, Vec<f32>), String> {
        self.model
            .forward(frame, conf_threshold, self.config.iou_threshold)
            .map_err(|err| format!("{err}"))
    }

    fn postprocess(
        &self,
        bboxes: Vec<core::Rect>,
        class_ids: Vec<usize>,
        confidences: Vec<f32>,
        effective_conf: f32,
        target_classes: &HashSet<VehicleType>,
    ) -> Vec<Detection> {
        let mut detections = Vec::with_capacity(bboxes.len());
        for ((bbox, class_id), confidence) in bboxes
            .into_iter()
            .zip(class_ids.into_iter())
            .zip(confidences.into_iter())
        {
            if confidence < effective_conf {
                continue;
            }
            let Some(vehicle_type) = VehicleType::from_coco_class_id(class_id) else {
                continue;
            };
            if !target_classes.contains(&vehicle_type) {
                continue;
            }
            let rect = Bbox {
                x1: bbox.x,
                y1: bbox.y,
                x2: bbox.x + bbox.width,
                y2: bbox.y + bbox.height,
            };
            detections.push(Detection {
                vehicle_type,
                confidence,
                centroid: rect.midpoint(),
                bbox: rect,
            });
        }
        detections
    }
}

impl Detect for YoloDetector {
    fn detect(&mut self, frame: &Mat) -> Vec<Detection> {
        let target_classes: HashSet<VehicleType> = [
            VehicleType::Car,
            VehicleType::Motorcycle,
            VehicleType::Bus,
            VehicleType::Truck,
        ]
        .into_iter()
        .collect();

        let brightness = self.estimate_brightness(frame);
        let preprocessed = self.preprocess(frame, brightness);
        let effective_conf = self.effective_conf_threshold(brightness);

        match self.infer(&preprocessed, effective_conf) {
            Ok((bboxes, class_ids, confidences)) => {
                self.postprocess(bboxes, class_ids, confidences, effective_conf, &target_classes)
            }
            Err(err) => {
                tracing::warn!(%err, "detector inference failed, returning no detections");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_threshold_relaxes_in_low_light() {
        let bright = effective_conf_threshold(80.0, 60.0, 0.4, 0.5, 0.1);
        assert_eq!(bright, 0.4);

        let dark = effective_conf_threshold(10.0, 60.0, 0.4, 0.5, 0.1);
        assert_eq!(dark, 0.2);
    }

    #[test]
    fn effective_threshold_is_floored_at_low_light_min_conf() {
        let dark = effective_conf_threshold(10.0, 60.0, 0.1, 0.5, 0.2);
        assert_eq!(dark, 0.2);
    }
}
