//! Object detection module using YOLO-family models via ONNX Runtime
//!
//! Wraps a YOLO ONNX export behind the queue-polling module protocol.
//! The detector itself supports configurable confidence/`IoU` thresholds,
//! class filtering, and non-maximum suppression over the standard 80 COCO
//! classes.
//!
//! # Example
//! ```no_run
//! use percept_object_detection::{Detector, DetectorConfig};
//! use image::open;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut detector = Detector::load("models/yolov8n.onnx")?;
//!
//! let img = open("image.jpg")?.to_rgb8();
//! let detections = detector.detect(&img, &DetectorConfig::default())?;
//!
//! for detection in detections {
//!     println!("{}: {:.2}%", detection.label, detection.confidence * 100.0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod handler;

use image::RgbImage;
use ndarray::Array;
use ort::{
    session::Session,
    value::TensorRef,
};
use percept_common::{BoundingBox, Prediction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Error types for the detector
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum confidence threshold for detections (0.0-1.0)
    pub confidence_threshold: f32,
    /// `IoU` threshold for non-maximum suppression (0.0-1.0)
    pub iou_threshold: f32,
    /// Restrict detections to these class ids (None = all classes)
    pub classes: Option<Vec<usize>>,
    /// Maximum number of detections to return per image
    pub max_detections: usize,
    /// Model input size (YOLO default is 640x640)
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            classes: None,
            max_detections: 300,
            input_size: 640,
        }
    }
}

/// One detected object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// COCO class id (0-79)
    pub class_id: usize,
    /// Human-readable class label
    pub label: String,
    /// Confidence score (0-1)
    pub confidence: f32,
    /// Bounding box with normalized coordinates
    pub bbox: BoundingBox,
}

impl From<Detection> for Prediction {
    fn from(detection: Detection) -> Self {
        Prediction {
            label: detection.label,
            confidence: detection.confidence,
            bbox: detection.bbox,
        }
    }
}

/// Object detector over a YOLO ONNX session
#[derive(Debug)]
pub struct Detector {
    session: Session,
}

impl Detector {
    /// Load the ONNX model at `model_path`
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, DetectError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(DetectError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        info!("Loading YOLO model from {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?;
        info!("YOLO model loaded");

        Ok(Self { session })
    }

    /// Detect objects in a single image
    pub fn detect(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        debug!(
            "Running object detection on {}x{} image",
            image.width(),
            image.height()
        );

        let tensor = image_tensor(image, config.input_size);
        let input = TensorRef::from_array_view(tensor.view())
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        // Output shape: (batch, 4 box coords + classes, anchors)
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::Inference(format!("failed to extract tensor: {e}")))?;

        let dims = shape.as_ref();
        if dims.len() != 3 {
            return Err(DetectError::Inference(format!(
                "expected 3D output tensor, got {}D",
                dims.len()
            )));
        }
        let num_features = dims[1] as usize;
        let num_anchors = dims[2] as usize;
        if num_features < 5 {
            return Err(DetectError::Inference(format!(
                "output has {num_features} features per anchor, need at least 5"
            )));
        }

        let raw = decode_boxes(data, num_features, num_anchors, config);
        debug!("Raw detections before NMS: {}", raw.len());

        let kept = non_max_suppression(raw, config.iou_threshold);
        let detections: Vec<_> = kept.into_iter().take(config.max_detections).collect();

        info!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// Resize to the model input and normalize to CHW floats in [0, 1]
fn image_tensor(image: &RgbImage, input_size: u32) -> Array<f32, ndarray::Dim<[usize; 4]>> {
    let resized = image::imageops::resize(
        image,
        input_size,
        input_size,
        image::imageops::FilterType::Triangle,
    );

    let mut tensor = Array::zeros((1, 3, input_size as usize, input_size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            tensor[[0, channel, y, x]] = f32::from(pixel[channel]) / 255.0;
        }
    }
    tensor
}

/// Walk the anchor-major output tensor and keep boxes over the confidence
/// threshold. Data layout is `[feature][anchor]`, flattened.
fn decode_boxes(
    data: &[f32],
    num_features: usize,
    num_anchors: usize,
    config: &DetectorConfig,
) -> Vec<Detection> {
    let num_classes = num_features - 4;
    let feature = |f: usize, a: usize| data[f * num_anchors + a];

    let mut detections = Vec::with_capacity(num_anchors / 10);
    for anchor in 0..num_anchors {
        let mut best_class = 0_usize;
        let mut best_score = 0.0_f32;
        for class in 0..num_classes {
            let score = feature(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }

        if best_score < config.confidence_threshold {
            continue;
        }
        if let Some(classes) = &config.classes {
            if !classes.contains(&best_class) {
                continue;
            }
        }

        // Center format to corner format, normalized to the input size
        let scale = config.input_size as f32;
        let (cx, cy, w, h) = (
            feature(0, anchor),
            feature(1, anchor),
            feature(2, anchor),
            feature(3, anchor),
        );
        let bbox = BoundingBox::new(
            (cx - w / 2.0) / scale,
            (cy - h / 2.0) / scale,
            w / scale,
            h / scale,
        );

        detections.push(Detection {
            class_id: best_class,
            label: label_for(best_class).to_string(),
            confidence: best_score,
            bbox,
        });
    }
    detections
}

/// Greedy per-class non-maximum suppression, highest confidence first
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id
                && kept.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }

    debug!("Detections after NMS: {}", keep.len());
    keep
}

/// COCO class label for `class_id` (0-79)
#[must_use]
pub fn label_for(class_id: usize) -> &'static str {
    COCO_LABELS.get(class_id).unwrap_or(&"unknown")
}

/// The 80 COCO object classes, in model output order
pub const COCO_LABELS: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];
