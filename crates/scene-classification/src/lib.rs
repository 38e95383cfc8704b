//! Scene classification module
//!
//! Classifies a whole image into scene categories (street, forest, office,
//! ...) with a ResNet-style ONNX backbone. The label set is model-defined
//! and loaded from a text file shipped next to the model, one label per
//! line in output order.

pub mod handler;

use image::RgbImage;
use ndarray::Array;
use ort::{session::Session, value::TensorRef};
use percept_common::ClassConfidence;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Per-channel normalization used by ImageNet-trained backbones
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Error types for the classifier
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to load labels: {0}")]
    LabelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

/// Scene classifier over an ONNX session and its label table
pub struct SceneClassifier {
    session: Session,
    labels: Vec<String>,
    input_size: u32,
}

impl SceneClassifier {
    /// Load the model and its label file
    pub fn load(
        model_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> Result<Self, SceneError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(SceneError::ModelNotFound(model_path.display().to_string()));
        }

        let labels = load_labels(labels_path)?;

        info!(
            "Loading scene model from {} ({} labels)",
            model_path.display(),
            labels.len()
        );
        let session = Session::builder()
            .map_err(|e| SceneError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| SceneError::ModelLoad(e.to_string()))?;

        Ok(Self {
            session,
            labels,
            input_size: 224,
        })
    }

    /// Classify one image, returning the `top_k` best labels
    pub fn classify(
        &mut self,
        image: &RgbImage,
        top_k: usize,
    ) -> Result<Vec<ClassConfidence>, SceneError> {
        debug!(
            "Classifying {}x{} image, top_k={}",
            image.width(),
            image.height(),
            top_k
        );

        let tensor = image_tensor(image, self.input_size);
        let input = TensorRef::from_array_view(tensor.view())
            .map_err(|e| SceneError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| SceneError::Inference(e.to_string()))?;

        let (shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SceneError::Inference(format!("failed to extract tensor: {e}")))?;

        // Expect (1, num_classes); tolerate a flat (num_classes,) export
        let num_classes = shape.as_ref().iter().product::<i64>() as usize;
        if num_classes != self.labels.len() {
            warn!(
                "model outputs {} classes but label file has {}",
                num_classes,
                self.labels.len()
            );
        }

        let probabilities = softmax(logits);
        Ok(rank_labels(&probabilities, &self.labels, top_k))
    }
}

/// Read a one-label-per-line file in model output order
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>, SceneError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SceneError::LabelLoad(format!("{}: {e}", path.display())))?;

    let labels: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if labels.is_empty() {
        return Err(SceneError::LabelLoad(format!(
            "{}: no labels found",
            path.display()
        )));
    }
    Ok(labels)
}

/// Numerically stable softmax
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Pair probabilities with labels and keep the `top_k` best
fn rank_labels(probabilities: &[f32], labels: &[String], top_k: usize) -> Vec<ClassConfidence> {
    let mut ranked: Vec<ClassConfidence> = probabilities
        .iter()
        .zip(labels)
        .map(|(&confidence, label)| ClassConfidence::new(label.clone(), confidence))
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_k.max(1));
    ranked
}

/// Resize to the model input and normalize CHW channels to the ImageNet
/// distribution
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
            let value = f32::from(pixel[channel]) / 255.0;
            tensor[[0, channel, y, x]] = (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_distribution() {
        let probs = softmax(&[1.0, 2.0, 3.0]);

        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        // Monotonic in the logits
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1001.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_rank_labels() {
        let labels = vec![
            "street".to_string(),
            "forest".to_string(),
            "office".to_string(),
        ];
        let ranked = rank_labels(&[0.1, 0.7, 0.2], &labels, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].label, "forest");
        assert_eq!(ranked[1].label, "office");

        // top_k of zero still yields the best label
        let ranked = rank_labels(&[0.1, 0.7, 0.2], &labels, 0);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_load_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "street\n\n  forest  \noffice\n").unwrap();

        let labels = load_labels(&path).unwrap();
        assert_eq!(labels, vec!["street", "forest", "office"]);

        std::fs::write(&path, "\n\n").unwrap();
        assert!(load_labels(&path).is_err());

        assert!(load_labels(dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_image_tensor_normalization() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 128]));
        let tensor = image_tensor(&image, 4);

        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        // Red channel saturated: (1.0 - mean) / std
        let expected_red = (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        assert!((tensor[[0, 0, 0, 0]] - expected_red).abs() < 1e-5);
        // Green channel empty: (0.0 - mean) / std is negative
        assert!(tensor[[0, 1, 0, 0]] < 0.0);
    }
}
