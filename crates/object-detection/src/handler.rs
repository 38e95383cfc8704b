//! Queue handler for the object detection module

use crate::{DetectError, Detector, DetectorConfig};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use percept_common::Prediction;
use percept_core::{JsonFields, ModuleError, ModuleHandler, ModuleOutput, RequestData};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Object detection module handler with model caching
pub struct ObjectDetectionModule {
    model_path: PathBuf,
    config: DetectorConfig,
    /// Cached detector - loaded once and reused across all requests.
    /// Wrapped in Mutex because `Session::run` takes `&mut self`.
    detector: Arc<OnceCell<Mutex<Detector>>>,
}

impl ObjectDetectionModule {
    /// Create a handler for the model at `model_path`
    pub fn new(model_path: impl AsRef<Path>, config: DetectorConfig) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            config,
            detector: Arc::new(OnceCell::new()),
        }
    }

    /// Get or load the detector (cached after first load)
    fn cached_detector(&self) -> Result<&Mutex<Detector>, ModuleError> {
        self.detector.get_or_try_init(|| {
            let detector = Detector::load(&self.model_path)?;
            Ok::<_, DetectError>(Mutex::new(detector))
        })
        .map_err(ModuleError::from)
    }

    fn detect(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        let image = request.decode_image(0)?.to_rgb8();

        let mut config = self.config.clone();
        config.confidence_threshold =
            request.get_f32("min_confidence", config.confidence_threshold);

        let detector = self.cached_detector()?;

        let started = Instant::now();
        let detections = {
            let mut detector = detector
                .lock()
                .map_err(|_| ModuleError::Other("detector mutex poisoned".to_string()))?;
            detector.detect(&image, &config)?
        };
        let inference_ms = started.elapsed().as_millis() as u64;

        let predictions: Vec<Prediction> = detections.into_iter().map(Into::into).collect();

        let mut fields = JsonFields::new();
        fields.insert(
            "message".to_string(),
            Value::from(format!("Found {} objects", predictions.len())),
        );
        fields.insert("count".to_string(), Value::from(predictions.len()));
        fields.insert("predictions".to_string(), serde_json::to_value(&predictions)?);

        Ok(ModuleOutput::Completed {
            fields,
            inference_ms: Some(inference_ms),
        })
    }

    /// List the ONNX models installed next to the configured one
    fn list_models(&self) -> Result<ModuleOutput, ModuleError> {
        let dir = self
            .model_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut models = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "onnx") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    models.push(stem.to_string());
                }
            }
        }
        models.sort();

        debug!("{} models installed in {}", models.len(), dir.display());

        let mut fields = JsonFields::new();
        fields.insert("models".to_string(), serde_json::to_value(&models)?);
        Ok(ModuleOutput::completed(fields))
    }
}

#[async_trait]
impl ModuleHandler for ObjectDetectionModule {
    fn module_id(&self) -> &str {
        "object-detection"
    }

    fn default_queue(&self) -> &str {
        "objectdetection_queue"
    }

    async fn process(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        match request.command() {
            "detect" => self.detect(request),
            "list-models" => self.list_models(),
            other => Err(ModuleError::UnknownCommand(other.to_string())),
        }
    }
}

impl From<DetectError> for ModuleError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::ModelNotFound(_) | DetectError::ModelLoad(_) => {
                ModuleError::ModelLoad(err.to_string())
            }
            DetectError::Inference(_) => ModuleError::Inference(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;

    fn request_with(command: &str, files: Value) -> RequestData {
        serde_json::from_value(json!({
            "reqid": "r1",
            "payload": {"command": command, "files": files}
        }))
        .unwrap()
    }

    fn handler() -> ObjectDetectionModule {
        ObjectDetectionModule::new("models/yolov8n.onnx", DetectorConfig::default())
    }

    #[tokio::test]
    async fn test_detect_without_attachment_is_a_client_error() {
        let request = request_with("detect", json!([]));
        let err = handler().process(&request).await.unwrap_err();
        assert!(matches!(err, ModuleError::MissingFile(0)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_detect_with_unreadable_image() {
        let request = request_with(
            "detect",
            json!([{"filename": "x.jpg", "data": BASE64.encode(b"not an image")}]),
        );
        let err = handler().process(&request).await.unwrap_err();
        assert!(matches!(err, ModuleError::PayloadDecode(_)));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let request = request_with("transmogrify", json!([]));
        let err = handler().process(&request).await.unwrap_err();
        assert!(matches!(err, ModuleError::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn test_list_models() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yolov8n.onnx"), b"stub").unwrap();
        std::fs::write(dir.path().join("yolov8s.onnx"), b"stub").unwrap();
        std::fs::write(dir.path().join("labels.txt"), b"person").unwrap();

        let handler = ObjectDetectionModule::new(
            dir.path().join("yolov8n.onnx"),
            DetectorConfig::default(),
        );

        let request = request_with("list-models", json!([]));
        let output = handler.process(&request).await.unwrap();

        match output {
            ModuleOutput::Completed { fields, .. } => {
                assert_eq!(fields["models"], json!(["yolov8n", "yolov8s"]));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }
}
