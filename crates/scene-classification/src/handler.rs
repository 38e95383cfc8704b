//! Queue handler for the scene classification module

use crate::{SceneClassifier, SceneError};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use percept_core::{JsonFields, ModuleError, ModuleHandler, ModuleOutput, RequestData};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Scene classification module handler with model caching
pub struct SceneClassificationModule {
    model_path: PathBuf,
    labels_path: PathBuf,
    classifier: Arc<OnceCell<Mutex<SceneClassifier>>>,
}

impl SceneClassificationModule {
    pub fn new(model_path: impl AsRef<Path>, labels_path: impl AsRef<Path>) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            labels_path: labels_path.as_ref().to_path_buf(),
            classifier: Arc::new(OnceCell::new()),
        }
    }

    fn cached_classifier(&self) -> Result<&Mutex<SceneClassifier>, ModuleError> {
        self.classifier
            .get_or_try_init(|| {
                let classifier = SceneClassifier::load(&self.model_path, &self.labels_path)?;
                Ok::<_, SceneError>(Mutex::new(classifier))
            })
            .map_err(ModuleError::from)
    }

    fn classify(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        let image = request.decode_image(0)?.to_rgb8();
        let top_k = request.get_int("top_k", 1).clamp(1, 25) as usize;

        let classifier = self.cached_classifier()?;

        let started = Instant::now();
        let ranked = {
            let mut classifier = classifier
                .lock()
                .map_err(|_| ModuleError::Other("classifier mutex poisoned".to_string()))?;
            classifier.classify(&image, top_k)?
        };
        let inference_ms = started.elapsed().as_millis() as u64;

        let mut fields = JsonFields::new();
        if let Some(best) = ranked.first() {
            fields.insert("label".to_string(), Value::from(best.label.clone()));
            fields.insert("confidence".to_string(), Value::from(best.confidence));
            fields.insert(
                "message".to_string(),
                Value::from(format!("Scene is {}", best.label)),
            );
        }
        fields.insert("predictions".to_string(), serde_json::to_value(&ranked)?);

        Ok(ModuleOutput::Completed {
            fields,
            inference_ms: Some(inference_ms),
        })
    }
}

#[async_trait]
impl ModuleHandler for SceneClassificationModule {
    fn module_id(&self) -> &str {
        "scene-classification"
    }

    fn default_queue(&self) -> &str {
        "sceneclassification_queue"
    }

    // The ONNX session is not reentrant; keep requests serialized.
    fn parallelism(&self) -> usize {
        1
    }

    async fn process(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        match request.command() {
            "classify" => self.classify(request),
            other => Err(ModuleError::UnknownCommand(other.to_string())),
        }
    }
}

impl From<SceneError> for ModuleError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::ModelNotFound(_) | SceneError::ModelLoad(_) | SceneError::LabelLoad(_) => {
                ModuleError::ModelLoad(err.to_string())
            }
            SceneError::Inference(_) => ModuleError::Inference(err.to_string()),
        }
    }
}
