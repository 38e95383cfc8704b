//! Object detection module entry point

use percept_core::ModuleSettings;
use percept_object_detection::handler::ObjectDetectionModule;
use percept_object_detection::DetectorConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "percept_object_detection=info,percept_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ModuleSettings::from_env("object-detection", "objectdetection_queue");
    let model_path = std::env::var("PERCEPT_MODEL_PATH")
        .unwrap_or_else(|_| "models/object-detection/yolov8n.onnx".to_string());

    let handler = ObjectDetectionModule::new(model_path, DetectorConfig::default());

    tracing::info!("Starting object detection module");
    let runner = percept_runner::ModuleRunner::new(settings, Arc::new(handler))?;
    runner.run().await;

    Ok(())
}
