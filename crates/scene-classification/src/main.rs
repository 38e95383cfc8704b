//! Scene classification module entry point

use percept_core::ModuleSettings;
use percept_scene_classification::handler::SceneClassificationModule;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "percept_scene_classification=info,percept_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ModuleSettings::from_env("scene-classification", "sceneclassification_queue");
    let model_path = std::env::var("PERCEPT_MODEL_PATH")
        .unwrap_or_else(|_| "models/scene-classification/resnet50_scenes.onnx".to_string());
    let labels_path = std::env::var("PERCEPT_LABELS_PATH")
        .unwrap_or_else(|_| "models/scene-classification/labels.txt".to_string());

    let handler = SceneClassificationModule::new(model_path, labels_path);

    tracing::info!("Starting scene classification module");
    let runner = percept_runner::ModuleRunner::new(settings, Arc::new(handler))?;
    runner.run().await;

    Ok(())
}
