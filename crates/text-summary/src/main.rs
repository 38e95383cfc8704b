//! Text summarization module entry point

use percept_core::ModuleSettings;
use percept_text_summary::handler::TextSummaryModule;
use percept_text_summary::SummaryConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "percept_text_summary=info,percept_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ModuleSettings::from_env("text-summary", "textsummary_queue");

    let config = SummaryConfig {
        max_sentences: std::env::var("PERCEPT_SUMMARY_SENTENCES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),
        ..Default::default()
    };
    let handler = TextSummaryModule::new(config);

    tracing::info!("Starting text summarization module");
    let runner = percept_runner::ModuleRunner::new(settings, Arc::new(handler))?;
    runner.run().await;

    Ok(())
}
