//! Queue handler for the text summarization module
//!
//! `summarize` answers synchronously. `summarize-async` returns a long
//! process: the document is scored chunk by chunk, progress is published
//! for `command_status` polls, and the cancellation flag is honored
//! between chunks - a cancelled job still assembles a summary from the
//! sentences scored so far.

use crate::{
    select_top, sentence_score, split_sentences, word_frequencies, Summarizer, SummaryConfig,
    SummaryError,
};
use async_trait::async_trait;
use percept_core::{
    JsonFields, LongProcessContext, LongProcessFuture, ModuleError, ModuleHandler, ModuleOutput,
    RequestData,
};
use serde_json::Value;
use tracing::debug;

/// Text summarization module handler
#[derive(Debug, Default)]
pub struct TextSummaryModule {
    config: SummaryConfig,
}

impl TextSummaryModule {
    #[must_use]
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    /// Text comes either inline (`text` parameter) or as the first file
    /// attachment
    fn request_text(&self, request: &RequestData) -> Result<String, ModuleError> {
        if let Some(text) = request.get_value("text") {
            if !text.trim().is_empty() {
                return Ok(text.to_string());
            }
        }
        if request.file_count() > 0 {
            let text = request.decode_text_file(0)?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        Err(ModuleError::InvalidRequest("no text supplied".to_string()))
    }

    fn request_config(&self, request: &RequestData) -> SummaryConfig {
        SummaryConfig {
            max_sentences: request
                .get_int("sentences", self.config.max_sentences as i64)
                .clamp(1, 100) as usize,
            chunk_sentences: self.config.chunk_sentences,
        }
    }

    fn summarize(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        let text = self.request_text(request)?;
        let config = self.request_config(request);

        let summary = Summarizer::new(config)
            .summarize(&text)
            .map_err(ModuleError::from)?;

        let mut fields = JsonFields::new();
        fields.insert(
            "message".to_string(),
            Value::from(format!(
                "Summarized {} sentences down to {}",
                summary.input_sentences, summary.summary_sentences
            )),
        );
        fields.extend(summary_fields(&summary));
        Ok(ModuleOutput::completed(fields))
    }

    fn summarize_async(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        let text = self.request_text(request)?;
        let config = self.request_config(request);

        let job = move |ctx: LongProcessContext| -> LongProcessFuture {
            Box::pin(async move {
                let sentences = split_sentences(&text);
                if sentences.is_empty() {
                    return Err(ModuleError::InvalidRequest(
                        "no sentences found in input".to_string(),
                    ));
                }

                let frequencies = word_frequencies(&text);
                let chunk_size = config.chunk_sentences.max(1);

                let mut scored = Vec::with_capacity(sentences.len());
                for chunk in sentences.chunks(chunk_size) {
                    if ctx.is_cancelled() {
                        debug!("summarization cancelled after {} sentences", scored.len());
                        break;
                    }

                    for sentence in chunk {
                        scored.push((scored.len(), sentence_score(sentence, &frequencies)));
                    }

                    ctx.publish("sentences_scored", scored.len());
                    ctx.publish(
                        "progress",
                        (scored.len() as f64 / sentences.len() as f64 * 100.0).round(),
                    );
                    tokio::task::yield_now().await;
                }

                // On cancellation this summarizes the scored prefix only
                let summary = select_top(&sentences[..scored.len()], &scored, config.max_sentences);

                let mut fields = JsonFields::new();
                fields.extend(summary_fields(&summary));
                Ok(fields)
            })
        };

        Ok(ModuleOutput::LongProcess(Box::new(job)))
    }
}

fn summary_fields(summary: &crate::Summary) -> JsonFields {
    let mut fields = JsonFields::new();
    fields.insert("summary".to_string(), Value::from(summary.summary.clone()));
    fields.insert(
        "input_sentences".to_string(),
        Value::from(summary.input_sentences),
    );
    fields.insert(
        "summary_sentences".to_string(),
        Value::from(summary.summary_sentences),
    );
    fields
}

#[async_trait]
impl ModuleHandler for TextSummaryModule {
    fn module_id(&self) -> &str {
        "text-summary"
    }

    fn default_queue(&self) -> &str {
        "textsummary_queue"
    }

    async fn process(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        match request.command() {
            "summarize" => self.summarize(request),
            "summarize-async" => self.summarize_async(request),
            other => Err(ModuleError::UnknownCommand(other.to_string())),
        }
    }
}

impl From<SummaryError> for ModuleError {
    fn from(err: SummaryError) -> Self {
        match err {
            SummaryError::EmptyInput => ModuleError::InvalidRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;

    fn request(payload: serde_json::Value) -> RequestData {
        serde_json::from_value(json!({"reqid": "r1", "payload": payload})).unwrap()
    }

    const TEXT: &str = "Rust compiles fast. Rust programs are reliable. Lunch was fine.";

    #[tokio::test]
    async fn test_summarize_inline_text() {
        let handler = TextSummaryModule::default();
        let output = handler
            .process(&request(json!({
                "command": "summarize",
                "values": [
                    {"key": "text", "value": [TEXT]},
                    {"key": "sentences", "value": ["1"]}
                ]
            })))
            .await
            .unwrap();

        match output {
            ModuleOutput::Completed { fields, .. } => {
                assert_eq!(fields["summary_sentences"], json!(1));
                assert_eq!(fields["input_sentences"], json!(3));
                assert!(fields["summary"].as_str().unwrap().contains("Rust"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_summarize_file_attachment() {
        let handler = TextSummaryModule::default();
        let output = handler
            .process(&request(json!({
                "command": "summarize",
                "files": [{"filename": "doc.txt", "data": BASE64.encode(TEXT)}]
            })))
            .await
            .unwrap();

        match output {
            ModuleOutput::Completed { fields, .. } => {
                assert_eq!(fields["input_sentences"], json!(3));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_text_is_a_client_error() {
        let handler = TextSummaryModule::default();
        let err = handler
            .process(&request(json!({"command": "summarize"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidRequest(_)));

        // Whitespace-only inline text counts as missing
        let err = handler
            .process(&request(json!({
                "command": "summarize",
                "values": [{"key": "text", "value": ["   "]}]
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_async_job_completes() {
        let handler = TextSummaryModule::default();
        let output = handler
            .process(&request(json!({
                "command": "summarize-async",
                "values": [
                    {"key": "text", "value": [TEXT]},
                    {"key": "sentences", "value": ["1"]}
                ]
            })))
            .await
            .unwrap();

        let job = match output {
            ModuleOutput::LongProcess(job) => job,
            other => panic!("expected long process, got {other:?}"),
        };

        let ctx = LongProcessContext::new();
        let fields = job(ctx.clone()).await.unwrap();
        assert_eq!(fields["summary_sentences"], json!(1));

        // The job published progress along the way
        assert_eq!(ctx.progress_snapshot()["progress"], json!(100.0));
    }

    #[tokio::test]
    async fn test_async_job_honors_cancellation() {
        let handler = TextSummaryModule {
            // One sentence per chunk so cancellation lands mid-document
            config: SummaryConfig {
                max_sentences: 3,
                chunk_sentences: 1,
            },
        };

        let output = handler
            .process(&request(json!({
                "command": "summarize-async",
                "values": [{"key": "text", "value": [TEXT]}]
            })))
            .await
            .unwrap();

        let job = match output {
            ModuleOutput::LongProcess(job) => job,
            other => panic!("expected long process, got {other:?}"),
        };

        // Cancelled before the job even starts: nothing gets scored
        let ctx = LongProcessContext::new();
        ctx.cancel();
        let fields = job(ctx).await.unwrap();
        assert_eq!(fields["summary_sentences"], json!(0));
        assert_eq!(fields["summary"], json!(""));
    }
}
