//! HTTP client for the three queue-server endpoints

use crate::server_log::LogEntry;
use percept_core::{ModuleSettings, RequestData, ResponseEnvelope};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Transport-level failures talking to the queue server.
///
/// These are retried by the poll loop and never escape it.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue server transport error: {0}")]
    Transport(String),

    #[error("queue server returned status {0}")]
    Status(u16),

    #[error("malformed job payload: {0}")]
    MalformedJob(#[from] serde_json::Error),
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        QueueError::Transport(err.to_string())
    }
}

/// Thin wrapper over `reqwest` for the queue protocol
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
    module_id: String,
}

impl QueueClient {
    /// Build a client for the server named in `settings`
    pub fn new(settings: &ModuleSettings) -> Result<Self, QueueError> {
        // The client-side timeout rides above the server's long-poll window
        // so an idle poll expires server-side first.
        let http = reqwest::Client::builder()
            .timeout(settings.poll_timeout + Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url(),
            module_id: settings.module_id.clone(),
        })
    }

    /// Long-poll `queue` for one pending request.
    ///
    /// An empty body means the poll window expired with no work.
    pub async fn fetch_request(&self, queue: &str) -> Result<Option<RequestData>, QueueError> {
        let url = format!("{}/queue/{}", self.base_url, queue);
        let response = self
            .http
            .get(&url)
            .query(&[("moduleId", self.module_id.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let body = body.trim();
        if body.is_empty() || body == "{}" || body == "[]" {
            return Ok(None);
        }

        trace!(queue, bytes = body.len(), "received job");
        let request: RequestData = serde_json::from_str(body)?;
        Ok(Some(request))
    }

    /// Post the response for `request_id`. Fire-and-forget from the
    /// protocol's point of view; the caller only logs failures.
    pub async fn send_response(
        &self,
        request_id: &str,
        envelope: &ResponseEnvelope,
    ) -> Result<(), QueueError> {
        let url = format!("{}/queue/{}", self.base_url, request_id);
        let response = self.http.post(&url).json(envelope).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Relay a log record to the server
    pub async fn send_log(&self, entry: &LogEntry) -> Result<(), QueueError> {
        let url = format!("{}/log", self.base_url);
        let response = self.http.post(&url).form(entry).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueueError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> ModuleSettings {
        ModuleSettings {
            module_id: "test-module".to_string(),
            queue: "test_queue".to_string(),
            server_host: "localhost".to_string(),
            server_port: 8080,
            parallelism: 1,
            poll_timeout: Duration::from_secs(30),
            retry_pause: Duration::from_millis(1000),
            process_timeout: None,
            log_to_server: true,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = QueueClient::new(&test_settings()).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.module_id, "test-module");
    }
}
