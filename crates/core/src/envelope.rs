//! Wire envelopes exchanged with the queue server
//!
//! A request arrives as a single JSON object pulled from
//! `GET /v1/queue/<name>`; the response is posted back to
//! `POST /v1/queue/<reqid>`. Field names are fixed by the server protocol
//! (`reqid`, `reqtype`, `urlSegments`, `processMs`, ...) and mapped onto
//! Rust naming with serde renames.

use crate::error::ModuleError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One request pulled from a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestData {
    /// Server-assigned request id; responses are posted back under this id
    #[serde(rename = "reqid")]
    pub request_id: String,

    /// Request type tag assigned by the server; carried through, never
    /// interpreted by the module SDK
    #[serde(rename = "reqtype", default)]
    pub request_type: String,

    /// The actual work item
    pub payload: RequestPayload,
}

/// Command, parameters and attachments of a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Command name dispatched on by the handler
    #[serde(default)]
    pub command: String,

    /// Queue the request was routed through
    #[serde(default)]
    pub queue: String,

    /// Key/value parameters; each key carries a list of string values
    #[serde(default)]
    pub values: Vec<KeyValues>,

    /// File attachments with base64-encoded contents
    #[serde(default)]
    pub files: Vec<FilePayload>,

    /// Trailing URL segments of the originating client call
    #[serde(rename = "urlSegments", default)]
    pub url_segments: Vec<String>,
}

/// A named parameter holding one or more string values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValues {
    pub key: String,
    #[serde(default)]
    pub value: Vec<String>,
}

/// A file attachment; `data` is base64
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    #[serde(default)]
    pub filename: String,
    pub data: String,
}

impl RequestData {
    /// Command name of this request
    #[must_use]
    pub fn command(&self) -> &str {
        &self.payload.command
    }

    /// First value stored under `key`, if any. Key comparison is
    /// case-insensitive to match the server's parameter handling.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.payload
            .values
            .iter()
            .find(|kv| kv.key.eq_ignore_ascii_case(key))
            .and_then(|kv| kv.value.first())
            .map(String::as_str)
    }

    /// Integer parameter with a fallback for missing or unparseable values
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_value(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Float parameter with a fallback for missing or unparseable values
    #[must_use]
    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.get_value(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Boolean parameter; accepts `true/false`, `1/0`, `yes/no`
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_value(key).map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            Some("1") => true,
            Some("0") => false,
            Some(v) if v.eq_ignore_ascii_case("yes") => true,
            Some(v) if v.eq_ignore_ascii_case("no") => false,
            _ => default,
        }
    }

    /// Number of file attachments
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.payload.files.len()
    }

    /// Decode the base64 contents of attachment `index`
    pub fn decode_file(&self, index: usize) -> Result<Vec<u8>, ModuleError> {
        let file = self
            .payload
            .files
            .get(index)
            .ok_or(ModuleError::MissingFile(index))?;

        BASE64
            .decode(file.data.as_bytes())
            .map_err(|e| ModuleError::PayloadDecode(format!("invalid base64 attachment: {e}")))
    }

    /// Decode attachment `index` as an image
    pub fn decode_image(&self, index: usize) -> Result<DynamicImage, ModuleError> {
        let bytes = self.decode_file(index)?;
        image::load_from_memory(&bytes)
            .map_err(|e| ModuleError::PayloadDecode(format!("unreadable image attachment: {e}")))
    }

    /// Decode attachment `index` as UTF-8 text
    pub fn decode_text_file(&self, index: usize) -> Result<String, ModuleError> {
        let bytes = self.decode_file(index)?;
        String::from_utf8(bytes)
            .map_err(|e| ModuleError::PayloadDecode(format!("attachment is not UTF-8: {e}")))
    }
}

/// Response posted back to the queue server.
///
/// Handler-specific fields (`predictions`, `summary`, ...) are flattened
/// into the top-level object next to the fixed bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,

    #[serde(rename = "requestId")]
    pub request_id: String,

    #[serde(rename = "moduleId")]
    pub module_id: String,

    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub code: u16,

    /// Wall time of the full dispatch, stamped by the runner
    #[serde(rename = "processMs")]
    pub process_ms: u64,

    /// Model time, reported by the handler when it ran inference
    #[serde(rename = "inferenceMs", skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<u64>,

    /// Handler-specific result fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Successful response skeleton for `request`; result fields are merged
    /// in by the runner.
    #[must_use]
    pub fn success(request: &RequestData, module_id: &str) -> Self {
        Self {
            success: true,
            request_id: request.request_id.clone(),
            module_id: module_id.to_string(),
            command: request.payload.command.clone(),
            error: None,
            code: 200,
            process_ms: 0,
            inference_ms: None,
            extra: Map::new(),
        }
    }

    /// Failure response carrying the handler error and its status code
    #[must_use]
    pub fn failure(request: &RequestData, module_id: &str, error: &ModuleError) -> Self {
        Self {
            success: false,
            request_id: request.request_id.clone(),
            module_id: module_id.to_string(),
            command: request.payload.command.clone(),
            error: Some(error.to_string()),
            code: error.status_code(),
            process_ms: 0,
            inference_ms: None,
            extra: Map::new(),
        }
    }

    /// Merge handler result fields into the envelope
    #[must_use]
    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.extra.extend(fields);
        self
    }
}
