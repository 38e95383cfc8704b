//! Error types for module handlers

use thiserror::Error;

/// Errors a module handler can surface while processing a request.
///
/// Every variant maps to an HTTP-ish status code via [`ModuleError::status_code`];
/// the runner folds that code into the failure envelope posted back to the
/// queue server.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing file attachment at index {0}")]
    MissingFile(usize),

    #[error("Failed to decode payload: {0}")]
    PayloadDecode(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Processing timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ModuleError {
    /// Status code reported in the failure envelope
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            ModuleError::InvalidRequest(_)
            | ModuleError::UnknownCommand(_)
            | ModuleError::MissingFile(_)
            | ModuleError::PayloadDecode(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ModuleError::InvalidRequest("bad".to_string()).status_code(),
            400
        );
        assert_eq!(ModuleError::MissingFile(0).status_code(), 400);
        assert_eq!(
            ModuleError::Inference("boom".to_string()).status_code(),
            500
        );
        assert_eq!(ModuleError::Timeout(30).status_code(), 500);
    }
}
