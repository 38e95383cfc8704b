//! Log records relayed to the queue server
//!
//! The server aggregates module logs alongside its own; records are posted
//! form-encoded to `/v1/log`. Local logging still goes through `tracing`.

use serde::Serialize;

/// Severity of a relayed log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Information,
    Warning,
    Error,
}

/// One record posted to the server's log endpoint
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Message body
    pub entry: String,
    /// Coarse source bucket (the runner uses "module")
    pub category: String,
    /// Display label, typically the module id
    pub label: String,
    pub log_level: LogLevel,
}

impl LogEntry {
    #[must_use]
    pub fn new(
        level: LogLevel,
        category: impl Into<String>,
        label: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            entry: entry.into(),
            category: category.into(),
            label: label.into(),
            log_level: level,
        }
    }

    /// Error record attributed to `label`
    #[must_use]
    pub fn error(label: impl Into<String>, entry: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, "module", label, entry)
    }

    /// Informational record attributed to `label`
    #[must_use]
    pub fn info(label: impl Into<String>, entry: impl Into<String>) -> Self {
        Self::new(LogLevel::Information, "module", label, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::error("object-detection", "Inference failed: bad tensor");

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entry"], "Inference failed: bad tensor");
        assert_eq!(json["category"], "module");
        assert_eq!(json["label"], "object-detection");
        assert_eq!(json["log_level"], "error");
    }
}
