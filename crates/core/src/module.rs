//! Module handler trait and long-process plumbing

use crate::envelope::RequestData;
use crate::error::ModuleError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Handler-specific response fields, flattened into the response envelope
pub type JsonFields = Map<String, Value>;

/// Future produced by a long-process job
pub type LongProcessFuture = Pin<Box<dyn Future<Output = Result<JsonFields, ModuleError>> + Send>>;

/// A deferred job: invoked once by the runner with the context it must
/// watch for cancellation
pub type LongProcessJob = Box<dyn FnOnce(LongProcessContext) -> LongProcessFuture + Send>;

/// What a handler produced for one request
pub enum ModuleOutput {
    /// Request was handled synchronously
    Completed {
        fields: JsonFields,
        /// Model time, if the handler ran inference
        inference_ms: Option<u64>,
    },

    /// Request started a background job; the runner replies immediately
    /// with a command id the server can poll and cancel
    LongProcess(LongProcessJob),
}

impl ModuleOutput {
    /// Synchronous result without an inference timing
    #[must_use]
    pub fn completed(fields: JsonFields) -> Self {
        ModuleOutput::Completed {
            fields,
            inference_ms: None,
        }
    }
}

impl std::fmt::Debug for ModuleOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleOutput::Completed { fields, inference_ms } => f
                .debug_struct("Completed")
                .field("fields", fields)
                .field("inference_ms", inference_ms)
                .finish(),
            ModuleOutput::LongProcess(_) => f.write_str("LongProcess(..)"),
        }
    }
}

/// Shared state between a running long process and the runner.
///
/// Cancellation is cooperative: `cancel_command_task` only sets the flag,
/// and the job is expected to check [`LongProcessContext::is_cancelled`]
/// between iterations of its internal loop. Progress fields published here
/// are merged into `command_status` responses while the job runs.
#[derive(Debug, Clone, Default)]
pub struct LongProcessContext {
    cancelled: Arc<AtomicBool>,
    progress: Arc<RwLock<JsonFields>>,
}

impl LongProcessContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Has the server asked for this job to stop?
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Set the cooperative cancellation flag
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Publish a progress field visible to `command_status` polls
    pub fn publish(&self, key: &str, value: impl Into<Value>) {
        if let Ok(mut progress) = self.progress.write() {
            progress.insert(key.to_string(), value.into());
        }
    }

    /// Snapshot of the published progress fields
    #[must_use]
    pub fn progress_snapshot(&self) -> JsonFields {
        self.progress.read().map(|p| p.clone()).unwrap_or_default()
    }
}

/// One analysis module's request handler.
///
/// A module process owns exactly one handler; the runner pulls requests
/// from the module's queue and calls [`ModuleHandler::process`] for each.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Stable module identifier reported in every response
    fn module_id(&self) -> &str;

    /// Queue this module pulls from unless settings override it
    fn default_queue(&self) -> &str;

    /// How many requests the handler tolerates in flight at once.
    ///
    /// Defaults to 1: inference sessions are typically not reentrant, so
    /// the runner serializes calls through a semaphore of this size.
    fn parallelism(&self) -> usize {
        1
    }

    /// Handle one request
    async fn process(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError>;
}
