//! Registry of running and recently finished long processes
//!
//! A handler that returns [`ModuleOutput::LongProcess`] hands the runner a
//! deferred job. The runner registers it under the originating request id
//! (the "command id"), spawns it, and answers the request immediately. The
//! server then polls with in-band `command_status` requests and may issue
//! `cancel_command_task`, which sets the job's cooperative cancel flag.
//!
//! Finished entries are retained for a window so a status poll racing the
//! completion still observes the result, then reaped lazily.

use percept_core::module::ModuleOutput;
use percept_core::{JsonFields, LongProcessContext, LongProcessJob, ModuleError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::info;

/// Why a long process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Completed,
    Cancelled,
    Failed,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::Cancelled => "cancelled",
            StopReason::Failed => "failed",
        }
    }
}

enum JobState {
    Running,
    Finished {
        stop_reason: StopReason,
        fields: JsonFields,
        error: Option<String>,
        finished_at: Instant,
    },
}

struct LongProcessEntry {
    context: LongProcessContext,
    state: Arc<RwLock<JobState>>,
}

/// Tracks every long process started by one module runner
pub struct LongProcessRegistry {
    entries: RwLock<HashMap<String, LongProcessEntry>>,
    retention: Duration,
}

impl LongProcessRegistry {
    /// Create a registry keeping finished entries for `retention`
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Register and spawn `job` under `command_id`.
    ///
    /// Returns the acknowledgement fields for the immediate response.
    pub async fn begin(&self, command_id: &str, job: LongProcessJob) -> JsonFields {
        let context = LongProcessContext::new();
        let state = Arc::new(RwLock::new(JobState::Running));

        {
            let mut entries = self.entries.write().await;
            entries.insert(
                command_id.to_string(),
                LongProcessEntry {
                    context: context.clone(),
                    state: Arc::clone(&state),
                },
            );
        }

        let id = command_id.to_string();
        let future = job(context.clone());
        tokio::spawn(async move {
            let result = future.await;

            // A job that noticed the flag and returned early still counts
            // as cancelled, whatever it returned.
            let (stop_reason, fields, error) = if context.is_cancelled() {
                (StopReason::Cancelled, result.unwrap_or_default(), None)
            } else {
                match result {
                    Ok(fields) => (StopReason::Completed, fields, None),
                    Err(err) => (StopReason::Failed, JsonFields::new(), Some(err.to_string())),
                }
            };

            info!(
                command_id = %id,
                stop_reason = stop_reason.as_str(),
                "long process finished"
            );

            *state.write().await = JobState::Finished {
                stop_reason,
                fields,
                error,
                finished_at: Instant::now(),
            };
        });

        ack_fields(command_id, "running")
    }

    /// Fields answering a `command_status` request
    pub async fn status(&self, command_id: &str) -> Result<JsonFields, ModuleError> {
        self.reap().await;

        let entries = self.entries.read().await;
        let entry = entries
            .get(command_id)
            .ok_or_else(|| ModuleError::InvalidRequest(format!("unknown commandId: {command_id}")))?;

        let fields = match &*entry.state.read().await {
            JobState::Running => {
                let mut fields = ack_fields(command_id, "running");
                fields.extend(entry.context.progress_snapshot());
                fields
            }
            JobState::Finished {
                stop_reason,
                fields: result,
                error,
                ..
            } => {
                let mut fields = ack_fields(command_id, "finished");
                fields.insert(
                    "stop_reason".to_string(),
                    Value::from(stop_reason.as_str()),
                );
                if let Some(error) = error {
                    fields.insert("error".to_string(), Value::from(error.as_str()));
                }
                fields.extend(result.clone());
                fields
            }
        };

        Ok(fields)
    }

    /// Fields answering a `cancel_command_task` request.
    ///
    /// Sets the cooperative flag; the job decides when to actually stop.
    pub async fn cancel(&self, command_id: &str) -> Result<JsonFields, ModuleError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(command_id)
            .ok_or_else(|| ModuleError::InvalidRequest(format!("unknown commandId: {command_id}")))?;

        if matches!(&*entry.state.read().await, JobState::Running) {
            entry.context.cancel();
            info!(command_id, "cancellation requested");
            Ok(ack_fields(command_id, "cancelling"))
        } else {
            drop(entries);
            self.status(command_id).await
        }
    }

    /// Drop finished entries older than the retention window
    async fn reap(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| match entry.state.try_read() {
            Ok(state) => match &*state {
                JobState::Finished { finished_at, .. } => {
                    finished_at.elapsed() <= self.retention
                }
                JobState::Running => true,
            },
            // State briefly locked by the finishing task; keep it
            Err(_) => true,
        });
    }
}

/// Wrap a handler output into the immediate-acknowledgement fields when it
/// is a long process, spawning the job in `registry`.
pub(crate) async fn acknowledge(
    registry: &LongProcessRegistry,
    command_id: &str,
    output: ModuleOutput,
) -> (JsonFields, Option<u64>) {
    match output {
        ModuleOutput::Completed {
            fields,
            inference_ms,
        } => (fields, inference_ms),
        ModuleOutput::LongProcess(job) => (registry.begin(command_id, job).await, None),
    }
}

fn ack_fields(command_id: &str, status: &str) -> JsonFields {
    let mut fields = JsonFields::new();
    fields.insert("commandId".to_string(), Value::from(command_id));
    fields.insert("commandStatus".to_string(), Value::from(status));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Poll `status` until `predicate` matches or the attempt budget runs out
    async fn await_status(
        registry: &LongProcessRegistry,
        command_id: &str,
        predicate: impl Fn(&Result<JsonFields, ModuleError>) -> bool,
    ) -> Result<JsonFields, ModuleError> {
        for _ in 0..200 {
            let status = registry.status(command_id).await;
            if predicate(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("status for {command_id} never reached the expected state");
    }

    fn looping_job() -> LongProcessJob {
        Box::new(|ctx| {
            Box::pin(async move {
                let mut iterations = 0_u64;
                while !ctx.is_cancelled() {
                    iterations += 1;
                    ctx.publish("iterations", iterations);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let mut fields = JsonFields::new();
                fields.insert("iterations".to_string(), iterations.into());
                Ok(fields)
            })
        })
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_cancelled() {
        let registry = LongProcessRegistry::new(Duration::from_secs(600));

        let ack = registry.begin("cmd-1", looping_job()).await;
        assert_eq!(ack["commandId"], json!("cmd-1"));
        assert_eq!(ack["commandStatus"], json!("running"));

        // Progress fields show up while the job runs
        let running = await_status(&registry, "cmd-1", |s| {
            s.as_ref().is_ok_and(|f| f.contains_key("iterations"))
        })
        .await
        .unwrap();
        assert_eq!(running["commandStatus"], json!("running"));

        let cancel_ack = registry.cancel("cmd-1").await.unwrap();
        assert_eq!(cancel_ack["commandStatus"], json!("cancelling"));

        let finished = await_status(&registry, "cmd-1", |s| {
            s.as_ref()
                .is_ok_and(|f| f["commandStatus"] == json!("finished"))
        })
        .await
        .unwrap();
        assert_eq!(finished["stop_reason"], json!("cancelled"));
    }

    #[tokio::test]
    async fn test_completed_job_reports_completed() {
        let registry = LongProcessRegistry::new(Duration::from_secs(600));

        registry
            .begin(
                "cmd-2",
                Box::new(|_ctx| {
                    Box::pin(async {
                        let mut fields = JsonFields::new();
                        fields.insert("answer".to_string(), 42.into());
                        Ok(fields)
                    })
                }),
            )
            .await;

        let finished = await_status(&registry, "cmd-2", |s| {
            s.as_ref()
                .is_ok_and(|f| f["commandStatus"] == json!("finished"))
        })
        .await
        .unwrap();

        assert_eq!(finished["stop_reason"], json!("completed"));
        assert_eq!(finished["answer"], json!(42));
    }

    #[tokio::test]
    async fn test_failed_job_reports_failed() {
        let registry = LongProcessRegistry::new(Duration::from_secs(600));

        registry
            .begin(
                "cmd-3",
                Box::new(|_ctx| {
                    Box::pin(async {
                        Err(ModuleError::Inference("tensor shape mismatch".to_string()))
                    })
                }),
            )
            .await;

        let finished = await_status(&registry, "cmd-3", |s| {
            s.as_ref()
                .is_ok_and(|f| f["commandStatus"] == json!("finished"))
        })
        .await
        .unwrap();

        assert_eq!(finished["stop_reason"], json!("failed"));
        assert_eq!(
            finished["error"],
            json!("Inference failed: tensor shape mismatch")
        );
    }

    #[tokio::test]
    async fn test_unknown_command_id() {
        let registry = LongProcessRegistry::new(Duration::from_secs(600));

        let err = registry.status("nope").await.unwrap_err();
        assert!(matches!(err, ModuleError::InvalidRequest(_)));

        let err = registry.cancel("nope").await.unwrap_err();
        assert!(matches!(err, ModuleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_finished_entries_are_reaped() {
        let registry = LongProcessRegistry::new(Duration::ZERO);

        registry
            .begin(
                "cmd-4",
                Box::new(|_ctx| Box::pin(async { Ok(JsonFields::new()) })),
            )
            .await;

        // Once the job has finished, the zero-retention registry drops the
        // entry on the next access.
        await_status(&registry, "cmd-4", |s| s.is_err()).await.ok();
    }
}
