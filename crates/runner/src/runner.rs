//! Module runner: poll loops, dispatch and response posting

use crate::long_process::{acknowledge, LongProcessRegistry};
use crate::queue_client::{QueueClient, QueueError};
use crate::server_log::LogEntry;
use percept_core::{ModuleError, ModuleHandler, ModuleOutput, ModuleSettings, RequestData, ResponseEnvelope};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long finished long-process results stay pollable
const LONG_PROCESS_RETENTION: Duration = Duration::from_secs(600);

/// Polls one queue and drives one [`ModuleHandler`]
#[derive(Clone)]
pub struct ModuleRunner {
    settings: ModuleSettings,
    handler: Arc<dyn ModuleHandler>,
    client: Arc<QueueClient>,
    long_processes: Arc<LongProcessRegistry>,
    semaphore: Arc<Semaphore>,
}

/// Handle to a started runner; dropping it does NOT stop the poll loops
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Signal the poll loops to stop and wait for in-flight work to drain
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "poll loop ended abnormally");
                }
            }
        }
    }
}

impl ModuleRunner {
    /// Create a runner for `handler` against the server in `settings`
    pub fn new(
        settings: ModuleSettings,
        handler: Arc<dyn ModuleHandler>,
    ) -> Result<Self, QueueError> {
        let client = Arc::new(QueueClient::new(&settings)?);
        let semaphore = Arc::new(Semaphore::new(handler.parallelism().max(1)));

        Ok(Self {
            settings,
            handler,
            client,
            long_processes: Arc::new(LongProcessRegistry::new(LONG_PROCESS_RETENTION)),
            semaphore,
        })
    }

    /// Spawn the poll loops and return without blocking
    pub fn start(&self) -> RunnerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(self.settings.parallelism);
        for slot in 0..self.settings.parallelism {
            let runner = self.clone();
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                runner.poll_loop(slot, &mut shutdown).await;
            }));
        }

        info!(
            module = self.handler.module_id(),
            queue = %self.settings.queue,
            loops = self.settings.parallelism,
            "module runner started"
        );

        RunnerHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }

    /// Run until ctrl-c, then drain in-flight work
    pub async fn run(&self) {
        let handle = self.start();

        if tokio::signal::ctrl_c().await.is_err() {
            warn!("shutdown signal unavailable; running until killed");
            std::future::pending::<()>().await;
        }

        info!("shutdown signal received, draining in-flight work");
        handle.shutdown().await;
    }

    /// One poll loop: fetch, dispatch, repeat. Transport errors pause and
    /// retry; only the shutdown signal ends the loop.
    async fn poll_loop(&self, slot: usize, shutdown: &mut watch::Receiver<bool>) {
        debug!(slot, "poll loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let fetched = tokio::select! {
                _ = shutdown.changed() => break,
                fetched = self.client.fetch_request(&self.settings.queue) => fetched,
            };

            match fetched {
                Ok(Some(request)) => self.dispatch(request).await,
                // Poll window expired with no work; go straight back
                Ok(None) => {}
                Err(err) => {
                    debug!(slot, error = %err, "queue poll failed, retrying");
                    tokio::time::sleep(self.settings.retry_pause).await;
                }
            }
        }

        debug!(slot, "poll loop stopped");
    }

    /// Execute one request and post its response
    async fn dispatch(&self, request: RequestData) {
        let started = Instant::now();
        let module_id = self.handler.module_id();

        debug!(
            module = module_id,
            command = request.command(),
            request_id = %request.request_id,
            "dispatching request"
        );

        let mut envelope = match self.execute(&request).await {
            Ok(output) => {
                let (fields, inference_ms) =
                    acknowledge(&self.long_processes, &request.request_id, output).await;
                let mut envelope =
                    ResponseEnvelope::success(&request, module_id).with_fields(fields);
                envelope.inference_ms = inference_ms;
                envelope
            }
            Err(err) => {
                self.report_failure(&request, &err).await;
                ResponseEnvelope::failure(&request, module_id, &err)
            }
        };

        envelope.process_ms = started.elapsed().as_millis() as u64;

        if let Err(err) = self.client.send_response(&request.request_id, &envelope).await {
            warn!(
                request_id = %request.request_id,
                error = %err,
                "failed to post response"
            );
        }
    }

    /// Route a request: runner-level commands are answered here, everything
    /// else goes to the handler under the semaphore and optional timeout.
    async fn execute(&self, request: &RequestData) -> Result<ModuleOutput, ModuleError> {
        match request.command() {
            "command_status" => {
                let id = self.command_id(request)?;
                self.long_processes.status(id).await.map(ModuleOutput::completed)
            }
            "cancel_command_task" => {
                let id = self.command_id(request)?;
                self.long_processes.cancel(id).await.map(ModuleOutput::completed)
            }
            _ => {
                // Serializes access to non-reentrant inference sessions
                let _permit = self
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| ModuleError::Other("runner is shutting down".to_string()))?;

                match self.settings.process_timeout {
                    Some(limit) => tokio::time::timeout(limit, self.handler.process(request))
                        .await
                        .map_err(|_| ModuleError::Timeout(limit.as_secs()))?,
                    None => self.handler.process(request).await,
                }
            }
        }
    }

    fn command_id<'a>(&self, request: &'a RequestData) -> Result<&'a str, ModuleError> {
        request
            .get_value("commandId")
            .ok_or_else(|| ModuleError::InvalidRequest("missing commandId".to_string()))
    }

    /// Log a handler failure locally and relay it to the server
    async fn report_failure(&self, request: &RequestData, err: &ModuleError) {
        let chain = error_chain(err);

        error!(
            module = self.handler.module_id(),
            command = request.command(),
            request_id = %request.request_id,
            code = err.status_code(),
            error = %chain,
            "handler failed"
        );

        if self.settings.log_to_server {
            let entry = LogEntry::error(self.handler.module_id(), chain);
            if let Err(err) = self.client.send_log(&entry).await {
                debug!(error = %err, "log relay failed");
            }
        }
    }
}

/// Render an error with its source chain
fn error_chain(err: &ModuleError) -> String {
    use std::error::Error;

    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(&format!(" ({cause})"));
        source = cause.source();
    }
    rendered
}
