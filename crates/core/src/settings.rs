//! Environment-based module settings
//!
//! Every knob has a default so a module starts against a local queue
//! server with no configuration at all.

use std::time::Duration;

/// Runtime settings for one module process
#[derive(Debug, Clone)]
pub struct ModuleSettings {
    /// Module identifier reported in responses and the `moduleId` poll
    /// parameter
    pub module_id: String,

    /// Queue to pull requests from
    pub queue: String,

    /// Queue server host
    pub server_host: String,

    /// Queue server port
    pub server_port: u16,

    /// Number of concurrent poll loops (each loop handles one request at a
    /// time; the handler's own parallelism still caps concurrent work)
    pub parallelism: usize,

    /// Client-side timeout on the long-poll GET
    pub poll_timeout: Duration,

    /// Fixed pause before retrying after a transport error
    pub retry_pause: Duration,

    /// Optional hard limit on a single dispatch
    pub process_timeout: Option<Duration>,

    /// Relay handler errors to the server's `/v1/log` endpoint
    pub log_to_server: bool,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ModuleSettings {
    /// Read settings from the environment, falling back to the module's
    /// own defaults for id and queue name.
    #[must_use]
    pub fn from_env(default_module_id: &str, default_queue: &str) -> Self {
        Self {
            module_id: env_string("PERCEPT_MODULE_ID", default_module_id),
            queue: env_string("PERCEPT_QUEUE", default_queue),
            server_host: env_string("PERCEPT_SERVER_HOST", "localhost"),
            server_port: env_parse("PERCEPT_SERVER_PORT", 8080),
            parallelism: env_parse("PERCEPT_PARALLELISM", 1).max(1),
            poll_timeout: Duration::from_secs(env_parse("PERCEPT_POLL_TIMEOUT_SECS", 30)),
            retry_pause: Duration::from_millis(env_parse("PERCEPT_RETRY_PAUSE_MS", 1000)),
            process_timeout: std::env::var("PERCEPT_PROCESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs),
            log_to_server: env_parse("PERCEPT_LOG_TO_SERVER", true),
        }
    }

    /// Base URL of the queue server API
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/v1", self.server_host, self.server_port)
    }
}
