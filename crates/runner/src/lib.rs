//! Percept Runner - queue polling runtime for analysis modules
//!
//! The runner owns the module side of the queue protocol: it long-polls the
//! external server for requests, dispatches them to the module's
//! [`percept_core::ModuleHandler`] under a parallelism semaphore and an
//! optional timeout, stamps timing fields, and posts the JSON response
//! back. Transport failures are never fatal; the poll loop retries after a
//! fixed pause until shutdown.

pub mod long_process;
pub mod queue_client;
pub mod runner;
pub mod server_log;

pub use long_process::LongProcessRegistry;
pub use queue_client::{QueueClient, QueueError};
pub use runner::{ModuleRunner, RunnerHandle};
pub use server_log::{LogEntry, LogLevel};
