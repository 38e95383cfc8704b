//! Percept Core - module protocol and runtime abstractions
//!
//! This crate defines the contract between an analysis module and the
//! external queue server: the JSON request/response envelopes, the
//! `ModuleHandler` trait every module implements, and the environment-based
//! module settings.

pub mod envelope;
pub mod error;
pub mod module;
pub mod settings;

pub use envelope::{FilePayload, KeyValues, RequestData, RequestPayload, ResponseEnvelope};
pub use error::ModuleError;
pub use module::{
    JsonFields, LongProcessContext, LongProcessFuture, LongProcessJob, ModuleHandler, ModuleOutput,
};
pub use settings::ModuleSettings;
