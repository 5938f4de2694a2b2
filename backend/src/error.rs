//! Error types for the console core.
//!
//! Nothing in the telemetry or command path is fatal: `TransportError` and
//! `DecodeError` are logged and surfaced to the operator, then dropped.
//! `ConfigError` only happens at startup, before any task is spawned.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("publish to {topic} timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },
}

/// Malformed or unroutable inbound payload. Carries the raw input so the
/// operator can see exactly what arrived.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("no channel for topic {0}")]
    UnknownTopic(String),

    #[error("payload on {topic} is not valid UTF-8")]
    InvalidUtf8 { topic: String },

    #[error("payload {payload:?} on {topic} is not a number")]
    InvalidNumber { topic: String, payload: String },

    #[error("payload {payload:?} on {topic} has {found} fields, expected 3")]
    FieldCount {
        topic: String,
        payload: String,
        found: usize,
    },

    #[error("field {index} of payload {payload:?} on {topic} is not a number")]
    InvalidField {
        topic: String,
        payload: String,
        index: usize,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
