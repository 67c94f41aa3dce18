//! Typed failures of the collaborators the core talks to. Everything above them uses
//! [anyhow::Result] and decides whether an error is fatal or just logged.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of the active application sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The platform has no way to query the foreground window. Tracking can't be started.
    #[error("active window sensor is unavailable: {reason}")]
    Unavailable { reason: String },
    /// A single sample failed. The next sample might succeed.
    #[error("failed to sample active window: {0}")]
    Failed(#[source] anyhow::Error),
}

/// Failure to write or read the ledger or a configuration file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to terminate a single process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessAccessError {
    #[error("permission denied while terminating process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("process {pid} is already gone")]
    NotFound { pid: u32 },

    #[error("failed to terminate process {pid}: {reason}")]
    Other { pid: u32, reason: String },
}

/// Configuration file exists but couldn't be parsed. Callers fall back to defaults.
#[derive(Debug, Error)]
#[error("malformed configuration file {path:?}: {source}")]
pub struct ConfigParseError {
    pub path: PathBuf,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    /// An empty key would match every process on the machine.
    #[error("block key can't be empty")]
    EmptyKey,
}
