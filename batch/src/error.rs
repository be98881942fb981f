//! Error types for batch setup, reporting and configuration files.
//!
//! Per-item failures never show up here; they are reported through
//! [`RunOutcome`](extract_queue_core::RunOutcome). These errors cover what
//! happens around a run: loading configuration, spawning the worker, and
//! writing reports.

use thiserror::Error;

use extract_queue_core::ConfigError;

/// Errors that can occur outside the per-item processing loop.
#[derive(Debug, Error)]
pub enum BatchError {
    /// File I/O failure, or failure to spawn the worker thread.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The run configuration is structurally invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Configuration file declares a version this build does not read.
    #[error("unsupported configuration version: {0}")]
    UnsupportedVersion(String),

    /// The worker thread panicked before reporting a summary.
    #[error("batch worker panicked")]
    WorkerPanicked,
}

/// Convenience alias for results with [`BatchError`].
pub type Result<T> = std::result::Result<T, BatchError>;
