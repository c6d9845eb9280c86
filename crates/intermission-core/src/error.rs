//! Core error types for intermission-core.
//!
//! Cancellation travels through the same `Result` channel as real failures
//! so phase loops can use `?` at every suspension point; it is filtered out
//! at the task boundary and never reaches callers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for intermission-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The running task was cancelled (pause, reset, replacement, shutdown).
    #[error("operation cancelled")]
    Cancelled,

    /// A phase task panicked; the cycle is forced back to idle.
    #[error("phase task aborted: {0}")]
    TaskPanicked(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// AV device or sleep/wake provider errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// No usable home/config directory
    #[error("cannot determine configuration directory")]
    NoConfigDir,
}

/// Errors reported by device capabilities (camera, microphone, sleep/wake).
///
/// These are never fatal to the engine: the affected signal degrades to
/// "no device".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device '{0}' not found")]
    NotFound(String),

    #[error("failed to register listener for '{id}': {message}")]
    RegistrationFailed { id: String, message: String },

    #[error("sleep/wake notifications unavailable: {0}")]
    PowerUnavailable(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Schedule has no cycles
    #[error("schedule must contain at least one cycle")]
    EmptySchedule,

    /// Zero-length work or break interval
    #[error("cycle {index}: {field} must be greater than zero")]
    ZeroLength { index: usize, field: &'static str },

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
