//! Error types for task configuration loading.

use thiserror::Error;

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Task file not found
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where the task file was expected
        path: String,
    },

    /// Failed to parse the JSON task file
    #[error("failed to parse task config: {0}")]
    ParseError(#[from] serde_json::Error),

    /// I/O error reading the task file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No task with the requested name
    #[error("task not found: {name}")]
    TaskNotFound {
        /// Requested task name
        name: String,
    },

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
