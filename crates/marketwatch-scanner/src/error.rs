//! Error types for task runs and individual scrape attempts.

use marketwatch_core::ConfigError;
use marketwatch_rotation::RotationError;
use thiserror::Error;

/// Errors that abort a task run or a pipeline step.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Identity sources are missing; fatal before any attempt runs
    #[error("configuration error for task {task}: {source}")]
    Configuration {
        /// Task name
        task: String,
        /// What is missing
        #[source]
        source: RotationError,
    },

    /// Task file problems
    #[error("task config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (output log, prompt files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `ScanError`.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Why a single scrape attempt failed.
///
/// Both kinds are retried identically; the distinction is kept for logs.
/// `processed` counts listings fully handled before the failure, so partial
/// progress is not lost from the run total.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The marketplace's anti-automation detection fired
    #[error("risk control triggered: {signal}")]
    RiskControl {
        /// Detection signal, e.g. a challenge dialog or API error code
        signal: String,
        /// Listings handled before the block
        processed: usize,
    },

    /// Any other failure: network, timeout, unexpected page state
    #[error("attempt failed: {reason}")]
    Transient {
        /// Error description
        reason: String,
        /// Listings handled before the failure
        processed: usize,
    },
}

impl AttemptError {
    /// Risk-control block with no partial progress.
    #[must_use]
    pub fn risk_control(signal: impl Into<String>) -> Self {
        Self::RiskControl {
            signal: signal.into(),
            processed: 0,
        }
    }

    /// Transient failure with no partial progress.
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
            processed: 0,
        }
    }

    /// Attach the number of listings handled before the failure.
    #[must_use]
    pub fn with_processed(self, processed: usize) -> Self {
        match self {
            Self::RiskControl { signal, .. } => Self::RiskControl { signal, processed },
            Self::Transient { reason, .. } => Self::Transient { reason, processed },
        }
    }
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        Self::transient(format!("io error: {e}"))
    }
}

impl From<ScanError> for AttemptError {
    fn from(e: ScanError) -> Self {
        Self::transient(e.to_string())
    }
}
