//! Errors raised while preparing identity and egress rotation.

use thiserror::Error;

/// Configuration problems found while preparing rotation for a run.
///
/// These are fatal for the run and are never retried.
#[derive(Debug, Error)]
pub enum RotationError {
    /// The task names an identity state file that is not on disk
    #[error("forced identity file not found: {path}")]
    ForcedIdentityMissing {
        /// Configured state file path
        path: String,
    },

    /// Identity rotation is on but its state directory is absent
    #[error("identity rotation enabled but state directory {path} does not exist")]
    IdentitySourceMissing {
        /// Configured state directory
        path: String,
    },
}

/// Result type alias using `RotationError`.
pub type Result<T> = std::result::Result<T, RotationError>;
