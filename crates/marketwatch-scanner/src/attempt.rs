//! The scrape attempt seam and attempt outcome classification.

use crate::error::AttemptError;
use crate::ledger::DedupLedger;
use async_trait::async_trait;
use marketwatch_core::TaskConfig;
use marketwatch_rotation::RotationItem;
use serde::Serialize;

/// Everything one scrape attempt runs with.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    /// Task being scraped
    pub task: &'a TaskConfig,
    /// Session identity file for the browser context
    pub identity: &'a RotationItem,
    /// Proxy endpoint, `None` for a direct connection
    pub egress: Option<&'a RotationItem>,
}

impl AttemptRequest<'_> {
    /// Proxy endpoint as a plain string, if any.
    #[must_use]
    pub fn egress_value(&self) -> Option<&str> {
        self.egress.map(|item| item.value.as_str())
    }
}

/// Performs one full scrape (search, paginate, process listings).
///
/// Implementations consult `ledger` before handling a listing and add each
/// handled listing's key to it. They report anti-automation detection as
/// [`AttemptError::RiskControl`] and every other failure as
/// [`AttemptError::Transient`], carrying the count handled so far.
#[async_trait]
pub trait ScrapeAttempt: Send + Sync {
    /// Run one attempt, returning the number of new listings handled.
    async fn attempt(
        &self,
        request: AttemptRequest<'_>,
        ledger: &mut DedupLedger,
    ) -> Result<usize, AttemptError>;
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Attempt completed
    Success {
        /// New listings handled
        items: usize,
    },
    /// Anti-automation detection fired
    RiskControlBlock {
        /// Detection signal
        signal: String,
        /// Listings handled before the block
        processed: usize,
    },
    /// Any other failure
    TransientFailure {
        /// Error description
        reason: String,
        /// Listings handled before the failure
        processed: usize,
    },
}

impl AttemptOutcome {
    /// Log label: `success`, `risk_control` or `transient`.
    #[must_use]
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::RiskControlBlock { .. } => "risk_control",
            Self::TransientFailure { .. } => "transient",
        }
    }

    /// Listings handled by the attempt, whether or not it succeeded.
    #[must_use]
    pub fn items(&self) -> usize {
        match self {
            Self::Success { items } => *items,
            Self::RiskControlBlock { processed, .. } | Self::TransientFailure { processed, .. } => {
                *processed
            }
        }
    }

    /// Failure text, `None` on success.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::RiskControlBlock { signal, .. } => Some(signal),
            Self::TransientFailure { reason, .. } => Some(reason),
        }
    }

    /// True for [`AttemptOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<Result<usize, AttemptError>> for AttemptOutcome {
    fn from(result: Result<usize, AttemptError>) -> Self {
        match result {
            Ok(items) => Self::Success { items },
            Err(AttemptError::RiskControl { signal, processed }) => {
                Self::RiskControlBlock { signal, processed }
            }
            Err(AttemptError::Transient { reason, processed }) => {
                Self::TransientFailure { reason, processed }
            }
        }
    }
}
