//! Marketwatch Scanner - scrape attempt orchestration.
//!
//! This crate runs one monitoring task: it rebuilds the task's dedup ledger
//! from its output log, chooses an identity and egress through
//! `marketwatch-rotation`, and retries blocked attempts with fresh ones until
//! an attempt succeeds or the attempt budget is spent.
//!
//! # Features
//!
//! - Bounded retry loop with per-pool `per_task` / `on_failure` rotation
//! - Risk-control vs transient failure classification
//! - Partial progress of failed attempts counted in the run total
//! - Listing pipeline with AI screening and notification fan-out
//!
//! # Example
//!
//! ```rust,ignore
//! use marketwatch_core::{RotationEnv, RuntimeSettings};
//! use marketwatch_scanner::AttemptOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = AttemptOrchestrator::new(Arc::new(browser_attempt));
//! let report = orchestrator
//!     .run(&task, &RotationEnv::from_env(), &RuntimeSettings::from_env())
//!     .await?;
//! println!("{} new listings", report.items_processed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod attempt;
pub mod error;
pub mod ledger;
pub mod listing_key;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;

// Re-export commonly used types
pub use attempt::{AttemptOutcome, AttemptRequest, ScrapeAttempt};
pub use error::{AttemptError, Result, ScanError};
pub use ledger::{output_file_name, DedupLedger, Listing, ListingRecord, OutputLog};
pub use listing_key::{canonicalize, ListingKey};
pub use orchestrator::{
    AttemptOrchestrator, AttemptRecord, ExhaustionReason, RunReport, RunState,
};
pub use pipeline::{
    AnalysisError, AnalysisResult, Analyzer, ListingProcessor, NotificationService, Notifier,
    NotifyError, ProcessOutcome,
};
pub use prompt::{compose_prompt, load_task_prompt};
