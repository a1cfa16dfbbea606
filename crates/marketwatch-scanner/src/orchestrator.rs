//! Attempt orchestrator for running one scrape task.
//!
//! This module provides the `AttemptOrchestrator`, which resolves the task's
//! rotation policy, prepares the identity/egress selector, rebuilds the dedup
//! ledger and then drives a bounded loop of scrape attempts. Failed attempts
//! blacklist the identity and egress of pools in `on_failure` mode before the
//! next selection.

use crate::attempt::{AttemptOutcome, AttemptRequest, ScrapeAttempt};
use crate::error::{Result, ScanError};
use crate::ledger::{DedupLedger, OutputLog};
use marketwatch_core::{RotationEnv, RuntimeSettings, TaskConfig};
use marketwatch_rotation::{
    Clock, RotationItem, RotationPolicy, Selector, SelectorOptions, SystemClock,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// States of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Choosing identity and egress
    Selecting,
    /// Waiting on the scrape attempt
    Attempting,
    /// An attempt completed
    Succeeded,
    /// The last attempt failed and another may follow
    BlockedRetrying,
    /// No further attempt is possible
    Exhausted,
}

/// Why a run ended in [`RunState::Exhausted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// No identity could be selected
    NoIdentity,
    /// Egress rotation is enabled but no egress could be selected
    NoEgress,
    /// Every allowed attempt failed
    AttemptsExhausted {
        /// Error of the final attempt
        last_error: Option<String>,
    },
}

/// One attempt as it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub index: u32,
    /// Identity used
    pub identity: String,
    /// Egress used, `None` for direct
    pub egress: Option<String>,
    /// Classified result
    pub outcome: AttemptOutcome,
}

/// Result of one task run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Task name
    pub task_name: String,
    /// Listings handled across all attempts
    pub items_processed: usize,
    /// Final state, `Succeeded` or `Exhausted`
    pub state: RunState,
    /// Set when `state` is `Exhausted`
    pub exhaustion: Option<ExhaustionReason>,
    /// Attempts in order
    pub attempts: Vec<AttemptRecord>,
}

impl RunReport {
    fn new(run_id: Uuid, task_name: &str) -> Self {
        Self {
            run_id,
            task_name: task_name.to_string(),
            items_processed: 0,
            state: RunState::Selecting,
            exhaustion: None,
            attempts: Vec::new(),
        }
    }

    fn exhausted(mut self, reason: ExhaustionReason) -> Self {
        self.state = RunState::Exhausted;
        self.exhaustion = Some(reason);
        self
    }

    /// True if the run ended with a successful attempt.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// Drives scrape attempts for a task with identity/egress rotation.
pub struct AttemptOrchestrator {
    /// Collaborator performing the actual scrape
    attempt: Arc<dyn ScrapeAttempt>,
    /// Time source for blacklist expiry
    clock: Arc<dyn Clock>,
    /// Seed for deterministic pool picks
    seed: Option<u64>,
    /// Pause between a failed attempt and the next one
    retry_delay: Duration,
}

impl AttemptOrchestrator {
    /// Create a new orchestrator around a scrape attempt implementation.
    #[must_use]
    pub fn new(attempt: Arc<dyn ScrapeAttempt>) -> Self {
        Self {
            attempt,
            clock: Arc::new(SystemClock),
            seed: None,
            retry_delay: Duration::ZERO,
        }
    }

    /// Use a custom clock for blacklist expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the pools' random picks.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pause between a failed attempt and the next one.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run `task` until an attempt succeeds or no attempt remains.
    ///
    /// Exhaustion is reported in the returned [`RunReport`], with the items
    /// handled by failed attempts still counted.
    ///
    /// # Errors
    /// Returns `ScanError::Configuration` if identity sources are missing.
    /// No attempt runs in that case.
    pub async fn run(
        &self,
        task: &TaskConfig,
        env: &RotationEnv,
        settings: &RuntimeSettings,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("task_run", task = %task.task_name, %run_id);
        self.run_inner(run_id, task, env, settings)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        task: &TaskConfig,
        env: &RotationEnv,
        settings: &RuntimeSettings,
    ) -> Result<RunReport> {
        let mut selector = self.prepare_selector(task, env, settings)?;
        let mut ledger = Self::load_ledger(task, settings).await;
        let mut report = RunReport::new(run_id, &task.task_name);

        let policy = selector.policy().clone();
        let limit = policy.attempt_limit();
        let mut last_error: Option<String> = None;

        for index in 1..=limit {
            report.state = RunState::Selecting;
            let (identity, egress) =
                Self::select(&mut selector, &policy, index, last_error.as_deref());

            let Some(identity) = identity else {
                tracing::warn!("No identity available for task {}", task.task_name);
                return Ok(report.exhausted(ExhaustionReason::NoIdentity));
            };
            if policy.egress.enabled && egress.is_none() {
                tracing::warn!("No proxy available for task {}", task.task_name);
                return Ok(report.exhausted(ExhaustionReason::NoEgress));
            }

            report.state = RunState::Attempting;
            tracing::info!(
                "Attempt {}/{} with identity {} via {}",
                index,
                limit,
                identity.value,
                egress.as_ref().map_or("direct", |item| item.value.as_str())
            );

            let request = AttemptRequest {
                task,
                identity: &identity,
                egress: egress.as_ref(),
            };
            let outcome = AttemptOutcome::from(self.attempt.attempt(request, &mut ledger).await);
            report.items_processed += outcome.items();
            report.attempts.push(AttemptRecord {
                index,
                identity: identity.value.clone(),
                egress: egress.map(|item| item.value),
                outcome: outcome.clone(),
            });

            if outcome.is_success() {
                tracing::info!(
                    "Task {} finished, {} new listings",
                    task.task_name,
                    report.items_processed
                );
                report.state = RunState::Succeeded;
                return Ok(report);
            }

            report.state = RunState::BlockedRetrying;
            last_error = outcome.error().map(str::to_string);
            tracing::warn!(
                "Attempt {}/{} failed ({}): {}",
                index,
                limit,
                outcome.classification(),
                last_error.as_deref().unwrap_or_default()
            );

            if index < limit && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::error!(
            "Task {} exhausted {} attempts, {} listings handled",
            task.task_name,
            limit,
            report.items_processed
        );
        Ok(report.exhausted(ExhaustionReason::AttemptsExhausted { last_error }))
    }

    fn prepare_selector(
        &self,
        task: &TaskConfig,
        env: &RotationEnv,
        settings: &RuntimeSettings,
    ) -> Result<Selector> {
        let policy = RotationPolicy::resolve(task, env);
        let options = SelectorOptions {
            forced_identity: task.account_state_file.clone(),
            default_identity: settings.state_file.clone(),
            clock: self.clock.clone(),
            seed: self.seed,
        };

        Selector::prepare(policy, options).map_err(|source| ScanError::Configuration {
            task: task.task_name.clone(),
            source,
        })
    }

    async fn load_ledger(task: &TaskConfig, settings: &RuntimeSettings) -> DedupLedger {
        let log = OutputLog::for_keyword(&settings.output_dir, &task.keyword);
        match log.load_ledger().await {
            Ok(ledger) => ledger,
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}, continuing without history: {}",
                    log.path().display(),
                    e
                );
                DedupLedger::new()
            }
        }
    }

    /// First attempt keeps any existing selection. Later attempts replace
    /// the resources of `on_failure` pools after blacklisting them.
    fn select(
        selector: &mut Selector,
        policy: &RotationPolicy,
        index: u32,
        last_error: Option<&str>,
    ) -> (Option<RotationItem>, Option<RotationItem>) {
        if index == 1 {
            return (selector.select_identity(false), selector.select_egress(false));
        }

        let reason = last_error.unwrap_or("attempt failed");
        let identity = if policy.rotates_identity_on_failure() {
            selector.mark_identity_bad(reason);
            selector.select_identity(true)
        } else {
            selector.select_identity(false)
        };
        let egress = if policy.rotates_egress_on_failure() {
            selector.mark_egress_bad(reason);
            selector.select_egress(true)
        } else {
            selector.select_egress(false)
        };
        (identity, egress)
    }
}
