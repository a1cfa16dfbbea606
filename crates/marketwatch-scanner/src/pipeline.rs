//! Per-listing processing: dedup, AI screening, notification, persistence.
//!
//! Scrape attempt implementations hand every extracted listing to a
//! [`ListingProcessor`]. The analyzer and notification channels are
//! collaborators behind traits.

use crate::error::Result;
use crate::ledger::{DedupLedger, Listing, ListingRecord, OutputLog};
use crate::listing_key::ListingKey;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use marketwatch_core::{RuntimeSettings, TaskConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Notification reason used when AI analysis is skipped.
pub const SKIPPED_ANALYSIS_REASON: &str = "AI analysis skipped, notifying directly";

/// Analysis error stored when a prompt is set but no analyzer was attached.
pub const NO_ANALYZER_REASON: &str = "no analyzer configured";

/// Why raw analyzer output was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Output is not a JSON object
    #[error("analysis result is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("analysis result is missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong JSON type
    #[error("analysis field {field} must be {expected}")]
    InvalidType {
        /// Field name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },

    /// `criteria_analysis` is an empty object
    #[error("criteria_analysis must be a non-empty object")]
    EmptyCriteria,
}

/// Validated AI verdict for a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Version tag of the prompt that produced this result
    pub prompt_version: Value,
    /// Whether the listing matches the buyer's criteria
    pub is_recommended: bool,
    /// Explanation, used as the notification reason
    pub reason: String,
    /// Risk labels
    pub risk_tags: Vec<Value>,
    /// Per-criterion breakdown
    pub criteria_analysis: Map<String, Value>,
    /// Any other fields the model returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Validate raw analyzer output.
    pub fn from_value(value: Value) -> std::result::Result<Self, AnalysisError> {
        let Value::Object(mut fields) = value else {
            return Err(AnalysisError::NotAnObject);
        };

        for field in [
            "prompt_version",
            "is_recommended",
            "reason",
            "risk_tags",
            "criteria_analysis",
        ] {
            if !fields.contains_key(field) {
                return Err(AnalysisError::MissingField(field));
            }
        }

        let prompt_version = fields.remove("prompt_version").unwrap_or_default();
        let Some(Value::Bool(is_recommended)) = fields.remove("is_recommended") else {
            return Err(AnalysisError::InvalidType {
                field: "is_recommended",
                expected: "a boolean",
            });
        };
        let Some(Value::Array(risk_tags)) = fields.remove("risk_tags") else {
            return Err(AnalysisError::InvalidType {
                field: "risk_tags",
                expected: "a list",
            });
        };
        let criteria_analysis = match fields.remove("criteria_analysis") {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => return Err(AnalysisError::EmptyCriteria),
        };
        let reason = match fields.remove("reason") {
            Some(Value::String(reason)) => reason,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        Ok(Self {
            prompt_version,
            is_recommended,
            reason,
            risk_tags,
            criteria_analysis,
            extra: fields,
        })
    }
}

/// AI screening of a listing record with its images.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `record`; `None` when the analyzer gave up.
    async fn analyze(
        &self,
        record: &ListingRecord,
        images: &[String],
        prompt: &str,
    ) -> Option<AnalysisResult>;
}

/// Failure reported by a notification channel.
#[derive(Debug, Clone, Error)]
#[error("{channel}: {message}")]
pub struct NotifyError {
    /// Channel name
    pub channel: String,
    /// Error description
    pub message: String,
}

/// One notification channel (ntfy, webhook, chat bot...).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used in the result map.
    fn name(&self) -> &str;

    /// Disabled channels are dropped by [`NotificationService::new`].
    fn is_enabled(&self) -> bool {
        true
    }

    /// Deliver a notification; `Ok(false)` means the channel declined it.
    async fn send(&self, listing: &Listing, reason: &str) -> std::result::Result<bool, NotifyError>;
}

/// Fans a notification out to every enabled channel.
#[derive(Clone, Default)]
pub struct NotificationService {
    clients: Vec<Arc<dyn Notifier>>,
}

impl NotificationService {
    /// Keep the enabled channels of `clients`.
    #[must_use]
    pub fn new(clients: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .filter(|client| client.is_enabled())
                .collect(),
        }
    }

    /// Number of enabled channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no channel is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send to all channels concurrently.
    ///
    /// Returns each channel's result by name; a channel error counts as
    /// `false`.
    pub async fn send_all(&self, listing: &Listing, reason: &str) -> BTreeMap<String, bool> {
        if self.clients.is_empty() {
            tracing::warn!("No notification channel configured");
            return BTreeMap::new();
        }

        let sends = self.clients.iter().map(|client| async move {
            let delivered = match client.send(listing, reason).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    tracing::warn!("Notification failed: {}", e);
                    false
                }
            };
            (client.name().to_string(), delivered)
        });
        join_all(sends).await.into_iter().collect()
    }
}

/// What happened to a listing handed to [`ListingProcessor::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already in the ledger; nothing was done
    Duplicate,
    /// Analyzed as configured, saved and added to the ledger
    Recorded {
        /// Whether a notification was sent
        notified: bool,
    },
}

/// Handles each new listing of a task.
pub struct ListingProcessor {
    task_name: String,
    keyword: String,
    prompt: Option<String>,
    skip_analysis: bool,
    analyzer: Option<Arc<dyn Analyzer>>,
    notifications: NotificationService,
    output: OutputLog,
}

impl ListingProcessor {
    /// Processor for `task` writing to the task's output log.
    #[must_use]
    pub fn new(task: &TaskConfig, settings: &RuntimeSettings, notifications: NotificationService) -> Self {
        Self {
            task_name: task.task_name.clone(),
            keyword: task.keyword.clone(),
            prompt: None,
            skip_analysis: settings.skip_ai_analysis,
            analyzer: None,
            notifications,
            output: OutputLog::for_keyword(&settings.output_dir, &task.keyword),
        }
    }

    /// Analyzer used when a prompt is set.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Composed AI prompt for the task.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Output log the processor appends to.
    #[must_use]
    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    /// Process one listing.
    ///
    /// Duplicates are skipped. Otherwise the listing is screened and
    /// notified as configured, appended to the output log and added to
    /// `ledger`.
    pub async fn process(
        &self,
        listing: Listing,
        seller: Value,
        ledger: &mut DedupLedger,
    ) -> Result<ProcessOutcome> {
        let key = listing.key();
        if ledger.contains(&key) {
            tracing::debug!("Listing {} already handled, skipping", key);
            return Ok(ProcessOutcome::Duplicate);
        }

        let mut record = ListingRecord {
            scraped_at: Utc::now(),
            keyword: self.keyword.clone(),
            task_name: self.task_name.clone(),
            listing,
            seller,
            ai_analysis: None,
        };

        let mut notified = false;
        if self.skip_analysis {
            tracing::info!("Skipping AI analysis for {}", key);
            notified = self.notify(&record.listing, SKIPPED_ANALYSIS_REASON).await;
        } else if let Some(prompt) = &self.prompt {
            let Some(analyzer) = &self.analyzer else {
                tracing::warn!(
                    "AI prompt configured for task {} but no analyzer set",
                    self.task_name
                );
                record.ai_analysis = Some(json!({ "error": NO_ANALYZER_REASON }));
                return self.record(record, key, ledger, false).await;
            };
            match analyzer
                .analyze(&record, &record.listing.image_urls, prompt)
                .await
            {
                Some(result) => {
                    tracing::info!(
                        "Analysis of {} done, recommended: {}",
                        key,
                        result.is_recommended
                    );
                    record.ai_analysis = Some(serde_json::to_value(&result)?);
                    if result.is_recommended {
                        notified = self.notify(&record.listing, &result.reason).await;
                    }
                }
                None => {
                    record.ai_analysis =
                        Some(json!({ "error": "AI analysis returned no result" }));
                }
            }
        } else {
            tracing::debug!("No AI prompt for task {}, skipping analysis", self.task_name);
        }

        self.record(record, key, ledger, notified).await
    }

    async fn record(
        &self,
        record: ListingRecord,
        key: ListingKey,
        ledger: &mut DedupLedger,
        notified: bool,
    ) -> Result<ProcessOutcome> {
        self.output.append(&record).await?;
        ledger.add(key);
        Ok(ProcessOutcome::Recorded { notified })
    }

    async fn notify(&self, listing: &Listing, reason: &str) -> bool {
        let results = self.notifications.send_all(listing, reason).await;
        results.values().any(|delivered| *delivered)
    }
}
