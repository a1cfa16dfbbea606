//! Dedup ledger and the per-task JSONL output log it is rebuilt from.

use crate::error::Result;
use crate::listing_key::ListingKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Suffix of every output log file name.
pub const OUTPUT_FILE_SUFFIX: &str = "_full_data.jsonl";

/// Listing fields extracted from the marketplace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Listing {
    /// Marketplace listing id
    #[serde(default)]
    pub id: String,
    /// Listing title
    #[serde(default)]
    pub title: String,
    /// Listing URL as scraped
    pub url: String,
    /// Image URLs, main image first
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Price, location, tags and other page fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Listing {
    /// Listing with just a URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Canonical dedup key of this listing.
    #[must_use]
    pub fn key(&self) -> ListingKey {
        ListingKey::from_link(&self.url)
    }
}

/// One line of the output log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// When the listing was scraped
    pub scraped_at: DateTime<Utc>,
    /// Search keyword of the task
    pub keyword: String,
    /// Task name
    pub task_name: String,
    /// Listing fields
    pub listing: Listing,
    /// Seller profile, free-form
    #[serde(default)]
    pub seller: Value,
    /// Analysis result, or `{ "error": ... }` when analysis failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<Value>,
}

/// Canonical keys of listings already handled for a task.
///
/// Append-only: keys are never removed during a run.
#[derive(Debug, Clone, Default)]
pub struct DedupLedger {
    keys: HashSet<ListingKey>,
}

impl DedupLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the ledger from an output log.
    ///
    /// A missing file gives an empty ledger. Lines that are not UTF-8 or not
    /// JSON are logged and skipped; records without `listing.url` are skipped.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No output log at {}, starting empty ledger", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };

        let mut ledger = Self::new();
        for (index, raw) in content.split(|byte| *byte == b'\n').enumerate() {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::warn!(
                        "Skipping non UTF-8 line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            let record: Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                    continue;
                }
            };
            if let Some(url) = record.pointer("/listing/url").and_then(Value::as_str) {
                ledger.add(ListingKey::from_link(url));
            }
        }

        tracing::info!(
            "Loaded {} known listings from {}",
            ledger.len(),
            path.display()
        );
        Ok(ledger)
    }

    /// Whether `key` was already handled.
    #[must_use]
    pub fn contains(&self, key: &ListingKey) -> bool {
        self.keys.contains(key)
    }

    /// Record `key` as handled. Returns false if it was already present.
    pub fn add(&mut self, key: ListingKey) -> bool {
        self.keys.insert(key)
    }

    /// Number of known keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// File name of a task's output log: spaces in the keyword become `_`.
#[must_use]
pub fn output_file_name(keyword: &str) -> String {
    format!("{}{OUTPUT_FILE_SUFFIX}", keyword.replace(' ', "_"))
}

/// Append-only JSONL log of handled listings for one task.
#[derive(Debug, Clone)]
pub struct OutputLog {
    path: PathBuf,
}

impl OutputLog {
    /// Log at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log for `keyword` inside `output_dir`.
    #[must_use]
    pub fn for_keyword(output_dir: &Path, keyword: &str) -> Self {
        Self::new(output_dir.join(output_file_name(keyword)))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line, creating the directory if needed.
    pub async fn append(&self, record: &ListingRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Rebuild a ledger from this log.
    pub async fn load_ledger(&self) -> std::io::Result<DedupLedger> {
        DedupLedger::load(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str) -> ListingRecord {
        ListingRecord {
            scraped_at: Utc::now(),
            keyword: "sony a7m4".to_string(),
            task_name: "Sony A7M4".to_string(),
            listing: Listing::new(url),
            seller: Value::Null,
            ai_analysis: None,
        }
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("sony a7m4"), "sony_a7m4_full_data.jsonl");
        assert_eq!(output_file_name("macbook"), "macbook_full_data.jsonl");
    }

    #[test]
    fn test_ledger_add_is_append_only() {
        let mut ledger = DedupLedger::new();
        assert!(ledger.is_empty());
        assert!(ledger.add(ListingKey::from_link("https://www.goofish.com/item?id=1&a=b")));
        assert!(!ledger.add(ListingKey::from_link("https://www.goofish.com/item?id=1")));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&ListingKey::from_link("https://www.goofish.com/item?id=1#x")));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = DedupLedger::load(&tmp.path().join("absent.jsonl")).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.jsonl");
        let content = [
            r#"{"listing": {"url": "https://www.goofish.com/item?id=1&spm=x"}}"#,
            "{not json",
            "",
            r#"{"listing": {"title": "no url"}}"#,
            r#"{"listing": {"url": "https://www.goofish.com/item?id=2"}}"#,
            r#"{"listing": {"url": "https://www.goofish.com/item?id=1"}}"#,
        ]
        .join("\n");
        tokio::fs::write(&path, content).await.unwrap();

        let ledger = DedupLedger::load(&path).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(&ListingKey::from_link("https://www.goofish.com/item?id=2")));
    }

    #[tokio::test]
    async fn test_load_skips_invalid_utf8_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log.jsonl");
        let mut content = Vec::new();
        content.extend_from_slice(b"{\"listing\": {\"url\": \"https://www.goofish.com/item?id=1\"}}\n");
        content.extend_from_slice(b"\xff\xfex\n");
        content.extend_from_slice(b"{\"listing\": {\"url\": \"https://www.goofish.com/item?id=2\"}}\r\n");
        tokio::fs::write(&path, content).await.unwrap();

        let ledger = DedupLedger::load(&path).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(&ListingKey::from_link("https://www.goofish.com/item?id=1")));
        assert!(ledger.contains(&ListingKey::from_link("https://www.goofish.com/item?id=2")));
    }

    #[tokio::test]
    async fn test_append_then_reload() {
        let tmp = TempDir::new().unwrap();
        let log = OutputLog::for_keyword(&tmp.path().join("jsonl"), "sony a7m4");

        log.append(&record("https://www.goofish.com/item?id=10&from=search"))
            .await
            .unwrap();
        log.append(&record("https://www.goofish.com/item?id=11")).await.unwrap();

        assert!(log.path().ends_with("jsonl/sony_a7m4_full_data.jsonl"));
        let ledger = log.load_ledger().await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(&ListingKey::from_link("https://www.goofish.com/item?id=10")));
    }

    #[test]
    fn test_record_keeps_extra_listing_fields() {
        let json = r#"{
            "scraped_at": "2025-03-01T08:00:00Z",
            "keyword": "macbook",
            "task_name": "MacBook",
            "listing": {"id": "9", "title": "M1", "url": "https://www.goofish.com/item?id=9", "price": "3200"},
            "seller": {"nickname": "abc"}
        }"#;
        let record: ListingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.listing.extra["price"], "3200");
        assert!(record.ai_analysis.is_none());

        let round = serde_json::to_value(&record).unwrap();
        assert_eq!(round["listing"]["price"], "3200");
        assert!(round.get("ai_analysis").is_none());
    }
}
