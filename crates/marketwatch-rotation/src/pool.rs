//! Rotation pool with time-boxed blacklisting.
//!
//! A pool holds a fixed list of candidate values (identity files or proxy
//! endpoints). Marking an item bad excludes it from selection until its
//! blacklist entry expires; items are never removed from the backing list.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Blacklist duration applied when nothing else is configured.
pub const DEFAULT_BLACKLIST_TTL_SECS: i64 = 300;

/// One candidate identity or egress endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationItem {
    /// Identity file path or proxy URI
    pub value: String,
    /// Reason recorded by the last `mark_bad`, for diagnostics only
    pub last_error: Option<String>,
}

impl RotationItem {
    /// Create an item with no recorded error.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            last_error: None,
        }
    }
}

impl fmt::Display for RotationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Pool of rotation candidates with a `value -> expiry` blacklist.
pub struct RotationPool {
    name: String,
    items: Vec<RotationItem>,
    blacklist_ttl_secs: i64,
    blacklist: HashMap<String, DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    rng: StdRng,
}

impl RotationPool {
    /// Create a pool from raw values, dropping blank ones.
    ///
    /// A `blacklist_ttl_secs` of zero or less disables exclusion: `mark_bad`
    /// then only records the error.
    pub fn new<I, S>(values: I, blacklist_ttl_secs: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = values
            .into_iter()
            .map(Into::<String>::into)
            .filter(|value| !value.trim().is_empty())
            .map(RotationItem::new)
            .collect();

        Self {
            name: "rotation".to_string(),
            items,
            blacklist_ttl_secs,
            blacklist: HashMap::new(),
            clock: Arc::new(SystemClock),
            rng: StdRng::from_entropy(),
        }
    }

    /// Set the name used in log messages.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use a specific clock for blacklist expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a deterministic random source.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Name used in log messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every item, blacklisted or not.
    #[must_use]
    pub fn items(&self) -> &[RotationItem] {
        &self.items
    }

    /// Number of items in the backing list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the pool was built from no usable values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Configured blacklist duration in seconds.
    #[must_use]
    pub fn blacklist_ttl_secs(&self) -> i64 {
        self.blacklist_ttl_secs
    }

    /// Items not currently blacklisted.
    ///
    /// Expired blacklist entries (expiry at or before now) are purged first.
    pub fn available_items(&mut self) -> Vec<&RotationItem> {
        self.purge_expired();
        let blacklist = &self.blacklist;
        self.items
            .iter()
            .filter(|item| !blacklist.contains_key(&item.value))
            .collect()
    }

    /// Whether `value` may currently be selected.
    pub fn is_available(&mut self, value: &str) -> bool {
        self.available_items().iter().any(|item| item.value == value)
    }

    /// Uniformly pick one available item.
    ///
    /// Returns `None` if the pool is empty or every item is blacklisted.
    pub fn pick_random(&mut self) -> Option<RotationItem> {
        self.purge_expired();
        let blacklist = &self.blacklist;
        let candidates: Vec<&RotationItem> = self
            .items
            .iter()
            .filter(|item| !blacklist.contains_key(&item.value))
            .collect();
        candidates.choose(&mut self.rng).map(|item| (*item).clone())
    }

    /// Record a failure for `item` and, if the TTL is positive, exclude it
    /// until `now + ttl`.
    pub fn mark_bad(&mut self, item: Option<&RotationItem>, reason: &str) {
        let Some(item) = item else {
            return;
        };

        if let Some(stored) = self.items.iter_mut().find(|s| s.value == item.value) {
            stored.last_error = Some(reason.to_string());
        }

        if self.blacklist_ttl_secs <= 0 {
            tracing::debug!(
                "Blacklisting disabled for {} pool, keeping {} available",
                self.name,
                item.value
            );
            return;
        }

        let now = self.clock.now();
        let expiry = TimeDelta::try_seconds(self.blacklist_ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.blacklist.insert(item.value.clone(), expiry);

        tracing::warn!(
            "Blacklisted {} {} for {}s: {}",
            self.name,
            item.value,
            self.blacklist_ttl_secs,
            reason
        );
    }

    fn purge_expired(&mut self) {
        let now = self.clock.now();
        self.blacklist.retain(|_, expiry| *expiry > now);
    }
}

impl fmt::Debug for RotationPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationPool")
            .field("name", &self.name)
            .field("items", &self.items)
            .field("blacklist_ttl_secs", &self.blacklist_ttl_secs)
            .field("blacklist", &self.blacklist)
            .finish_non_exhaustive()
    }
}
