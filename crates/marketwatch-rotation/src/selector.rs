//! Identity and egress selection for one task run.
//!
//! The selector owns both rotation pools and the "currently selected"
//! identity and egress. It is built fresh for every run and mutated only by
//! that run's attempt loop.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, RotationError};
use crate::pool::{RotationItem, RotationPool};
use crate::settings::RotationPolicy;
use crate::sources::load_identity_sources;
use marketwatch_core::RotationMode;
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs to [`Selector::prepare`] besides the resolved policy.
#[derive(Clone)]
pub struct SelectorOptions {
    /// Identity file forced by the task, bypassing rotation
    pub forced_identity: Option<String>,
    /// Identity used when rotation does not apply
    pub default_identity: PathBuf,
    /// Time source for blacklist expiry
    pub clock: Arc<dyn Clock>,
    /// Seed for deterministic picks; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl SelectorOptions {
    /// Options with the given default identity and no forced identity.
    #[must_use]
    pub fn new(default_identity: impl Into<PathBuf>) -> Self {
        Self {
            forced_identity: None,
            default_identity: default_identity.into(),
            clock: Arc::new(SystemClock),
            seed: None,
        }
    }
}

/// Chooses the identity and egress for each attempt.
#[derive(Debug)]
pub struct Selector {
    policy: RotationPolicy,
    identity_pool: RotationPool,
    egress_pool: RotationPool,
    forced_identity: Option<String>,
    default_identity: Option<PathBuf>,
    current_identity: Option<RotationItem>,
    current_egress: Option<RotationItem>,
}

impl Selector {
    /// Create a selector over already-built pools.
    #[must_use]
    pub fn new(policy: RotationPolicy, identity_pool: RotationPool, egress_pool: RotationPool) -> Self {
        Self {
            policy,
            identity_pool,
            egress_pool,
            forced_identity: None,
            default_identity: None,
            current_identity: None,
            current_egress: None,
        }
    }

    /// Always use `path` as the identity.
    #[must_use]
    pub fn with_forced_identity(mut self, path: Option<String>) -> Self {
        self.forced_identity = path;
        self
    }

    /// Identity returned when rotation is disabled, if the file exists.
    #[must_use]
    pub fn with_default_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_identity = Some(path.into());
        self
    }

    /// Discover identity candidates on disk and build the selector.
    ///
    /// Candidates are the `*.json` files of the identity source directory,
    /// replaced by the default identity alone when that file exists. If the
    /// default is missing but the directory has candidates, identity rotation
    /// is switched on.
    ///
    /// # Errors
    /// Returns `RotationError` if a forced identity file is missing, or if
    /// identity rotation is enabled with neither a default identity nor a
    /// source directory.
    pub fn prepare(mut policy: RotationPolicy, options: SelectorOptions) -> Result<Self> {
        let default_exists = options.default_identity.is_file();

        let identity_values = if let Some(forced) = &options.forced_identity {
            if !PathBuf::from(forced).is_file() {
                return Err(RotationError::ForcedIdentityMissing {
                    path: forced.clone(),
                });
            }
            Vec::new()
        } else {
            let mut candidates = load_identity_sources(&policy.identity.source_dir);
            if default_exists {
                candidates = vec![options.default_identity.display().to_string()];
            } else if !candidates.is_empty() && !policy.identity.enabled {
                tracing::info!(
                    "Default identity {} missing, rotating across {} files in {}",
                    options.default_identity.display(),
                    candidates.len(),
                    policy.identity.source_dir.display()
                );
                policy.identity.enabled = true;
            }

            if policy.identity.enabled && !default_exists && !policy.identity.source_dir.is_dir() {
                return Err(RotationError::IdentitySourceMissing {
                    path: policy.identity.source_dir.display().to_string(),
                });
            }
            candidates
        };

        let mut identity_pool =
            RotationPool::new(identity_values, policy.identity.blacklist_ttl_secs)
                .with_name("account")
                .with_clock(options.clock.clone());
        let mut egress_pool =
            RotationPool::new(policy.egress.pool.clone(), policy.egress.blacklist_ttl_secs)
                .with_name("proxy")
                .with_clock(options.clock.clone());
        if let Some(seed) = options.seed {
            identity_pool = identity_pool.with_seed(seed);
            egress_pool = egress_pool.with_seed(seed.wrapping_add(1));
        }

        Ok(Self::new(policy, identity_pool, egress_pool)
            .with_forced_identity(options.forced_identity)
            .with_default_identity(options.default_identity))
    }

    /// Effective policy, including any automatic enablement from `prepare`.
    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Identity pool.
    #[must_use]
    pub fn identity_pool(&self) -> &RotationPool {
        &self.identity_pool
    }

    /// Egress pool.
    #[must_use]
    pub fn egress_pool(&self) -> &RotationPool {
        &self.egress_pool
    }

    /// Identity chosen by the last `select_identity`.
    #[must_use]
    pub fn current_identity(&self) -> Option<&RotationItem> {
        self.current_identity.as_ref()
    }

    /// Egress chosen by the last `select_egress`.
    #[must_use]
    pub fn current_egress(&self) -> Option<&RotationItem> {
        self.current_egress.as_ref()
    }

    /// Choose the identity for the next attempt.
    ///
    /// A forced identity always wins. With rotation disabled the default
    /// identity is used if it exists on disk. In `per_task` mode an existing
    /// selection is kept unless `force_new` is set. Otherwise a random
    /// available item is picked, keeping the previous selection when the
    /// pool has nothing left.
    pub fn select_identity(&mut self, force_new: bool) -> Option<RotationItem> {
        if let Some(forced) = &self.forced_identity {
            let item = RotationItem::new(forced.clone());
            self.current_identity = Some(item.clone());
            return Some(item);
        }

        if !self.policy.identity.enabled {
            self.current_identity = self
                .default_identity
                .as_ref()
                .filter(|path| path.is_file())
                .map(|path| RotationItem::new(path.display().to_string()));
            return self.current_identity.clone();
        }

        if self.policy.identity.mode == RotationMode::PerTask && !force_new {
            if let Some(current) = &self.current_identity {
                return Some(current.clone());
            }
        }

        match self.identity_pool.pick_random() {
            Some(picked) => self.current_identity = Some(picked),
            None => tracing::warn!("No available identity in pool, keeping previous selection"),
        }
        self.current_identity.clone()
    }

    /// Choose the egress for the next attempt.
    ///
    /// Same rules as [`Selector::select_identity`], except that disabled
    /// rotation means a direct connection (`None`).
    pub fn select_egress(&mut self, force_new: bool) -> Option<RotationItem> {
        if !self.policy.egress.enabled {
            self.current_egress = None;
            return None;
        }

        if self.policy.egress.mode == RotationMode::PerTask && !force_new {
            if let Some(current) = &self.current_egress {
                return Some(current.clone());
            }
        }

        match self.egress_pool.pick_random() {
            Some(picked) => self.current_egress = Some(picked),
            None => tracing::warn!("No available proxy in pool, keeping previous selection"),
        }
        self.current_egress.clone()
    }

    /// Blacklist the current identity.
    pub fn mark_identity_bad(&mut self, reason: &str) {
        self.identity_pool
            .mark_bad(self.current_identity.as_ref(), reason);
        if let Some(current) = self.current_identity.as_mut() {
            current.last_error = Some(reason.to_string());
        }
    }

    /// Blacklist the current egress.
    pub fn mark_egress_bad(&mut self, reason: &str) {
        self.egress_pool.mark_bad(self.current_egress.as_ref(), reason);
        if let Some(current) = self.current_egress.as_mut() {
            current.last_error = Some(reason.to_string());
        }
    }
}
