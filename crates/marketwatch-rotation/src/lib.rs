//! Marketwatch Rotation - identity and egress rotation for scrape attempts.
//!
//! A task run scrapes with one identity (a stored login session) and an
//! optional egress (a proxy). When the marketplace's risk control blocks an
//! attempt, the run can blacklist the pair for a while and retry with
//! another one. This crate holds the pieces of that decision:
//!
//! - [`pool`] - candidate pools with time-boxed blacklisting
//! - [`settings`] - resolving task and environment settings into a [`RotationPolicy`]
//! - [`selector`] - choosing identity/egress per attempt
//! - [`sources`] - loading candidates from disk and configuration
//! - [`clock`] - injectable time source
//!
//! # Example
//!
//! ```rust
//! use marketwatch_rotation::RotationPool;
//!
//! let mut pool = RotationPool::new(["state/a.json", "state/b.json"], 300);
//! let picked = pool.pick_random().expect("non-empty pool");
//! pool.mark_bad(Some(&picked), "risk control");
//! assert_eq!(pool.available_items().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod clock;
pub mod error;
pub mod pool;
pub mod selector;
pub mod settings;
pub mod sources;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, RotationError};
pub use pool::{RotationItem, RotationPool, DEFAULT_BLACKLIST_TTL_SECS};
pub use selector::{Selector, SelectorOptions};
pub use settings::{EgressPolicy, IdentityPolicy, RotationPolicy, DEFAULT_RETRY_LIMIT};
pub use sources::{load_identity_sources, parse_egress_list, parse_egress_pool};
