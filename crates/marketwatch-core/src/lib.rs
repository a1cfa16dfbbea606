//! Marketwatch Core - Foundation crate for the marketplace monitor.
//!
//! This crate provides shared types, error handling and configuration that
//! the rotation, scanner and CLI crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Configuration error types using thiserror
//! - [`config`] - JSON task configuration and environment defaults
//! - [`types`] - Shared enums and loosely typed config scalars
//!
//! # Example
//!
//! ```rust
//! use marketwatch_core::{RotationEnv, RotationMode, TaskConfig};
//!
//! let task = TaskConfig::new("Sony A7M4", "sony a7m4");
//! let env = RotationEnv::from_lookup(|_| None);
//! assert!(task.validate().is_ok());
//! assert!(env.account_mode.is_none());
//! assert_eq!(RotationMode::default(), RotationMode::PerTask);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    find_task, load_tasks, AccountRotationConfig, EgressPoolSpec, ProxyRotationConfig,
    RotationEnv, RuntimeSettings, TaskConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::{is_truthy, ConfigValue, RotationMode};
