//! Shared types used across Marketwatch crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strings accepted as "true" for boolean-like settings (compared case-insensitively).
pub const TRUTHY_VALUES: [&str; 5] = ["1", "true", "yes", "y", "on"];

/// Returns true if `value` is in the truthy set, ignoring case and surrounding whitespace.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    TRUTHY_VALUES.contains(&value.as_str())
}

/// When the identity or egress in use is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Keep one selection for the whole task run unless a failure forces a change
    #[default]
    PerTask,
    /// Rotate only after the previous attempt failed
    OnFailure,
}

impl RotationMode {
    /// Parse a mode name, ignoring case and surrounding whitespace.
    ///
    /// Returns `None` for unrecognised names.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per_task" => Some(Self::PerTask),
            "on_failure" => Some(Self::OnFailure),
            _ => None,
        }
    }

    /// Get the configuration spelling of this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerTask => "per_task",
            Self::OnFailure => "on_failure",
        }
    }
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loosely typed scalar from task configuration.
///
/// The web UI and hand-edited task files supply the same setting as a JSON
/// boolean, number or string; normalization into the final type happens in
/// the rotation resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// JSON boolean
    Bool(bool),
    /// JSON integer
    Int(i64),
    /// JSON number with a fractional part
    Float(f64),
    /// JSON string
    Text(String),
}

impl ConfigValue {
    /// Interpret the value as a boolean.
    ///
    /// Booleans are taken as-is. Everything else goes through the truthy
    /// set in its text form, so only the integer `1` counts as true.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => is_truthy(&n.to_string()),
            Self::Float(_) => false,
            Self::Text(s) => is_truthy(s),
        }
    }

    /// Interpret the value as an integer, or `None` if it is not integer-like.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) | Self::Float(_) => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
