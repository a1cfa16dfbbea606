//! Loading rotation candidates from disk and configuration.

use marketwatch_core::EgressPoolSpec;
use std::fs;
use std::path::Path;

/// List identity (login state) files in `dir`, sorted for determinism.
///
/// Only `*.json` entries are considered. A missing or unreadable directory
/// yields no candidates.
#[must_use]
pub fn load_identity_sources(dir: &Path) -> Vec<String> {
    if dir.as_os_str().is_empty() || !dir.is_dir() {
        return Vec::new();
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read identity directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .map(|path| path.display().to_string())
        .collect();
    files.sort();
    files
}

/// Split an egress pool into individual endpoints, trimming whitespace and
/// dropping empties.
#[must_use]
pub fn parse_egress_pool(spec: &EgressPoolSpec) -> Vec<String> {
    match spec {
        EgressPoolSpec::List(items) => items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        EgressPoolSpec::Joined(raw) => parse_egress_list(raw),
    }
}

/// Split a comma-delimited endpoint list.
#[must_use]
pub fn parse_egress_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
