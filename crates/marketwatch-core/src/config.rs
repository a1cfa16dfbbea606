//! Task configuration and process-wide defaults.
//!
//! Tasks are stored as a JSON array. Values arrive from a web form and from
//! hand-edited files, so optional text fields may contain the sentinels
//! `""`, `"null"` or `"undefined"`; these are normalized to `None` here and
//! nowhere else.
//!
//! Process-wide defaults come from environment variables. They are captured
//! once into plain structs through a lookup function so callers (and tests)
//! never read the environment deep inside rotation logic.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{is_truthy, ConfigValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable: default for `account_rotation.enabled`.
pub const ENV_ACCOUNT_ROTATION_ENABLED: &str = "ACCOUNT_ROTATION_ENABLED";
/// Environment variable: default for `account_rotation.mode`.
pub const ENV_ACCOUNT_ROTATION_MODE: &str = "ACCOUNT_ROTATION_MODE";
/// Environment variable: default for `account_rotation.state_dir`.
pub const ENV_ACCOUNT_STATE_DIR: &str = "ACCOUNT_STATE_DIR";
/// Environment variable: default for `account_rotation.retry_limit`.
pub const ENV_ACCOUNT_ROTATION_RETRY_LIMIT: &str = "ACCOUNT_ROTATION_RETRY_LIMIT";
/// Environment variable: default for `account_rotation.blacklist_ttl_sec`.
pub const ENV_ACCOUNT_BLACKLIST_TTL: &str = "ACCOUNT_BLACKLIST_TTL";
/// Environment variable: default for `proxy_rotation.enabled`.
pub const ENV_PROXY_ROTATION_ENABLED: &str = "PROXY_ROTATION_ENABLED";
/// Environment variable: default for `proxy_rotation.mode`.
pub const ENV_PROXY_ROTATION_MODE: &str = "PROXY_ROTATION_MODE";
/// Environment variable: default for `proxy_rotation.proxy_pool`.
pub const ENV_PROXY_POOL: &str = "PROXY_POOL";
/// Environment variable: default for `proxy_rotation.retry_limit`.
pub const ENV_PROXY_ROTATION_RETRY_LIMIT: &str = "PROXY_ROTATION_RETRY_LIMIT";
/// Environment variable: default for `proxy_rotation.blacklist_ttl_sec`.
pub const ENV_PROXY_BLACKLIST_TTL: &str = "PROXY_BLACKLIST_TTL";
/// Environment variable: default identity (login state) file.
pub const ENV_STATE_FILE: &str = "STATE_FILE";
/// Environment variable: directory holding per-task output logs.
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
/// Environment variable: notify every new listing without AI screening.
pub const ENV_SKIP_AI_ANALYSIS: &str = "SKIP_AI_ANALYSIS";

/// Default identity file used when no rotation pool applies.
pub const DEFAULT_STATE_FILE: &str = "xianyu_state.json";
/// Default directory for output logs.
pub const DEFAULT_OUTPUT_DIR: &str = "jsonl";

/// A single monitoring task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique, human-readable task name
    pub task_name: String,
    /// Whether the task is scheduled at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Marketplace search keyword
    pub keyword: String,
    /// Free-form description
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub description: Option<String>,
    /// Number of result pages to walk per run
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Only consider listings from individual sellers
    #[serde(default = "default_true")]
    pub personal_only: bool,
    /// Lower price bound, kept as text
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub min_price: Option<String>,
    /// Upper price bound, kept as text
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub max_price: Option<String>,
    /// Cron expression for the scheduler
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub cron: Option<String>,
    /// Base AI prompt file containing the criteria placeholder
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub ai_prompt_base_file: Option<String>,
    /// Task-specific criteria file spliced into the base prompt
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub ai_prompt_criteria_file: Option<String>,
    /// Stop after this many new listings per run (0 = unlimited)
    #[serde(default)]
    pub max_items_per_round: u32,
    /// Forced identity file; disables identity rotation when set
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub account_state_file: Option<String>,
    /// Identity rotation overrides
    #[serde(default)]
    pub account_rotation: Option<AccountRotationConfig>,
    /// Egress rotation overrides
    #[serde(default)]
    pub proxy_rotation: Option<ProxyRotationConfig>,
}

impl TaskConfig {
    /// Create a task with the given name and keyword and defaults elsewhere.
    #[must_use]
    pub fn new(task_name: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            enabled: true,
            keyword: keyword.into(),
            description: None,
            max_pages: default_max_pages(),
            personal_only: true,
            min_price: None,
            max_price: None,
            cron: None,
            ai_prompt_base_file: None,
            ai_prompt_criteria_file: None,
            max_items_per_round: 0,
            account_state_file: None,
            account_rotation: None,
            proxy_rotation: None,
        }
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.task_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "task_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.keyword.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "keyword".to_string(),
                reason: format!("must not be empty (task '{}')", self.task_name),
            });
        }
        Ok(())
    }
}

/// Per-task identity rotation settings. Every field is optional; absent
/// fields fall back to the environment and then to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRotationConfig {
    /// Whether identity rotation is enabled
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub enabled: Option<ConfigValue>,
    /// `per_task` or `on_failure`
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub mode: Option<String>,
    /// Directory holding identity (login state) files
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub state_dir: Option<String>,
    /// Attempt budget contribution
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub retry_limit: Option<ConfigValue>,
    /// Seconds a failed identity stays excluded
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub blacklist_ttl_sec: Option<ConfigValue>,
}

/// Per-task egress (proxy) rotation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyRotationConfig {
    /// Whether egress rotation is enabled
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub enabled: Option<ConfigValue>,
    /// `per_task` or `on_failure`
    #[serde(default, deserialize_with = "sentinel::optional_text")]
    pub mode: Option<String>,
    /// Proxy endpoints, comma-delimited or as a list
    #[serde(default, deserialize_with = "sentinel::optional_pool")]
    pub proxy_pool: Option<EgressPoolSpec>,
    /// Attempt budget contribution
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub retry_limit: Option<ConfigValue>,
    /// Seconds a failed proxy stays excluded
    #[serde(default, deserialize_with = "sentinel::optional_value")]
    pub blacklist_ttl_sec: Option<ConfigValue>,
}

/// Raw egress pool as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EgressPoolSpec {
    /// Already split into endpoints
    List(Vec<String>),
    /// Comma-delimited endpoints
    Joined(String),
}

impl EgressPoolSpec {
    /// True if no non-blank endpoint is listed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::List(items) => items.iter().all(|item| item.trim().is_empty()),
            Self::Joined(raw) => raw.split(',').all(|item| item.trim().is_empty()),
        }
    }
}

/// Load every task from a JSON task file.
///
/// # Errors
/// Returns error if the file is missing, unreadable, not a JSON array of
/// tasks, or any task fails validation.
pub fn load_tasks(path: &Path) -> ConfigResult<Vec<TaskConfig>> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.display().to_string(),
        });
    }

    tracing::debug!("Loading tasks from {}", path.display());
    let contents = fs::read_to_string(path)?;
    let tasks: Vec<TaskConfig> = serde_json::from_str(&contents)?;
    for task in &tasks {
        task.validate()?;
    }
    Ok(tasks)
}

/// Find a task by exact name.
///
/// # Errors
/// Returns `ConfigError::TaskNotFound` if no task has that name.
pub fn find_task<'a>(tasks: &'a [TaskConfig], name: &str) -> ConfigResult<&'a TaskConfig> {
    tasks
        .iter()
        .find(|task| task.task_name == name)
        .ok_or_else(|| ConfigError::TaskNotFound {
            name: name.to_string(),
        })
}

/// Rotation defaults captured from the process environment.
///
/// Values are kept as raw strings; the rotation resolver owns parsing and
/// fallback rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationEnv {
    /// `ACCOUNT_ROTATION_ENABLED`
    pub account_enabled: Option<String>,
    /// `ACCOUNT_ROTATION_MODE`
    pub account_mode: Option<String>,
    /// `ACCOUNT_STATE_DIR`
    pub account_state_dir: Option<String>,
    /// `ACCOUNT_ROTATION_RETRY_LIMIT`
    pub account_retry_limit: Option<String>,
    /// `ACCOUNT_BLACKLIST_TTL`
    pub account_blacklist_ttl: Option<String>,
    /// `PROXY_ROTATION_ENABLED`
    pub proxy_enabled: Option<String>,
    /// `PROXY_ROTATION_MODE`
    pub proxy_mode: Option<String>,
    /// `PROXY_POOL`
    pub proxy_pool: Option<String>,
    /// `PROXY_ROTATION_RETRY_LIMIT`
    pub proxy_retry_limit: Option<String>,
    /// `PROXY_BLACKLIST_TTL`
    pub proxy_blacklist_ttl: Option<String>,
}

impl RotationEnv {
    /// Capture rotation defaults from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture rotation defaults through an arbitrary lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            account_enabled: get(ENV_ACCOUNT_ROTATION_ENABLED),
            account_mode: get(ENV_ACCOUNT_ROTATION_MODE),
            account_state_dir: get(ENV_ACCOUNT_STATE_DIR),
            account_retry_limit: get(ENV_ACCOUNT_ROTATION_RETRY_LIMIT),
            account_blacklist_ttl: get(ENV_ACCOUNT_BLACKLIST_TTL),
            proxy_enabled: get(ENV_PROXY_ROTATION_ENABLED),
            proxy_mode: get(ENV_PROXY_ROTATION_MODE),
            proxy_pool: get(ENV_PROXY_POOL),
            proxy_retry_limit: get(ENV_PROXY_ROTATION_RETRY_LIMIT),
            proxy_blacklist_ttl: get(ENV_PROXY_BLACKLIST_TTL),
        }
    }
}

/// Runtime locations and switches shared by every task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Default identity file used when rotation does not apply
    pub state_file: PathBuf,
    /// Directory holding per-task output logs
    pub output_dir: PathBuf,
    /// Notify every new listing without AI screening
    pub skip_ai_analysis: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            skip_ai_analysis: false,
        }
    }
}

impl RuntimeSettings {
    /// Load runtime settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load runtime settings through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(val) = lookup(ENV_STATE_FILE).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Override state_file from env: {}", val);
            settings.state_file = PathBuf::from(val);
        }

        if let Some(val) = lookup(ENV_OUTPUT_DIR).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Override output_dir from env: {}", val);
            settings.output_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup(ENV_SKIP_AI_ANALYSIS) {
            settings.skip_ai_analysis = is_truthy(&val);
        }

        settings
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> u32 {
    3
}

/// Deserializers that fold sentinel strings into `None`.
mod sentinel {
    use super::EgressPoolSpec;
    use crate::types::ConfigValue;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn is_absent(value: &str) -> bool {
        let value = value.trim();
        value.is_empty()
            || value.eq_ignore_ascii_case("null")
            || value.eq_ignore_ascii_case("undefined")
    }

    pub(super) fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if is_absent(&s) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(D::Error::custom(format!(
                "expected a string or number, got {other}"
            ))),
        }
    }

    pub(super) fn optional_value<'de, D>(deserializer: D) -> Result<Option<ConfigValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<ConfigValue>::deserialize(deserializer)?;
        Ok(value.filter(|v| !matches!(v, ConfigValue::Text(s) if is_absent(s))))
    }

    pub(super) fn optional_pool<'de, D>(deserializer: D) -> Result<Option<EgressPoolSpec>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<EgressPoolSpec>::deserialize(deserializer)?;
        Ok(value.filter(|spec| !matches!(spec, EgressPoolSpec::Joined(s) if is_absent(s))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const SAMPLE_TASKS: &str = r#"[
        {
            "task_name": "Sony A7M4",
            "keyword": "sony a7m4",
            "max_pages": 2,
            "personal_only": false,
            "min_price": 8000,
            "max_price": "null",
            "cron": "",
            "account_state_file": "undefined",
            "account_rotation": {
                "enabled": "yes",
                "mode": "on_failure",
                "retry_limit": "3",
                "blacklist_ttl_sec": null
            },
            "proxy_rotation": {
                "enabled": true,
                "proxy_pool": "http://p1:8080, http://p2:8080"
            }
        },
        {
            "task_name": "MacBook",
            "keyword": "macbook air m2",
            "proxy_rotation": { "proxy_pool": ["socks5://a:1080", "socks5://b:1080"] }
        }
    ]"#;

    fn write_tasks(contents: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("config.json");
        fs::write(&path, contents).expect("write task file");
        (tmp, path)
    }

    #[test]
    fn test_load_tasks_normalizes_sentinels() {
        let (_tmp, path) = write_tasks(SAMPLE_TASKS);
        let tasks = load_tasks(&path).expect("load tasks");
        assert_eq!(tasks.len(), 2);

        let sony = &tasks[0];
        assert_eq!(sony.min_price.as_deref(), Some("8000"));
        assert_eq!(sony.max_price, None);
        assert_eq!(sony.cron, None);
        assert_eq!(sony.account_state_file, None);
        assert!(!sony.personal_only);

        let account = sony.account_rotation.as_ref().expect("account rotation");
        assert_eq!(account.enabled, Some(ConfigValue::Text("yes".to_string())));
        assert_eq!(account.mode.as_deref(), Some("on_failure"));
        assert_eq!(account.state_dir, None);
        assert_eq!(account.blacklist_ttl_sec, None);

        let proxy = sony.proxy_rotation.as_ref().expect("proxy rotation");
        assert_eq!(
            proxy.proxy_pool,
            Some(EgressPoolSpec::Joined("http://p1:8080, http://p2:8080".to_string()))
        );
    }

    #[test]
    fn test_load_tasks_defaults() {
        let (_tmp, path) = write_tasks(SAMPLE_TASKS);
        let tasks = load_tasks(&path).expect("load tasks");

        let macbook = &tasks[1];
        assert!(macbook.enabled);
        assert!(macbook.personal_only);
        assert_eq!(macbook.max_pages, 3);
        assert_eq!(macbook.max_items_per_round, 0);
        assert!(macbook.account_rotation.is_none());
        assert!(matches!(
            macbook.proxy_rotation.as_ref().and_then(|p| p.proxy_pool.as_ref()),
            Some(EgressPoolSpec::List(items)) if items.len() == 2
        ));
    }

    #[test]
    fn test_load_tasks_missing_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let err = load_tasks(&tmp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_load_tasks_rejects_empty_keyword() {
        let (_tmp, path) = write_tasks(r#"[{"task_name": "Blank", "keyword": "  "}]"#);
        let err = load_tasks(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "keyword"));
    }

    #[test]
    fn test_find_task() {
        let (_tmp, path) = write_tasks(SAMPLE_TASKS);
        let tasks = load_tasks(&path).expect("load tasks");
        assert_eq!(
            find_task(&tasks, "MacBook").expect("find task").keyword,
            "macbook air m2"
        );
        assert!(matches!(
            find_task(&tasks, "Nikon"),
            Err(ConfigError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn test_egress_pool_spec_blank() {
        assert!(EgressPoolSpec::Joined(" , ".to_string()).is_blank());
        assert!(EgressPoolSpec::List(vec![String::new()]).is_blank());
        assert!(!EgressPoolSpec::Joined("http://p1:8080".to_string()).is_blank());
    }

    #[test]
    fn test_rotation_env_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_ACCOUNT_ROTATION_ENABLED, "true"),
            (ENV_ACCOUNT_ROTATION_MODE, "on_failure"),
            (ENV_PROXY_POOL, "   "),
            (ENV_PROXY_BLACKLIST_TTL, "60"),
        ]
        .into_iter()
        .collect();

        let env = RotationEnv::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(env.account_enabled.as_deref(), Some("true"));
        assert_eq!(env.account_mode.as_deref(), Some("on_failure"));
        assert_eq!(env.proxy_pool, None);
        assert_eq!(env.proxy_blacklist_ttl.as_deref(), Some("60"));
        assert_eq!(env.proxy_enabled, None);
    }

    #[test]
    fn test_runtime_settings() {
        let defaults = RuntimeSettings::from_lookup(|_| None);
        assert_eq!(defaults, RuntimeSettings::default());
        assert_eq!(defaults.state_file, PathBuf::from(DEFAULT_STATE_FILE));

        let settings = RuntimeSettings::from_lookup(|key| match key {
            ENV_STATE_FILE => Some("state/main.json".to_string()),
            ENV_OUTPUT_DIR => Some("out".to_string()),
            ENV_SKIP_AI_ANALYSIS => Some("Yes".to_string()),
            _ => None,
        });
        assert_eq!(settings.state_file, PathBuf::from("state/main.json"));
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert!(settings.skip_ai_analysis);
    }
}
