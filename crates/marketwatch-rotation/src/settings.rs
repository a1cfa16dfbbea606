//! Rotation policy resolution.
//!
//! Every field resolves with the same precedence: task value, then the
//! process-wide environment default, then the built-in default.

use crate::pool::DEFAULT_BLACKLIST_TTL_SECS;
use crate::sources::{parse_egress_list, parse_egress_pool};
use marketwatch_core::{is_truthy, ConfigValue, RotationEnv, RotationMode, TaskConfig};
use serde::Serialize;
use std::path::PathBuf;

/// Retry limit used when neither task nor environment set one.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Identity directory used when neither task nor environment set one.
pub const DEFAULT_IDENTITY_SOURCE_DIR: &str = "state";

/// Resolved identity rotation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityPolicy {
    /// Rotate through the identity pool
    pub enabled: bool,
    /// When to rotate
    pub mode: RotationMode,
    /// Directory scanned for identity files
    pub source_dir: PathBuf,
    /// Attempt budget contribution, at least 1
    pub retry_limit: u32,
    /// Blacklist duration; 0 disables exclusion
    pub blacklist_ttl_secs: i64,
}

/// Resolved egress rotation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EgressPolicy {
    /// Rotate through the egress pool
    pub enabled: bool,
    /// When to rotate
    pub mode: RotationMode,
    /// Parsed proxy endpoints
    pub pool: Vec<String>,
    /// Attempt budget contribution, at least 1
    pub retry_limit: u32,
    /// Blacklist duration; 0 disables exclusion
    pub blacklist_ttl_secs: i64,
}

/// Immutable rotation settings for one task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationPolicy {
    /// Identity (account) rotation
    pub identity: IdentityPolicy,
    /// Egress (proxy) rotation
    pub egress: EgressPolicy,
}

impl RotationPolicy {
    /// Merge task configuration with environment defaults.
    ///
    /// A forced identity (`account_state_file`) always disables identity
    /// rotation.
    #[must_use]
    pub fn resolve(task: &TaskConfig, env: &RotationEnv) -> Self {
        let account = task.account_rotation.clone().unwrap_or_default();
        let proxy = task.proxy_rotation.clone().unwrap_or_default();

        let mut identity = IdentityPolicy {
            enabled: resolve_flag(account.enabled.as_ref(), env.account_enabled.as_deref()),
            mode: resolve_mode(
                account.mode.as_deref(),
                env.account_mode.as_deref(),
                "account",
            ),
            source_dir: PathBuf::from(
                account
                    .state_dir
                    .as_deref()
                    .or(env.account_state_dir.as_deref())
                    .unwrap_or(DEFAULT_IDENTITY_SOURCE_DIR),
            ),
            retry_limit: floor_retry_limit(resolve_int(
                account.retry_limit.as_ref(),
                env.account_retry_limit.as_deref(),
                i64::from(DEFAULT_RETRY_LIMIT),
            )),
            blacklist_ttl_secs: resolve_int(
                account.blacklist_ttl_sec.as_ref(),
                env.account_blacklist_ttl.as_deref(),
                DEFAULT_BLACKLIST_TTL_SECS,
            )
            .max(0),
        };

        if task.account_state_file.is_some() && identity.enabled {
            tracing::debug!(
                "Task {} forces an identity file, disabling identity rotation",
                task.task_name
            );
            identity.enabled = false;
        }

        let pool = match proxy.proxy_pool.as_ref() {
            Some(spec) if !spec.is_blank() => parse_egress_pool(spec),
            _ => env
                .proxy_pool
                .as_deref()
                .map(parse_egress_list)
                .unwrap_or_default(),
        };

        let egress = EgressPolicy {
            enabled: resolve_flag(proxy.enabled.as_ref(), env.proxy_enabled.as_deref()),
            mode: resolve_mode(proxy.mode.as_deref(), env.proxy_mode.as_deref(), "proxy"),
            pool,
            retry_limit: floor_retry_limit(resolve_int(
                proxy.retry_limit.as_ref(),
                env.proxy_retry_limit.as_deref(),
                i64::from(DEFAULT_RETRY_LIMIT),
            )),
            blacklist_ttl_secs: resolve_int(
                proxy.blacklist_ttl_sec.as_ref(),
                env.proxy_blacklist_ttl.as_deref(),
                DEFAULT_BLACKLIST_TTL_SECS,
            )
            .max(0),
        };

        Self { identity, egress }
    }

    /// Total attempts allowed for one run.
    ///
    /// Both resources share one counter, so the budget is the larger of the
    /// two limits rather than their sum.
    #[must_use]
    pub fn attempt_limit(&self) -> u32 {
        self.identity.retry_limit.max(self.egress.retry_limit).max(1)
    }

    /// True if a failed attempt should blacklist and replace the identity.
    #[must_use]
    pub fn rotates_identity_on_failure(&self) -> bool {
        self.identity.enabled && self.identity.mode == RotationMode::OnFailure
    }

    /// True if a failed attempt should blacklist and replace the egress.
    #[must_use]
    pub fn rotates_egress_on_failure(&self) -> bool {
        self.egress.enabled && self.egress.mode == RotationMode::OnFailure
    }
}

fn resolve_flag(task: Option<&ConfigValue>, env: Option<&str>) -> bool {
    match task {
        Some(value) => value.as_bool(),
        None => env.is_some_and(is_truthy),
    }
}

/// Task value if integer-like, else the env value if numeric, else `default`.
fn resolve_int(task: Option<&ConfigValue>, env: Option<&str>, default: i64) -> i64 {
    let fallback = env
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default);
    task.and_then(ConfigValue::as_int).unwrap_or(fallback)
}

fn resolve_mode(task: Option<&str>, env: Option<&str>, resource: &str) -> RotationMode {
    let Some(raw) = task.or(env) else {
        return RotationMode::default();
    };

    RotationMode::parse(raw).unwrap_or_else(|| {
        tracing::warn!(
            "Unknown {} rotation mode '{}', falling back to {}",
            resource,
            raw,
            RotationMode::default()
        );
        RotationMode::default()
    })
}

fn floor_retry_limit(value: i64) -> u32 {
    u32::try_from(value.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketwatch_core::{AccountRotationConfig, EgressPoolSpec, ProxyRotationConfig};

    fn task() -> TaskConfig {
        TaskConfig::new("Sony A7M4", "sony a7m4")
    }

    fn env(pairs: &[(&str, &str)]) -> RotationEnv {
        RotationEnv::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        })
    }

    #[test]
    fn test_hardcoded_defaults() {
        let policy = RotationPolicy::resolve(&task(), &RotationEnv::default());

        assert!(!policy.identity.enabled);
        assert_eq!(policy.identity.mode, RotationMode::PerTask);
        assert_eq!(policy.identity.source_dir, PathBuf::from("state"));
        assert_eq!(policy.identity.retry_limit, 2);
        assert_eq!(policy.identity.blacklist_ttl_secs, 300);

        assert!(!policy.egress.enabled);
        assert_eq!(policy.egress.mode, RotationMode::PerTask);
        assert!(policy.egress.pool.is_empty());
        assert_eq!(policy.egress.retry_limit, 2);
        assert_eq!(policy.egress.blacklist_ttl_secs, 300);
        assert_eq!(policy.attempt_limit(), 2);
    }

    #[test]
    fn test_env_defaults_apply() {
        let env = env(&[
            ("ACCOUNT_ROTATION_ENABLED", "Yes"),
            ("ACCOUNT_ROTATION_MODE", "ON_FAILURE"),
            ("ACCOUNT_STATE_DIR", "/var/lib/marketwatch/state"),
            ("ACCOUNT_ROTATION_RETRY_LIMIT", "4"),
            ("ACCOUNT_BLACKLIST_TTL", "120"),
            ("PROXY_ROTATION_ENABLED", "1"),
            ("PROXY_POOL", "http://p1:8080,http://p2:8080"),
        ]);
        let policy = RotationPolicy::resolve(&task(), &env);

        assert!(policy.identity.enabled);
        assert_eq!(policy.identity.mode, RotationMode::OnFailure);
        assert_eq!(
            policy.identity.source_dir,
            PathBuf::from("/var/lib/marketwatch/state")
        );
        assert_eq!(policy.identity.retry_limit, 4);
        assert_eq!(policy.identity.blacklist_ttl_secs, 120);
        assert!(policy.egress.enabled);
        assert_eq!(policy.egress.pool, vec!["http://p1:8080", "http://p2:8080"]);
        assert_eq!(policy.attempt_limit(), 4);
    }

    #[test]
    fn test_task_values_win_over_env() {
        let mut task = task();
        task.account_rotation = Some(AccountRotationConfig {
            enabled: Some(ConfigValue::Bool(false)),
            mode: Some("per_task".to_string()),
            state_dir: Some("task_state".to_string()),
            retry_limit: Some(ConfigValue::Int(5)),
            blacklist_ttl_sec: Some(ConfigValue::Text("30".to_string())),
        });
        task.proxy_rotation = Some(ProxyRotationConfig {
            enabled: Some(ConfigValue::Text("on".to_string())),
            proxy_pool: Some(EgressPoolSpec::List(vec!["socks5://t:1080".to_string()])),
            ..ProxyRotationConfig::default()
        });
        let env = env(&[
            ("ACCOUNT_ROTATION_ENABLED", "true"),
            ("ACCOUNT_ROTATION_MODE", "on_failure"),
            ("ACCOUNT_STATE_DIR", "env_state"),
            ("ACCOUNT_ROTATION_RETRY_LIMIT", "9"),
            ("PROXY_POOL", "http://env:8080"),
        ]);

        let policy = RotationPolicy::resolve(&task, &env);
        assert!(!policy.identity.enabled);
        assert_eq!(policy.identity.mode, RotationMode::PerTask);
        assert_eq!(policy.identity.source_dir, PathBuf::from("task_state"));
        assert_eq!(policy.identity.retry_limit, 5);
        assert_eq!(policy.identity.blacklist_ttl_secs, 30);
        assert!(policy.egress.enabled);
        assert_eq!(policy.egress.pool, vec!["socks5://t:1080"]);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let mut task = task();
        task.account_rotation = Some(AccountRotationConfig {
            retry_limit: Some(ConfigValue::Text("many".to_string())),
            ..AccountRotationConfig::default()
        });
        let env = env(&[
            ("ACCOUNT_ROTATION_RETRY_LIMIT", "3"),
            ("PROXY_ROTATION_RETRY_LIMIT", "lots"),
            ("PROXY_BLACKLIST_TTL", "soon"),
        ]);

        let policy = RotationPolicy::resolve(&task, &env);
        // task value unparseable -> env value
        assert_eq!(policy.identity.retry_limit, 3);
        // env value unparseable -> hardcoded default
        assert_eq!(policy.egress.retry_limit, 2);
        assert_eq!(policy.egress.blacklist_ttl_secs, 300);
    }

    #[test]
    fn test_limits_are_floored() {
        let mut task = task();
        task.account_rotation = Some(AccountRotationConfig {
            retry_limit: Some(ConfigValue::Int(0)),
            blacklist_ttl_sec: Some(ConfigValue::Int(-10)),
            ..AccountRotationConfig::default()
        });
        task.proxy_rotation = Some(ProxyRotationConfig {
            retry_limit: Some(ConfigValue::Int(-3)),
            ..ProxyRotationConfig::default()
        });

        let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
        assert_eq!(policy.identity.retry_limit, 1);
        assert_eq!(policy.identity.blacklist_ttl_secs, 0);
        assert_eq!(policy.egress.retry_limit, 1);
        assert_eq!(policy.attempt_limit(), 1);
    }

    #[test]
    fn test_numeric_flags_use_truthy_set() {
        let task: TaskConfig = serde_json::from_str(
            r#"{
                "task_name": "Sony A7M4",
                "keyword": "sony a7m4",
                "account_rotation": { "enabled": 1 },
                "proxy_rotation": { "enabled": 2 }
            }"#,
        )
        .expect("parse task");
        let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
        assert!(policy.identity.enabled);
        assert!(!policy.egress.enabled);

        let mut task = task;
        task.proxy_rotation = Some(ProxyRotationConfig {
            enabled: Some(ConfigValue::Float(0.5)),
            ..ProxyRotationConfig::default()
        });
        let policy = RotationPolicy::resolve(&task, &env(&[("PROXY_ROTATION_ENABLED", "true")]));
        assert!(!policy.egress.enabled);
    }

    #[test]
    fn test_forced_identity_disables_rotation() {
        let mut task = task();
        task.account_state_file = Some("special.json".to_string());
        task.account_rotation = Some(AccountRotationConfig {
            enabled: Some(ConfigValue::Bool(true)),
            mode: Some("on_failure".to_string()),
            ..AccountRotationConfig::default()
        });

        let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
        assert!(!policy.identity.enabled);
        assert!(!policy.rotates_identity_on_failure());
    }

    #[test]
    fn test_attempt_limit_is_max_not_sum() {
        let mut task = task();
        task.account_rotation = Some(AccountRotationConfig {
            retry_limit: Some(ConfigValue::Int(2)),
            ..AccountRotationConfig::default()
        });
        task.proxy_rotation = Some(ProxyRotationConfig {
            retry_limit: Some(ConfigValue::Int(3)),
            ..ProxyRotationConfig::default()
        });

        let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
        assert_eq!(policy.attempt_limit(), 3);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_per_task() {
        let env = env(&[("PROXY_ROTATION_MODE", "round_robin")]);
        let policy = RotationPolicy::resolve(&task(), &env);
        assert_eq!(policy.egress.mode, RotationMode::PerTask);
    }

    #[test]
    fn test_blank_task_pool_falls_back_to_env() {
        let mut task = task();
        task.proxy_rotation = Some(ProxyRotationConfig {
            proxy_pool: Some(EgressPoolSpec::List(Vec::new())),
            ..ProxyRotationConfig::default()
        });
        let env = env(&[("PROXY_POOL", "http://env:8080")]);

        let policy = RotationPolicy::resolve(&task, &env);
        assert_eq!(policy.egress.pool, vec!["http://env:8080"]);
    }

    #[test]
    fn test_policy_serializes() {
        let policy = RotationPolicy::resolve(&task(), &RotationEnv::default());
        let json = serde_json::to_value(&policy).expect("serialize policy");
        assert_eq!(json["identity"]["mode"], "per_task");
        assert_eq!(json["egress"]["retry_limit"], 2);
    }
}
