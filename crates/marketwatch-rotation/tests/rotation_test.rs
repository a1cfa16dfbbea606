use marketwatch_core::{RotationEnv, TaskConfig};
use marketwatch_rotation::{
    ManualClock, RotationItem, RotationPolicy, RotationPool, Selector, SelectorOptions,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to write identity files into a fresh state directory
fn state_dir_with(files: &[&str]) -> TempDir {
    let tmp = TempDir::new().expect("create temp dir");
    for name in files {
        fs::write(tmp.path().join(name), "{}").expect("write identity file");
    }
    tmp
}

fn task_from_json(json: &str) -> TaskConfig {
    serde_json::from_str(json).expect("parse task")
}

fn file_name(value: &str) -> String {
    Path::new(value)
        .file_name()
        .expect("file name")
        .to_string_lossy()
        .into_owned()
}

#[test]
fn test_blacklisted_item_reappears_after_ttl() {
    let clock = ManualClock::default();
    let mut pool = RotationPool::new(["a.json", "b.json", "c.json"], 60)
        .with_clock(Arc::new(clock.clone()))
        .with_seed(1);

    let bad = RotationItem::new("b.json");
    pool.mark_bad(Some(&bad), "FAIL_SYS_USER_VALIDATE");
    assert!(pool.available_items().iter().all(|item| item.value != "b.json"));

    clock.advance_secs(60);
    assert!(pool.available_items().iter().any(|item| item.value == "b.json"));
}

#[test]
fn test_on_failure_rotation_from_task_config() {
    let state = state_dir_with(&["a.json", "b.json"]);
    let task = task_from_json(&format!(
        r#"{{
            "task_name": "Sony A7M4",
            "keyword": "sony a7m4",
            "account_rotation": {{
                "enabled": true,
                "mode": "on_failure",
                "state_dir": "{}",
                "retry_limit": 2,
                "blacklist_ttl_sec": 300
            }}
        }}"#,
        state.path().display()
    ));

    let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
    let mut options = SelectorOptions::new(state.path().join("no_default.json"));
    options.clock = Arc::new(ManualClock::default());
    options.seed = Some(99);
    let mut selector = Selector::prepare(policy, options).expect("prepare selector");

    let first = selector.select_identity(false).expect("first identity");
    selector.mark_identity_bad("baxia-dialog");
    let second = selector.select_identity(true).expect("second identity");

    let mut used = vec![file_name(&first.value), file_name(&second.value)];
    used.sort();
    assert_eq!(used, vec!["a.json", "b.json"]);
}

#[test]
fn test_per_task_egress_sticks_across_calls() {
    let task = task_from_json(
        r#"{
            "task_name": "MacBook",
            "keyword": "macbook",
            "proxy_rotation": {
                "enabled": "yes",
                "proxy_pool": "http://p1:8080,http://p2:8080,http://p3:8080"
            }
        }"#,
    );

    let policy = RotationPolicy::resolve(&task, &RotationEnv::default());
    let tmp = TempDir::new().expect("create temp dir");
    let mut selector =
        Selector::prepare(policy, SelectorOptions::new(tmp.path().join("none.json")))
            .expect("prepare selector");

    let first = selector.select_egress(false).expect("egress");
    assert_eq!(selector.select_egress(false), Some(first.clone()));
    assert_eq!(selector.select_egress(false), Some(first));
}
