//! AI prompt composition from a base prompt and task criteria.

use crate::error::Result;
use marketwatch_core::TaskConfig;

/// Placeholder in the base prompt replaced by the task's criteria.
pub const CRITERIA_PLACEHOLDER: &str = "{{CRITERIA_SECTION}}";

/// Insert `criteria` into `base` at the criteria placeholder.
#[must_use]
pub fn compose_prompt(base: &str, criteria: &str) -> String {
    base.replace(CRITERIA_PLACEHOLDER, criteria)
}

/// Read and compose the prompt files named by `task`.
///
/// Returns `None` unless the task names both a base and a criteria file.
pub async fn load_task_prompt(task: &TaskConfig) -> Result<Option<String>> {
    let (Some(base_file), Some(criteria_file)) =
        (&task.ai_prompt_base_file, &task.ai_prompt_criteria_file)
    else {
        tracing::debug!("Task {} has no AI prompt configured", task.task_name);
        return Ok(None);
    };

    let base = tokio::fs::read_to_string(base_file).await?;
    let criteria = tokio::fs::read_to_string(criteria_file).await?;
    Ok(Some(compose_prompt(&base, &criteria)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compose_replaces_placeholder() {
        let base = "You are a buyer.\n{{CRITERIA_SECTION}}\nAnswer in JSON.";
        let prompt = compose_prompt(base, "Battery health above 90%.");
        assert_eq!(
            prompt,
            "You are a buyer.\nBattery health above 90%.\nAnswer in JSON."
        );
    }

    #[test]
    fn test_compose_without_placeholder_keeps_base() {
        assert_eq!(compose_prompt("plain", "criteria"), "plain");
    }

    #[tokio::test]
    async fn test_load_task_prompt() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base_prompt.txt");
        let criteria = tmp.path().join("macbook_criteria.txt");
        tokio::fs::write(&base, "Rules:\n{{CRITERIA_SECTION}}").await.unwrap();
        tokio::fs::write(&criteria, "M1 or newer").await.unwrap();

        let mut task = TaskConfig::new("MacBook", "macbook");
        assert_eq!(load_task_prompt(&task).await.unwrap(), None);

        task.ai_prompt_base_file = Some(base.display().to_string());
        task.ai_prompt_criteria_file = Some(criteria.display().to_string());
        assert_eq!(
            load_task_prompt(&task).await.unwrap().as_deref(),
            Some("Rules:\nM1 or newer")
        );
    }

    #[tokio::test]
    async fn test_load_task_prompt_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let mut task = TaskConfig::new("MacBook", "macbook");
        task.ai_prompt_base_file = Some(tmp.path().join("nope.txt").display().to_string());
        task.ai_prompt_criteria_file = Some(tmp.path().join("nope2.txt").display().to_string());

        assert!(load_task_prompt(&task).await.is_err());
    }
}
