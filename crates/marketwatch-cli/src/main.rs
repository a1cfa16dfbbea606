//! `marketwatch` operator binary.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use marketwatch_core::{find_task, load_tasks, RotationEnv, RuntimeSettings, TaskConfig};
use marketwatch_rotation::{RotationPolicy, Selector, SelectorOptions};
use marketwatch_scanner::{load_task_prompt, OutputLog};
use serde_json::{json, Value};
use tracing::info;

/// Initialize tracing subscriber for structured logging.
///
/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,marketwatch=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let args = cli.command.task_args();
    let tasks = load_tasks(&args.config)
        .with_context(|| format!("loading tasks from {}", args.config.display()))?;
    let task = find_task(&tasks, &args.task_name)?;
    let settings = RuntimeSettings::from_env();
    info!("Inspecting task {} from {}", task.task_name, args.config.display());

    match &cli.command {
        Commands::Policy { .. } => {
            let report = policy_report(task, &RotationEnv::from_env(), &settings)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Ledger { .. } => {
            let log = OutputLog::for_keyword(&settings.output_dir, &task.keyword);
            let ledger = log
                .load_ledger()
                .await
                .with_context(|| format!("reading {}", log.path().display()))?;
            println!("{}: {} known listings", log.path().display(), ledger.len());
        }
        Commands::Prompt { .. } => match load_task_prompt(task).await? {
            Some(prompt) => println!("{prompt}"),
            None => anyhow::bail!("task {} has no AI prompt files configured", task.task_name),
        },
    }

    Ok(())
}

/// Resolved policy plus the candidates a run would start with.
fn policy_report(task: &TaskConfig, env: &RotationEnv, settings: &RuntimeSettings) -> Result<Value> {
    let mut options = SelectorOptions::new(&settings.state_file);
    options.forced_identity.clone_from(&task.account_state_file);

    let selector = Selector::prepare(RotationPolicy::resolve(task, env), options)
        .with_context(|| format!("preparing rotation for task {}", task.task_name))?;
    let policy = selector.policy();

    Ok(json!({
        "task_name": task.task_name,
        "policy": policy,
        "attempt_limit": policy.attempt_limit(),
        "forced_identity": task.account_state_file,
        "identity_candidates": selector.identity_pool().len(),
        "egress_candidates": selector.egress_pool().len(),
    }))
}
