use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Inspect how marketwatch would run a task.
#[derive(Parser, Debug)]
#[command(name = "marketwatch")]
#[command(about = "Inspect marketplace monitor tasks: rotation policy, dedup ledger, AI prompt")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Task selection shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct TaskArgs {
    #[arg(
        short,
        long,
        default_value = "config.json",
        help = "Task configuration file (JSON list of tasks)"
    )]
    pub config: PathBuf,

    #[arg(short, long, help = "Name of the task to inspect")]
    pub task_name: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved rotation policy and candidate counts as JSON.
    Policy {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Count the listings already recorded in the task's output log.
    Ledger {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Print the task's composed AI prompt.
    Prompt {
        #[command(flatten)]
        task: TaskArgs,
    },
}

impl Commands {
    /// Task selection of the chosen subcommand.
    pub fn task_args(&self) -> &TaskArgs {
        match self {
            Self::Policy { task } | Self::Ledger { task } | Self::Prompt { task } => task,
        }
    }
}
