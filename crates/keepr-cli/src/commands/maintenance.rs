use anyhow::Result;
use clap::{Args, Subcommand};
use keepr_core::{maintenance, CoreError, MaintenanceOpts};

use super::open_repo;

#[derive(Args)]
pub struct MaintenanceArgs {
    #[command(subcommand)]
    command: MaintenanceCommand,
}

#[derive(Subcommand)]
pub enum MaintenanceCommand {
    /// Run maintenance tasks on the repository
    Run {
        /// Run only the tasks whose heuristics say work is needed
        #[arg(long)]
        auto: bool,

        /// Do not report progress or other information to stderr
        #[arg(long)]
        quiet: bool,

        /// Run a specific task (repeatable; runs in the given order)
        #[arg(long, value_name = "task")]
        task: Vec<String>,
    },
}

pub fn run(args: &MaintenanceArgs) -> Result<i32> {
    match &args.command {
        MaintenanceCommand::Run { auto, quiet, task } => run_maintenance(*auto, *quiet, task),
    }
}

fn run_maintenance(auto: bool, quiet: bool, tasks: &[String]) -> Result<i32> {
    let repo = open_repo()?;
    let opts = MaintenanceOpts {
        auto,
        quiet,
        tasks: tasks.to_vec(),
    };

    match maintenance::run(&repo, &opts) {
        Ok(code) => Ok(code),
        // Bad --task input is a usage error, not a fatal one.
        Err(e @ (CoreError::UnknownTask(_) | CoreError::DuplicateTask(_))) => {
            eprintln!("error: {e}");
            Ok(129)
        }
        Err(e) => Err(e.into()),
    }
}
