pub mod gc;
pub mod maintenance;

use anyhow::Result;
use clap::Subcommand;
use keepr_repo::Repository;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Cleanup unnecessary files and optimize the repository
    Gc(gc::GcArgs),
    /// Run tasks to optimize the repository
    Maintenance(maintenance::MaintenanceArgs),
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Gc(args) => gc::run(args),
        Commands::Maintenance(args) => maintenance::run(args),
    }
}

/// Open the repository containing the current directory.
pub fn open_repo() -> Result<Repository> {
    Ok(Repository::discover(".")?)
}
