use anyhow::Result;
use clap::Args;
use keepr_core::gc::{self, GcOptions};

use super::open_repo;

#[derive(Args)]
pub struct GcArgs {
    /// Suppress progress reporting
    #[arg(short, long)]
    quiet: bool,

    /// Prune unreferenced objects older than <date> (default: 2.weeks.ago)
    #[arg(long, value_name = "date")]
    prune: Option<Option<String>>,

    /// Be more thorough (increased runtime)
    #[arg(long)]
    aggressive: bool,

    /// Run only if housekeeping is needed
    #[arg(long)]
    auto: bool,

    /// Force gc even if another housekeeper may be running
    #[arg(long)]
    force: bool,

    /// Repack all other packs except the largest pack
    #[arg(long)]
    keep_largest_pack: bool,
}

pub fn run(args: &GcArgs) -> Result<i32> {
    let repo = open_repo()?;

    let opts = GcOptions {
        aggressive: args.aggressive,
        auto: args.auto,
        quiet: args.quiet,
        force: args.force,
        prune: args.prune.clone(),
        keep_largest_pack: args.keep_largest_pack,
    };

    Ok(gc::run(&repo, &opts)?)
}
