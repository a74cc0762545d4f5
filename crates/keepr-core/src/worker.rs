//! Invocation of the opaque child workers.
//!
//! Everything destructive (repack, prune, pack-refs, the midx and
//! commit-graph subcommands) is delegated to the stock git plumbing.
//! The argument vectors built here are contracts; tests pin them by
//! pointing `KEEPR_GIT` at a recording stub.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Child;

use keepr_repo::Repository;
use keepr_utils::subprocess::{StdioMode, Subprocess};

use crate::error::{CoreError, Result};

/// Environment override for the worker program (tests substitute a
/// stub; deployments can pin a specific git).
pub const GIT_PROGRAM_ENV: &str = "KEEPR_GIT";

pub struct Worker {
    program: OsString,
    repo_dir: PathBuf,
    args: Vec<String>,
}

impl Worker {
    /// A git worker for this repository. Runs as `git -C <dir> ...`
    /// with the working tree (or the git dir, when bare) as `<dir>`.
    pub fn git(repo: &Repository) -> Self {
        let program = std::env::var_os(GIT_PROGRAM_ENV).unwrap_or_else(|| "git".into());
        let repo_dir = repo
            .work_tree()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| repo.git_dir().to_path_buf());
        Self {
            program,
            repo_dir,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// The worker's subcommand name, used in failure diagnostics.
    pub fn name(&self) -> String {
        self.args.first().cloned().unwrap_or_default()
    }

    fn build(&self) -> Subprocess {
        Subprocess::new(&self.program)
            .arg("-C")
            .arg(&self.repo_dir)
            .args(&self.args)
    }

    /// Run to completion with inherited stdio; true on exit code 0.
    pub fn run(&self) -> Result<bool> {
        let result = self.build().run()?;
        Ok(result.success())
    }

    /// Run, treating a non-zero exit as fatal (`failed to run <cmd>`).
    pub fn run_or_die(&self) -> Result<()> {
        if self.run()? {
            Ok(())
        } else {
            Err(CoreError::WorkerFailed(self.name()))
        }
    }

    /// Spawn with a piped stdin for workers fed object ids line-wise.
    pub fn spawn_piped_stdin(&self) -> Result<Child> {
        Ok(self.build().stdin(StdioMode::Pipe).spawn()?)
    }
}
