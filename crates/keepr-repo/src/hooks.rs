//! Hook execution.
//!
//! The supervisor runs exactly one hook, `pre-auto-gc`, but the runner
//! stays generic: it resolves `core.hooksPath` and treats a missing
//! hook as success, the way git does.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::Repository;

pub struct HookRunner {
    hooks_path: PathBuf,
}

pub struct HookResult {
    pub exit_code: i32,
}

impl HookResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl HookRunner {
    pub fn new(repo: &Repository) -> Self {
        let hooks_path = match repo.config().get_string("core.hooksPath") {
            Ok(Some(path)) if !path.is_empty() => PathBuf::from(path),
            _ => repo.git_dir().join("hooks"),
        };
        Self { hooks_path }
    }

    /// Run a hook by name. A hook that does not exist succeeds.
    pub fn run(&self, name: &str) -> Result<HookResult, std::io::Error> {
        let path = self.hooks_path.join(name);
        if !path.is_file() {
            return Ok(HookResult { exit_code: 0 });
        }

        let status = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;

        Ok(HookResult {
            exit_code: status.code().unwrap_or(128),
        })
    }
}
