use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::error::UtilError;
use crate::Result;

/// Stdio mode for subprocess streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit the parent process's stream.
    Inherit,
    /// Pipe the stream (capture it).
    Pipe,
    /// Redirect to /dev/null.
    Null,
}

impl StdioMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::Pipe => Stdio::piped(),
            StdioMode::Null => Stdio::null(),
        }
    }
}

/// Result of waiting on a subprocess.
#[derive(Debug)]
pub struct SubprocessResult {
    pub status: ExitStatus,
    /// Captured stdout (empty unless piped).
    pub stdout: Vec<u8>,
    /// Captured stderr (empty unless piped).
    pub stderr: Vec<u8>,
}

impl SubprocessResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for child-worker execution.
///
/// A thin fluent wrapper over `std::process::Command`. Every wait is
/// unbounded: housekeeping workers run to completion and cancellation
/// comes from signals, not timers.
pub struct Subprocess {
    program: OsString,
    args: Vec<OsString>,
    stdin_mode: StdioMode,
    stdout_mode: StdioMode,
    stderr_mode: StdioMode,
    working_dir: Option<PathBuf>,
}

impl Subprocess {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            stdin_mode: StdioMode::Inherit,
            stdout_mode: StdioMode::Inherit,
            stderr_mode: StdioMode::Inherit,
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn stdin(mut self, mode: StdioMode) -> Self {
        self.stdin_mode = mode;
        self
    }

    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout_mode = mode;
        self
    }

    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr_mode = mode;
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The full command line, for diagnostics.
    pub fn command_line(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(self.stdin_mode.to_stdio());
        cmd.stdout(self.stdout_mode.to_stdio());
        cmd.stderr(self.stderr_mode.to_stdio());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion and collect any piped output.
    pub fn run(&self) -> Result<SubprocessResult> {
        let child = self.spawn()?;
        let output = child
            .wait_with_output()
            .map_err(|e| UtilError::Subprocess {
                command: self.command_line(),
                source: e,
            })?;
        Ok(SubprocessResult {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Spawn without waiting; the caller drives stdin and waits.
    pub fn spawn(&self) -> Result<Child> {
        self.build().spawn().map_err(|e| UtilError::Subprocess {
            command: self.command_line(),
            source: e,
        })
    }
}
