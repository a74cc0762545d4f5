//! Shared fixtures: synthetic repositories and a stub `git` worker
//! that records every argv line it is invoked with.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Create a minimal working-tree repository with the given config.
pub fn make_repo(dir: &Path, config: &str) {
    let git = dir.join(".git");
    std::fs::create_dir_all(git.join("objects/pack")).unwrap();
    std::fs::create_dir_all(git.join("refs/heads")).unwrap();
    std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(git.join("config"), config).unwrap();
}

/// Install the recording stub and return (stub path, log path).
///
/// The stub strips the leading `-C <dir>`, appends the remaining argv
/// to `$KEEPR_TEST_LOG`, drains stdin for pack-objects, and fails when
/// `$KEEPR_FAIL_ON` names its subcommand (or `$KEEPR_FAIL_ON_SUB`
/// names its `cmd sub` pair).
pub fn stub_git(dir: &Path) -> (PathBuf, PathBuf) {
    let stub = dir.join("stub-git");
    let log = dir.join("worker.log");
    std::fs::write(
        &stub,
        "#!/bin/sh\n\
         if [ \"$1\" = \"-C\" ]; then shift 2; fi\n\
         echo \"$@\" >> \"$KEEPR_TEST_LOG\"\n\
         if [ \"$1\" = \"pack-objects\" ]; then cat > /dev/null; fi\n\
         if [ -n \"$KEEPR_FAIL_ON\" ] && [ \"$1\" = \"$KEEPR_FAIL_ON\" ]; then exit 1; fi\n\
         if [ -n \"$KEEPR_FAIL_ON_SUB\" ] && [ \"$1 $2\" = \"$KEEPR_FAIL_ON_SUB\" ]; then exit 1; fi\n\
         exit 0\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    (stub, log)
}

/// Run the keepr binary in `repo_dir` with the stub wired up.
pub fn keepr(repo_dir: &Path, stub: &Path, log: &Path, args: &[&str]) -> Output {
    keepr_env(repo_dir, stub, log, args, &[])
}

pub fn keepr_env(
    repo_dir: &Path,
    stub: &Path,
    log: &Path,
    args: &[&str],
    extra_env: &[(&str, &str)],
) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_keepr"));
    cmd.arg("-C")
        .arg(repo_dir)
        .args(args)
        .env("KEEPR_GIT", stub)
        .env("KEEPR_TEST_LOG", log)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env_remove("KEEPR_FAIL_ON")
        .env_remove("KEEPR_FAIL_ON_SUB");
    for (key, value) in extra_env {
        cmd.env(key, value);
    }
    cmd.output().unwrap()
}

/// The recorded worker invocations, one argv per line.
pub fn worker_log(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Index of the first log line starting with `prefix`.
pub fn position_of(log_lines: &[String], prefix: &str) -> Option<usize> {
    log_lines.iter().position(|l| l.starts_with(prefix))
}

pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
