//! The log-capture protocol for detached runs.
//!
//! A detached `gc --auto` cannot report errors to a terminal, so its
//! stderr is redirected into a lock on `<gitdir>/gc.log`. On exit the
//! lock commits iff anything was captured; a committed, non-empty
//! `gc.log` then gates the next auto run until a human removes it or
//! the `gc.logExpiry` horizon passes.

use std::time::{SystemTime, UNIX_EPOCH};

use keepr_repo::Repository;
use keepr_utils::lockfile::LockFile;

use crate::error::Result;

/// Outcome of the previous-failure gate.
#[derive(Debug, PartialEq, Eq)]
pub enum LogGate {
    Proceed,
    /// A prior detached run failed recently; skip this one.
    Refuse,
}

/// Check `gc.log` before an auto run. I/O errors bubble up (the
/// caller exits 128); a fresh non-empty log warns and refuses.
pub fn report_last_gc_error(repo: &Repository, log_expire_time: i64) -> Result<LogGate> {
    let path = repo.git_path("gc.log");

    let meta = match std::fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LogGate::Proceed),
        Err(e) => return Err(e.into()),
    };

    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    if mtime < log_expire_time {
        // Old enough that a retry is worth more than the stale report.
        return Ok(LogGate::Proceed);
    }

    let contents = std::fs::read_to_string(&path)?;
    if contents.is_empty() {
        return Ok(LogGate::Proceed);
    }

    eprintln!(
        "warning: The last gc run reported the following. Please correct the root cause\n\
         and remove {}.\n\
         Automatic cleanup will not be performed until the file is removed.\n\n\
         {}",
        path.display(),
        contents
    );
    Ok(LogGate::Refuse)
}

/// Redirect stderr into a lock on `gc.log` and arrange for the lock to
/// be committed (non-empty capture) or rolled back (clean run) on
/// every exit path, including fatal signals.
#[cfg(unix)]
pub fn install_log_capture(repo: &Repository) -> Result<()> {
    use std::os::fd::AsRawFd;

    let lock = LockFile::acquire(repo.git_path("gc.log"))?;
    let fd = lock
        .file()
        .map(|f| f.as_raw_fd())
        .expect("freshly acquired lock has an open file");

    crate::cleanup::set_log_capture(fd, lock.lock_path(), lock.path());
    unsafe {
        libc::dup2(fd, 2);
    }
    crate::cleanup::install_handlers();

    // The exit handlers own the lock file from here; keep the fd open
    // and skip the RAII rollback.
    std::mem::forget(lock);
    Ok(())
}

#[cfg(not(unix))]
pub fn install_log_capture(_repo: &Repository) -> Result<()> {
    // Without fork there is no detached mode, hence nothing to capture.
    Ok(())
}

/// Current time as unix seconds, for expiry comparisons.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo(dir: &std::path::Path) -> Repository {
        let git = dir.join(".git");
        std::fs::create_dir_all(git.join("objects/pack")).unwrap();
        std::fs::create_dir_all(git.join("refs")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(git.join("config"), "").unwrap();
        Repository::open(dir).unwrap()
    }

    #[test]
    fn missing_log_proceeds() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = test_repo(tmp.path());
        assert_eq!(report_last_gc_error(&repo, 0).unwrap(), LogGate::Proceed);
    }

    #[test]
    fn fresh_nonempty_log_refuses() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = test_repo(tmp.path());
        std::fs::write(repo.git_path("gc.log"), "fatal: failed to run repack\n").unwrap();

        // Horizon a day in the past: the just-written file is fresher.
        let horizon = now_secs() - 86400;
        assert_eq!(
            report_last_gc_error(&repo, horizon).unwrap(),
            LogGate::Refuse
        );
    }

    #[test]
    fn expired_log_proceeds() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = test_repo(tmp.path());
        std::fs::write(repo.git_path("gc.log"), "old failure\n").unwrap();

        // Horizon in the future: every existing mtime predates it.
        let horizon = now_secs() + 3600;
        assert_eq!(
            report_last_gc_error(&repo, horizon).unwrap(),
            LogGate::Proceed
        );
    }

    #[test]
    fn empty_log_proceeds() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = test_repo(tmp.path());
        std::fs::write(repo.git_path("gc.log"), "").unwrap();
        assert_eq!(
            report_last_gc_error(&repo, now_secs() - 86400).unwrap(),
            LogGate::Proceed
        );
    }
}
