//! The single-writer housekeeping lock: `<gitdir>/gc.pid`.
//!
//! One `"<pid> <hostname>"` record serializes housekeepers per
//! repository, across processes and (via the hostname) across hosts
//! sharing a filesystem.

use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use keepr_repo::Repository;
use keepr_utils::lockfile::LockFile;
use keepr_utils::proc;

use crate::error::Result;

/// A stale pid file is reclaimable after this long. Generous on
/// purpose: gc never takes 12 hours, and running one day late is not a
/// problem, while breaking a live lock is.
const LOCK_STALE_SECS: u64 = 12 * 3600;

/// Longest hostname recorded or compared.
const HOST_MAX: usize = 255;

/// Holder of a live foreign lock, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub host: String,
    pub pid: u32,
}

pub enum LockResult {
    Acquired(HousekeepingLock),
    HeldBy(LockHolder),
}

/// RAII guard over the committed pid file.
pub struct HousekeepingLock {
    path: PathBuf,
}

impl Drop for HousekeepingLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        crate::cleanup::clear_pidfile();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to become the repository's housekeeper.
///
/// Without `force`, an existing pid file is honored while it is fresh
/// and names either another host or a live local process; the holder
/// is returned so the caller can report it. Stale or unparsable files
/// are reclaimed.
pub fn lock_repo_for_gc(repo: &Repository, force: bool) -> Result<LockResult> {
    let path = repo.git_path("gc.pid");
    let mut lock = LockFile::acquire(&path)?;
    let my_host = proc::hostname();

    if !force {
        if let Some(holder) = read_live_holder(&path, &my_host) {
            lock.rollback()?;
            return Ok(LockResult::HeldBy(holder));
        }
    }

    write!(lock, "{} {}", std::process::id(), truncate(&my_host))?;
    lock.commit()?;
    #[cfg(unix)]
    crate::cleanup::register_pidfile(&path);

    Ok(LockResult::Acquired(HousekeepingLock { path }))
}

fn truncate(host: &str) -> &str {
    host.get(..HOST_MAX).unwrap_or(host)
}

fn read_live_holder(path: &std::path::Path, my_host: &str) -> Option<LockHolder> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_secs();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    let age = now.saturating_sub(mtime);
    let contents = std::fs::read_to_string(path).ok()?;
    holder_if_live(&contents, age, my_host)
}

/// The liveness rule, separated from the filesystem for testing:
/// fresh mtime, parsable record, and either a foreign host (be gentle
/// to remote housekeepers) or a pid that is still alive here.
fn holder_if_live(contents: &str, age_secs: u64, my_host: &str) -> Option<LockHolder> {
    if age_secs > LOCK_STALE_SECS {
        return None;
    }
    let (pid, host) = contents.trim().split_once(' ')?;
    let pid: u32 = pid.parse().ok()?;
    let host = truncate(host);
    if host != my_host || proc::pid_alive(pid) {
        Some(LockHolder {
            host: host.to_string(),
            pid,
        })
    } else {
        None
    }
}
