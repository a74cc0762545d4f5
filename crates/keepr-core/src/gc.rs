//! The gc orchestrator: a fixed pipeline of child workers under the
//! housekeeping lock.

use keepr_repo::Repository;

use crate::error::{CoreError, Result};
use crate::gclog::{self, LogGate};
use crate::pidlock::{self, LockResult};
use crate::policy;
use crate::settings::{ExpiryValue, GcSettings};
use crate::worker::Worker;

#[derive(Debug, Default)]
pub struct GcOptions {
    pub aggressive: bool,
    pub auto: bool,
    pub quiet: bool,
    pub force: bool,
    /// `--prune[=<date>]`: `Some(None)` keeps the configured grace,
    /// `Some(Some(date))` overrides it.
    pub prune: Option<Option<String>>,
    pub keep_largest_pack: bool,
}

/// Run gc to completion. `Ok(0)` covers both "worked" and the quiet
/// auto refusals (lock busy, previous failure, nothing to do).
pub fn run(repo: &Repository, opts: &GcOptions) -> Result<i32> {
    let mut settings = GcSettings::load(repo)?;

    if let Some(Some(date)) = &opts.prune {
        settings.prune_expire = Some(ExpiryValue::parse(date, "--prune")?);
    }

    let mut repack_opts: Vec<String> = Vec::new();
    if opts.aggressive {
        repack_opts.push("-f".into());
        if settings.aggressive_depth > 0 {
            repack_opts.push(format!("--depth={}", settings.aggressive_depth));
        }
        if settings.aggressive_window > 0 {
            repack_opts.push(format!("--window={}", settings.aggressive_window));
        }
    }
    if opts.quiet {
        repack_opts.push("-q".into());
    }

    let mut daemonized = false;
    let mut before_repack_done = false;

    if opts.auto {
        // Auto-gc should be as unintrusive as possible.
        if !policy::need_to_gc(repo, &settings, &mut repack_opts)? {
            return Ok(0);
        }
        if !opts.quiet {
            if settings.detach_auto {
                eprintln!("Auto packing the repository in background for optimum performance.");
            } else {
                eprintln!("Auto packing the repository for optimum performance.");
            }
            eprintln!("See \"keepr help gc\" for manual housekeeping.");
        }
        if settings.detach_auto {
            let horizon = settings.log_expiry.value.timestamp(gclog::now_secs());
            match gclog::report_last_gc_error(repo, horizon)? {
                LogGate::Refuse => return Ok(0),
                LogGate::Proceed => {}
            }

            match pidlock::lock_repo_for_gc(repo, opts.force)? {
                LockResult::HeldBy(_) => return Ok(0),
                LockResult::Acquired(lock) => {
                    // Pre-repack runs exactly once, before the fork;
                    // the daemon only does post-fork work.
                    gc_before_repack(repo, &settings)?;
                    before_repack_done = true;
                    // The recorded pid must be the daemon's, so the
                    // lock is released here and re-taken after detach.
                    drop(lock);
                }
            }
            // A failed detach is fine; continue in the foreground.
            daemonized = keepr_utils::proc::daemonize();
        }
    } else {
        let scan = repo.scan_packs()?;
        let keep_pack: Vec<String> = if opts.keep_largest_pack {
            policy::find_base_packs(&scan, 0)
                .iter()
                .map(|p| p.file_name().to_string())
                .collect()
        } else if settings.big_pack_threshold > 0 {
            policy::find_base_packs(&scan, settings.big_pack_threshold)
                .iter()
                .map(|p| p.file_name().to_string())
                .collect()
        } else {
            Vec::new()
        };
        policy::add_repack_all_args(&mut repack_opts, &settings.prune_expire, &keep_pack);
    }

    let _lock = match pidlock::lock_repo_for_gc(repo, opts.force)? {
        LockResult::Acquired(lock) => lock,
        LockResult::HeldBy(holder) => {
            if opts.auto {
                // Be quiet on --auto.
                return Ok(0);
            }
            return Err(CoreError::AlreadyRunning {
                host: holder.host,
                pid: holder.pid,
            });
        }
    };

    if daemonized {
        gclog::install_log_capture(repo)?;
    }

    if !before_repack_done {
        gc_before_repack(repo, &settings)?;
    }

    let precious = repo
        .config()
        .get_bool_or("extensions.preciousObjects", false)?;
    if !precious {
        Worker::git(repo)
            .args(["repack", "-d", "-l"])
            .args(repack_opts.iter().cloned())
            .run_or_die()?;

        if let Some(expire) = &settings.prune_expire {
            let mut prune = Worker::git(repo)
                .args(["prune", "--expire"])
                .arg(&expire.raw);
            if opts.quiet {
                prune = prune.arg("--no-progress");
            }
            if repo.has_promisor_remote() {
                prune = prune.arg("--exclude-promisor-objects");
            }
            prune.run_or_die()?;
        }
    }

    if let Some(expire) = &settings.worktree_prune_expire {
        Worker::git(repo)
            .args(["worktree", "prune", "--expire"])
            .arg(&expire.raw)
            .run_or_die()?;
    }

    Worker::git(repo).args(["rerere", "gc"]).run_or_die()?;

    // Sweep orphaned indexes out of the post-repack pack set. The
    // pre-repack set must never be consulted here.
    let scan = repo.scan_packs()?;
    for path in &scan.garbage {
        if let Err(e) = std::fs::remove_file(path) {
            eprintln!("warning: failed to remove '{}': {e}", path.display());
        }
    }

    if repo.config().get_bool_or("gc.writeCommitGraph", true)? {
        let mut graph = Worker::git(repo).args(["commit-graph", "write", "--split", "--reachable"]);
        if opts.quiet || daemonized {
            graph = graph.arg("--no-progress");
        }
        graph.run_or_die()?;
    }

    if opts.auto && policy::too_many_loose_objects(repo, settings.auto_threshold) {
        eprintln!(
            "warning: There are too many unreachable loose objects; \
             run 'git prune' to remove them."
        );
    }

    if !daemonized {
        let _ = std::fs::remove_file(repo.git_path("gc.log"));
    }

    Ok(0)
}

/// The pre-repack phase: ref packing and reflog expiry.
fn gc_before_repack(repo: &Repository, settings: &GcSettings) -> Result<()> {
    if settings.pack_refs {
        Worker::git(repo)
            .args(["pack-refs", "--all", "--prune"])
            .run_or_die()?;
    }
    if settings.prune_reflogs {
        Worker::git(repo)
            .args(["reflog", "expire", "--all"])
            .run_or_die()?;
    }
    Ok(())
}
