//! Maintenance task executors and their auto-conditions.

use std::io::Write;

use keepr_repo::objects::commit_graph::CommitGraph;
use keepr_repo::Repository;

use crate::error::{CoreError, Result};
use crate::policy;
use crate::settings::GcSettings;
use crate::worker::Worker;

/// Everything a task executor may consult.
pub struct TaskContext<'a> {
    pub repo: &'a Repository,
    pub auto: bool,
    pub quiet: bool,
}

// --- fetch ---------------------------------------------------------

/// Prefetch every remote into hidden refs. Per-remote failures are
/// tolerated: a lost network must not stop the rest of background
/// maintenance.
pub(crate) fn task_fetch(ctx: &TaskContext) -> Result<()> {
    for remote in ctx.repo.remotes() {
        let mut fetch = Worker::git(ctx.repo)
            .arg("fetch")
            .arg(&remote)
            .args(["--prune", "--no-tags"])
            .arg(format!("--refmap=+refs/heads/*:refs/hidden/{remote}/*"));
        if ctx.quiet {
            fetch = fetch.arg("--quiet");
        }
        let _ = fetch.run();
    }
    Ok(())
}

// --- loose-objects -------------------------------------------------

/// Loose objects streamed into one pack per run.
const LOOSE_BATCH_SIZE: usize = 50_000;

pub(crate) fn task_loose_objects(ctx: &TaskContext) -> Result<()> {
    prune_packed(ctx)?;
    pack_loose(ctx)
}

fn prune_packed(ctx: &TaskContext) -> Result<()> {
    let mut worker = Worker::git(ctx.repo).arg("prune-packed");
    if ctx.quiet {
        worker = worker.arg("--quiet");
    }
    worker.run_or_die()
}

fn pack_loose(ctx: &TaskContext) -> Result<()> {
    let store = ctx.repo.objects();
    // Do not spawn pack-objects when there is nothing to feed it.
    if !store.loose().any() {
        return Ok(());
    }
    let ids = store.loose().collect_ids(LOOSE_BATCH_SIZE);
    drop(store);

    let prefix = ctx.repo.pack_dir().join("loose");
    let mut worker = Worker::git(ctx.repo).arg("pack-objects");
    if ctx.quiet {
        worker = worker.arg("--quiet");
    }
    let worker = worker.arg(prefix.display().to_string());

    let mut child = worker.spawn_piped_stdin()?;
    {
        let stdin = child
            .stdin
            .as_mut()
            .expect("pack-objects spawned with piped stdin");
        let mut writer = std::io::BufWriter::new(stdin);
        for oid in &ids {
            writeln!(writer, "{oid}")?;
        }
        writer.flush()?;
    }
    drop(child.stdin.take());

    let status = child.wait()?;
    if !status.success() {
        return Err(CoreError::WorkerFailed("pack-objects".into()));
    }
    Ok(())
}

pub(crate) fn loose_objects_auto_condition(ctx: &TaskContext) -> Result<bool> {
    let limit = ctx
        .repo
        .config()
        .get_int_or("maintenance.loose-objects.auto", 100)?;
    if limit == 0 {
        return Ok(false);
    }
    if limit < 0 {
        return Ok(true);
    }
    let count = ctx.repo.objects().loose().count_up_to(limit as usize);
    Ok(count >= limit as usize)
}

// --- pack-files ----------------------------------------------------

/// Batch-size ceiling for the midx repack.
const TWO_GIGABYTES: u64 = 2_147_483_647;

/// Optimize for one large pack (a clone) and many small ones: one more
/// byte than the second-largest pack repacks at least two packs
/// whenever three or more exist.
pub(crate) fn get_auto_pack_size(repo: &Repository) -> Result<u64> {
    // Deliberately a fresh scan; earlier probes are stale by now.
    let scan = repo.scan_packs()?;
    let mut largest = 0u64;
    let mut second_largest = 0u64;
    for pack in &scan.packs {
        if pack.pack_size > largest {
            second_largest = largest;
            largest = pack.pack_size;
        } else if pack.pack_size > second_largest {
            second_largest = pack.pack_size;
        }
    }
    Ok((second_largest + 1).min(TWO_GIGABYTES))
}

fn midx_run(ctx: &TaskContext, sub: &str, extra: Option<String>) -> Result<bool> {
    let mut worker = Worker::git(ctx.repo).args(["multi-pack-index", sub]);
    if ctx.quiet {
        worker = worker.arg("--no-progress");
    }
    if let Some(extra) = extra {
        worker = worker.arg(extra);
    }
    worker.run()
}

/// Delete the midx and write a fresh one; the repair step after a
/// failed verify.
fn rewrite_multi_pack_index(ctx: &TaskContext) -> Result<()> {
    let midx_path = ctx.repo.pack_dir().join("multi-pack-index");
    let _ = std::fs::remove_file(&midx_path);

    if midx_run(ctx, "write", None)? {
        Ok(())
    } else {
        Err(CoreError::WorkerFailed("multi-pack-index rewrite".into()))
    }
}

/// The midx state machine: write, expire and repack, each verified,
/// each recoverable once by a delete-and-rewrite.
pub(crate) fn task_pack_files(ctx: &TaskContext) -> Result<()> {
    if !midx_run(ctx, "write", None)? {
        return Err(CoreError::WorkerFailed("multi-pack-index write".into()));
    }
    if !midx_run(ctx, "verify", None)? {
        eprintln!("warning: multi-pack-index verify failed after initial write, rewriting");
        return rewrite_multi_pack_index(ctx);
    }

    if !midx_run(ctx, "expire", None)? {
        return Err(CoreError::WorkerFailed("multi-pack-index expire".into()));
    }
    if !midx_run(ctx, "verify", None)? {
        eprintln!("warning: multi-pack-index verify failed after expire, rewriting");
        return rewrite_multi_pack_index(ctx);
    }

    let batch_size = get_auto_pack_size(ctx.repo)?;
    if !midx_run(ctx, "repack", Some(format!("--batch-size={batch_size}")))? {
        if !midx_run(ctx, "verify", None)? {
            eprintln!("warning: multi-pack-index verify failed after repack, rewriting");
            return rewrite_multi_pack_index(ctx);
        }
        return Err(CoreError::WorkerFailed("multi-pack-index repack".into()));
    }
    Ok(())
}

pub(crate) fn pack_files_auto_condition(ctx: &TaskContext) -> Result<bool> {
    if !ctx.repo.config().get_bool_or("core.multiPackIndex", false)? {
        return Ok(false);
    }
    let limit = ctx
        .repo
        .config()
        .get_int_or("maintenance.pack-files.auto", 10)?;
    if limit == 0 {
        return Ok(false);
    }
    if limit < 0 {
        return Ok(true);
    }
    let scan = ctx.repo.scan_packs()?;
    let uncovered = scan
        .packs
        .iter()
        .filter(|p| !p.midx_covered)
        .take(limit as usize)
        .count();
    Ok(uncovered >= limit as usize)
}

// --- gc ------------------------------------------------------------

/// The gc task re-invokes this executable so the whole gc protocol
/// (locking, detach, log capture) applies unchanged.
pub(crate) fn task_gc(ctx: &TaskContext) -> Result<()> {
    let exe = std::env::current_exe().unwrap_or_else(|_| "keepr".into());
    let repo_dir = ctx
        .repo
        .work_tree()
        .unwrap_or_else(|| ctx.repo.git_dir())
        .to_path_buf();

    let mut gc = keepr_utils::subprocess::Subprocess::new(exe)
        .arg("-C")
        .arg(repo_dir)
        .arg("gc");
    if ctx.auto {
        gc = gc.arg("--auto");
    }
    if ctx.quiet {
        gc = gc.arg("--quiet");
    }

    if gc.run()?.success() {
        Ok(())
    } else {
        Err(CoreError::WorkerFailed("gc".into()))
    }
}

pub(crate) fn gc_auto_condition(ctx: &TaskContext) -> Result<bool> {
    let settings = GcSettings::load(ctx.repo)?;
    let mut scratch = Vec::new();
    policy::need_to_gc(ctx.repo, &settings, &mut scratch)
}

// --- commit-graph --------------------------------------------------

fn commit_graph_run(ctx: &TaskContext, sub: &str, extra: &[&str]) -> Result<bool> {
    let mut worker = Worker::git(ctx.repo)
        .args(["commit-graph", sub])
        .args(extra.iter().copied());
    if ctx.quiet {
        worker = worker.arg("--no-progress");
    }
    worker.run()
}

pub(crate) fn task_commit_graph(ctx: &TaskContext) -> Result<()> {
    // Skipped under --auto; the gc task already writes a graph there.
    if ctx.auto {
        return Ok(());
    }

    if !commit_graph_run(ctx, "write", &["--split", "--reachable"])? {
        return Err(CoreError::WorkerFailed("commit-graph write".into()));
    }
    if commit_graph_run(ctx, "verify", &["--shallow"])? {
        return Ok(());
    }

    eprintln!("warning: commit-graph verify caught error, rewriting");
    let chain = CommitGraph::chain_path(ctx.repo.objects_dir());
    std::fs::remove_file(&chain).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("failed to remove commit-graph at {}: {e}", chain.display()),
        )
    })?;

    if commit_graph_run(ctx, "write", &["--split", "--reachable"])? {
        Ok(())
    } else {
        Err(CoreError::WorkerFailed("commit-graph rewrite".into()))
    }
}

pub(crate) fn commit_graph_auto_condition(ctx: &TaskContext) -> Result<bool> {
    let limit = ctx
        .repo
        .config()
        .get_int_or("maintenance.commit-graph.auto", 100)?;
    if limit == 0 {
        return Ok(false);
    }
    if limit < 0 {
        return Ok(true);
    }
    policy::commits_not_in_graph_reach(ctx.repo, limit as usize)
}
