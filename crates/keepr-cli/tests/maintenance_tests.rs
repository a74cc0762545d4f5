//! End-to-end maintenance driver tests against the recording stub.

mod common;
use common::*;

#[test]
fn default_run_executes_gc_only() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(tmp.path(), &stub, &log, &["maintenance", "run"]);
    assert!(out.status.success(), "stderr: {}", stderr_of(&out));

    // The gc task re-invokes keepr, which drives the stub through the
    // whole gc pipeline; fetch/loose-objects/pack-files/commit-graph
    // stay disabled.
    let lines = worker_log(&log);
    assert!(position_of(&lines, "repack").is_some());
    assert!(position_of(&lines, "fetch").is_none());
    assert!(position_of(&lines, "prune-packed").is_none());
    assert!(position_of(&lines, "multi-pack-index").is_none());
}

#[test]
fn unknown_task_is_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "shrink-ray"],
    );
    assert_eq!(out.status.code(), Some(129));
    assert!(stderr_of(&out).contains("'shrink-ray' is not a valid task"));
    assert!(worker_log(&log).is_empty());
}

#[test]
fn duplicate_task_is_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &[
            "maintenance",
            "run",
            "--task",
            "loose-objects",
            "--task",
            "pack-files",
            "--task",
            "loose-objects",
        ],
    );
    assert_eq!(out.status.code(), Some(129));
    assert!(stderr_of(&out).contains("cannot be selected multiple times"));
    assert!(worker_log(&log).is_empty());
}

#[test]
fn selected_tasks_run_in_selection_order() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &[
            "maintenance",
            "run",
            "--task",
            "pack-files",
            "--task",
            "loose-objects",
        ],
    );
    assert!(out.status.success(), "stderr: {}", stderr_of(&out));

    let lines = worker_log(&log);
    let midx_write = position_of(&lines, "multi-pack-index write").unwrap();
    let prune_packed = position_of(&lines, "prune-packed").unwrap();
    assert!(midx_write < prune_packed);
}

#[test]
fn pack_files_state_machine_argv() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let pack_dir = tmp.path().join(".git/objects/pack");
    std::fs::write(pack_dir.join("pack-big.pack"), vec![0u8; 300]).unwrap();
    std::fs::write(pack_dir.join("pack-small.pack"), vec![0u8; 100]).unwrap();
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "pack-files"],
    );
    assert!(out.status.success(), "stderr: {}", stderr_of(&out));

    let lines = worker_log(&log);
    // write, verify, expire, verify, repack with the auto batch size
    // (second largest pack + 1).
    assert_eq!(
        lines,
        vec![
            "multi-pack-index write",
            "multi-pack-index verify",
            "multi-pack-index expire",
            "multi-pack-index verify",
            "multi-pack-index repack --batch-size=101",
        ]
    );
}

#[test]
fn midx_verify_failure_is_repaired_by_rewrite() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let midx = tmp.path().join(".git/objects/pack/multi-pack-index");
    std::fs::write(&midx, b"corrupt").unwrap();
    let (stub, log) = stub_git(tmp.path());

    let out = keepr_env(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "pack-files"],
        &[("KEEPR_FAIL_ON_SUB", "multi-pack-index verify")],
    );
    // Repaired: the rewrite succeeds, so the task exits clean.
    assert_eq!(out.status.code(), Some(0));
    assert!(stderr_of(&out).contains("rewriting"));

    let lines = worker_log(&log);
    // The corrupt midx was deleted and written afresh.
    assert!(!midx.exists() || std::fs::read(&midx).unwrap() != b"corrupt");
    let writes = lines
        .iter()
        .filter(|l| *l == "multi-pack-index write")
        .count();
    assert_eq!(writes, 2, "initial write plus the repair rewrite");
}

#[test]
fn midx_write_failure_fails_the_task() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr_env(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "pack-files"],
        &[("KEEPR_FAIL_ON", "multi-pack-index")],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr_of(&out).contains("task 'pack-files' failed"));
}

#[test]
fn first_failing_task_aborts_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr_env(
        tmp.path(),
        &stub,
        &log,
        &[
            "maintenance",
            "run",
            "--task",
            "pack-files",
            "--task",
            "loose-objects",
        ],
        &[("KEEPR_FAIL_ON", "multi-pack-index")],
    );
    assert_eq!(out.status.code(), Some(1));

    let lines = worker_log(&log);
    assert!(position_of(&lines, "prune-packed").is_none());
}

#[test]
fn busy_maintenance_lock_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    std::fs::write(tmp.path().join(".git/objects/maintenance.lock"), b"").unwrap();
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(tmp.path(), &stub, &log, &["maintenance", "run"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(worker_log(&log).is_empty());
    assert!(stderr_of(&out).contains("skipping maintenance"));

    // Quiet keeps the refusal silent.
    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--quiet"],
    );
    assert_eq!(out.status.code(), Some(0));
    assert!(stderr_of(&out).is_empty());
}

#[test]
fn auto_run_with_no_triggers_does_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(tmp.path(), &stub, &log, &["maintenance", "run", "--auto"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(worker_log(&log).is_empty());
}

#[test]
fn auto_gate_skips_selected_task_whose_condition_is_false() {
    let tmp = tempfile::tempdir().unwrap();
    // loose-objects threshold 100, store empty: the condition is false
    // even though the task is explicitly selected.
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--auto", "--task", "loose-objects"],
    );
    assert_eq!(out.status.code(), Some(0));
    assert!(worker_log(&log).is_empty());
}

#[test]
fn fetch_task_runs_every_remote_and_tolerates_failure() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(
        tmp.path(),
        "[remote \"origin\"]\n\turl = https://example.com/a\n\
         [remote \"backup\"]\n\turl = https://example.com/b\n",
    );
    let (stub, log) = stub_git(tmp.path());

    let out = keepr_env(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "fetch"],
        &[("KEEPR_FAIL_ON", "fetch")],
    );
    // Both remotes attempted, failures ignored.
    assert_eq!(out.status.code(), Some(0));

    let lines = worker_log(&log);
    assert!(lines.iter().any(|l| l
        == "fetch origin --prune --no-tags --refmap=+refs/heads/*:refs/hidden/origin/*"));
    assert!(lines.iter().any(|l| l
        == "fetch backup --prune --no-tags --refmap=+refs/heads/*:refs/hidden/backup/*"));
}

#[test]
fn loose_objects_task_streams_ids_to_pack_objects() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let bucket = tmp.path().join(".git/objects/ab");
    std::fs::create_dir_all(&bucket).unwrap();
    std::fs::write(bucket.join(&"1".repeat(38)), b"").unwrap();
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "loose-objects"],
    );
    assert!(out.status.success(), "stderr: {}", stderr_of(&out));

    let lines = worker_log(&log);
    let prune_packed = position_of(&lines, "prune-packed").unwrap();
    let pack_objects = position_of(&lines, "pack-objects").unwrap();
    assert!(prune_packed < pack_objects);
    assert!(lines[pack_objects].ends_with("pack/loose"));
}

#[test]
fn loose_objects_task_skips_pack_objects_when_store_is_packed() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "loose-objects"],
    );
    assert!(out.status.success());

    let lines = worker_log(&log);
    assert!(position_of(&lines, "prune-packed").is_some());
    assert!(position_of(&lines, "pack-objects").is_none());
}

#[test]
fn commit_graph_task_write_verify_argv() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let (stub, log) = stub_git(tmp.path());

    let out = keepr(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "commit-graph"],
    );
    assert!(out.status.success(), "stderr: {}", stderr_of(&out));

    assert_eq!(
        worker_log(&log),
        vec![
            "commit-graph write --split --reachable",
            "commit-graph verify --shallow",
        ]
    );
}

#[test]
fn commit_graph_repair_unlinks_chain_and_rewrites() {
    let tmp = tempfile::tempdir().unwrap();
    make_repo(tmp.path(), "");
    let chain_dir = tmp.path().join(".git/objects/info/commit-graphs");
    std::fs::create_dir_all(&chain_dir).unwrap();
    let chain = chain_dir.join("commit-graph-chain");
    std::fs::write(&chain, "0123\n").unwrap();
    let (stub, log) = stub_git(tmp.path());

    let out = keepr_env(
        tmp.path(),
        &stub,
        &log,
        &["maintenance", "run", "--task", "commit-graph"],
        &[("KEEPR_FAIL_ON_SUB", "commit-graph verify")],
    );
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr_of(&out));
    assert!(stderr_of(&out).contains("rewriting"));
    assert!(!chain.exists());

    let writes = worker_log(&log)
        .iter()
        .filter(|l| l.starts_with("commit-graph write"))
        .count();
    assert_eq!(writes, 2);
}
