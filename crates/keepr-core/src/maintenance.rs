//! The maintenance driver: a fixed registry of tasks, selection and
//! ordering rules, and sequential execution under a per-run lock.

use keepr_repo::Repository;
use keepr_utils::lockfile::LockFile;

use crate::error::{CoreError, Result};
use crate::tasks::{self, TaskContext};

#[derive(Debug, Default)]
pub struct MaintenanceOpts {
    pub auto: bool,
    pub quiet: bool,
    /// `--task` names in the order they appeared on the command line.
    pub tasks: Vec<String>,
}

type TaskFn = fn(&TaskContext) -> Result<()>;
type AutoConditionFn = fn(&TaskContext) -> Result<bool>;

/// One registered task. Registration order is the default execution
/// order; `order` is the 1-based selection ordinal when `--task` is
/// in play.
struct Task {
    name: &'static str,
    run: TaskFn,
    auto_condition: Option<AutoConditionFn>,
    enabled: bool,
    selected: bool,
    order: usize,
}

fn builtin_tasks() -> Vec<Task> {
    let task = |name: &'static str,
                run: TaskFn,
                auto_condition: Option<AutoConditionFn>,
                enabled: bool| Task {
        name,
        run,
        auto_condition,
        enabled,
        selected: false,
        order: 0,
    };
    vec![
        task("fetch", tasks::task_fetch, None, false),
        task(
            "loose-objects",
            tasks::task_loose_objects,
            Some(tasks::loose_objects_auto_condition),
            false,
        ),
        task(
            "pack-files",
            tasks::task_pack_files,
            Some(tasks::pack_files_auto_condition),
            false,
        ),
        task("gc", tasks::task_gc, Some(tasks::gc_auto_condition), true),
        task(
            "commit-graph",
            tasks::task_commit_graph,
            Some(tasks::commit_graph_auto_condition),
            false,
        ),
    ]
}

/// Run `maintenance run` to completion. Exit 0 also covers the
/// lock-busy refusal; a failing task yields its non-zero exit.
pub fn run(repo: &Repository, opts: &MaintenanceOpts) -> Result<i32> {
    let mut tasks = builtin_tasks();

    for task in &mut tasks {
        if let Some(enabled) = repo
            .config()
            .get_bool(&format!("maintenance.{}.enabled", task.name))?
        {
            task.enabled = enabled;
        }
    }

    select_tasks(&mut tasks, &opts.tasks)?;
    run_tasks(repo, opts, tasks)
}

/// Apply `--task` selections: each name must exist and appear at most
/// once; the ordinal records command-line order.
fn select_tasks(tasks: &mut [Task], names: &[String]) -> Result<()> {
    for (position, name) in names.iter().enumerate() {
        let task = tasks
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::UnknownTask(name.clone()))?;
        if task.selected {
            return Err(CoreError::DuplicateTask(name.clone()));
        }
        task.selected = true;
        task.order = position + 1;
    }
    Ok(())
}

fn run_tasks(repo: &Repository, opts: &MaintenanceOpts, tasks: Vec<Task>) -> Result<i32> {
    // The per-run lock nests inside any gc.pid lock the gc task may
    // take; contention means another maintenance is already active,
    // often a recursive process stack under --auto.
    let lock_path = repo.objects_dir().join("maintenance");
    let _lock = match LockFile::try_acquire(&lock_path)? {
        Some(lock) => lock,
        None => {
            if !opts.auto && !opts.quiet {
                eprintln!(
                    "error: lock file '{}' exists, skipping maintenance",
                    lock_path.display()
                );
            }
            return Ok(0);
        }
    };

    let selection_active = tasks.iter().any(|t| t.selected);
    let mut active: Vec<&Task> = tasks
        .iter()
        .filter(|t| if selection_active { t.selected } else { t.enabled })
        .collect();
    if selection_active {
        active.sort_by_key(|t| t.order);
    }

    let ctx = TaskContext {
        repo,
        auto: opts.auto,
        quiet: opts.quiet,
    };

    for task in active {
        if opts.auto {
            let wanted = match task.auto_condition {
                Some(condition) => condition(&ctx)?,
                None => false,
            };
            if !wanted {
                continue;
            }
        }
        if let Err(e) = (task.run)(&ctx) {
            eprintln!("error: task '{}' failed: {e}", task.name);
            return Ok(1);
        }
    }

    Ok(0)
}
