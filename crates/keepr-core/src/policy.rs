//! The auto-trigger predicates: is housekeeping worth running now?

use std::collections::HashSet;

use keepr_repo::{ObjectId, PackInfo, PackScan, Repository};

use crate::error::Result;
use crate::estimate;
use crate::settings::{ExpiryValue, GcSettings};

/// One fixed fan-out bucket is sampled; ids are uniform, so bucket
/// `17/` estimates the whole store at 1/256 cost.
const SAMPLE_BUCKET: &str = "17";

/// Loose-object density probe: does the sampled bucket exceed its
/// share of `gc.auto`?
pub fn too_many_loose_objects(repo: &Repository, auto_threshold: i64) -> bool {
    if auto_threshold <= 0 {
        return false;
    }
    let per_bucket = (auto_threshold as usize).div_ceil(256);
    let count = repo
        .objects()
        .loose()
        .count_in_bucket(SAMPLE_BUCKET, per_bucket + 1);
    count > per_bucket
}

/// Pack-count probe over local, non-keep packs.
pub fn too_many_packs(scan: &PackScan, auto_pack_limit: i64) -> bool {
    if auto_pack_limit <= 0 {
        return false;
    }
    let count = scan
        .packs
        .iter()
        .filter(|p| p.local && !p.keep)
        .count() as i64;
    count > auto_pack_limit
}

/// Base-pack selection over local packs: everything at or above
/// `limit`, or the single largest pack when `limit` is 0.
pub fn find_base_packs(scan: &PackScan, limit: u64) -> Vec<&PackInfo> {
    if limit > 0 {
        scan.packs
            .iter()
            .filter(|p| p.local && p.pack_size >= limit)
            .collect()
    } else {
        scan.packs
            .iter()
            .filter(|p| p.local)
            .max_by_key(|p| p.pack_size)
            .into_iter()
            .collect()
    }
}

/// Queue the all-repack options: `-a` when everything unreachable goes
/// now, otherwise `-A --unpack-unreachable=<expire>`, plus one
/// `--keep-pack` per exempted pack.
pub fn add_repack_all_args(
    args: &mut Vec<String>,
    prune_expire: &Option<ExpiryValue>,
    keep_pack: &[String],
) {
    match prune_expire {
        Some(expire) if expire.value.is_now() => args.push("-a".into()),
        Some(expire) => {
            args.push("-A".into());
            args.push(format!("--unpack-unreachable={}", expire.raw));
        }
        None => args.push("-A".into()),
    }
    for name in keep_pack {
        args.push(format!("--keep-pack={name}"));
    }
}

pub fn add_repack_incremental_args(args: &mut Vec<String>) {
    args.push("--no-write-bitmap-index".into());
}

/// The `--auto` gate. When work is needed, the chosen repack options
/// are appended to `repack_args` and the `pre-auto-gc` hook gets the
/// final say.
pub fn need_to_gc(
    repo: &Repository,
    settings: &GcSettings,
    repack_args: &mut Vec<String>,
) -> Result<bool> {
    if settings.auto_threshold <= 0 {
        return Ok(false);
    }

    let scan = repo.scan_packs()?;
    if too_many_packs(&scan, settings.auto_pack_limit) {
        let keep_pack = keep_pack_names(settings, &scan);
        add_repack_all_args(repack_args, &settings.prune_expire, &keep_pack);
    } else if too_many_loose_objects(repo, settings.auto_threshold) {
        add_repack_incremental_args(repack_args);
    } else {
        return Ok(false);
    }

    if !repo.hooks().run("pre-auto-gc")?.success() {
        return Ok(false);
    }
    Ok(true)
}

/// Which packs an automatic all-repack should leave alone.
fn keep_pack_names(settings: &GcSettings, scan: &PackScan) -> Vec<String> {
    if settings.big_pack_threshold > 0 {
        let over = find_base_packs(scan, settings.big_pack_threshold);
        // If the threshold exempts so many packs that the trigger
        // would never clear, abandon it and keep only the largest.
        if over.len() as i64 >= settings.auto_pack_limit {
            return names(&find_base_packs(scan, 0));
        }
        return names(&over);
    }

    let base = find_base_packs(scan, 0);
    let mem_have = estimate::total_ram();
    let mem_want =
        estimate::estimate_repack_memory(settings, base.first().copied(), scan.approximate_object_count());
    // Budget half of RAM for the repack; an unknown RAM size means
    // proceed without exemptions.
    if mem_have == 0 || mem_want < mem_have / 2 {
        return Vec::new();
    }
    names(&base)
}

fn names(packs: &[&PackInfo]) -> Vec<String> {
    packs.iter().map(|p| p.file_name().to_string()).collect()
}

/// DFS probe: are at least `limit` reachable commits missing from the
/// commit-graph? The mark set is scoped to this call, so marks can
/// never leak past any return path.
pub fn commits_not_in_graph_reach(repo: &Repository, limit: usize) -> Result<bool> {
    let store = repo.objects();
    let graph = store.commit_graph();
    let mut marked: HashSet<ObjectId> = HashSet::new();
    let mut num_not_in_graph = 0usize;

    for reference in repo.references()? {
        let tip = match reference.peeled {
            Some(peeled) => Some(peeled),
            None => store.peel_to_commit(&reference.target)?,
        };
        let Some(tip) = tip else { continue };
        if graph.contains(&tip) {
            continue;
        }

        let mut stack = vec![tip];
        while let Some(commit) = stack.pop() {
            // Unreadable commits are the fsck worker's problem, not a
            // reason to force a graph write.
            let Ok(Some(parents)) = store.commit_parents(&commit) else {
                continue;
            };
            for parent in parents {
                if graph.contains(&parent) || !marked.insert(parent) {
                    continue;
                }
                num_not_in_graph += 1;
                if num_not_in_graph >= limit {
                    return Ok(true);
                }
                stack.push(parent);
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn pack(name: &str, size: u64, keep: bool, local: bool) -> PackInfo {
        PackInfo {
            pack_path: PathBuf::from(format!("{name}.pack")),
            pack_size: size,
            index_size: size / 10,
            num_objects: 10,
            keep,
            local,
            midx_covered: false,
        }
    }

    fn scan_of(packs: Vec<PackInfo>) -> PackScan {
        PackScan {
            packs,
            garbage: Vec::new(),
        }
    }

    #[test]
    fn pack_count_trigger() {
        let scan = scan_of(vec![
            pack("pack-a", 10, false, true),
            pack("pack-b", 10, false, true),
            pack("pack-c", 10, true, true),   // keep: not counted
            pack("pack-d", 10, false, false), // foreign: not counted
        ]);
        assert!(too_many_packs(&scan, 1));
        assert!(!too_many_packs(&scan, 2));
        assert!(!too_many_packs(&scan, 0));
        assert!(!too_many_packs(&scan, -5));
    }

    #[test]
    fn base_pack_selection() {
        let scan = scan_of(vec![
            pack("pack-small", 100, false, true),
            pack("pack-big", 9000, false, true),
            pack("pack-mid", 5000, false, true),
            pack("pack-foreign", 90000, false, false),
        ]);

        let largest = find_base_packs(&scan, 0);
        assert_eq!(largest.len(), 1);
        assert_eq!(largest[0].file_name(), "pack-big.pack");

        let over = find_base_packs(&scan, 5000);
        let names: Vec<_> = over.iter().map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["pack-big.pack", "pack-mid.pack"]);
    }

    #[test]
    fn repack_all_args_now_vs_grace() {
        let now = ExpiryValue::parse("now", "gc.pruneExpire").unwrap();
        let mut args = Vec::new();
        add_repack_all_args(&mut args, &Some(now), &[]);
        assert_eq!(args, vec!["-a"]);

        let grace = ExpiryValue::parse("2.weeks.ago", "gc.pruneExpire").unwrap();
        let mut args = Vec::new();
        add_repack_all_args(
            &mut args,
            &Some(grace),
            &["pack-big.pack".to_string()],
        );
        assert_eq!(
            args,
            vec![
                "-A",
                "--unpack-unreachable=2.weeks.ago",
                "--keep-pack=pack-big.pack"
            ]
        );
    }

    fn empty_repo(dir: &Path, config: &str) -> Repository {
        let git = dir.join(".git");
        std::fs::create_dir_all(git.join("objects/pack")).unwrap();
        std::fs::create_dir_all(git.join("refs")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(git.join("config"), config).unwrap();
        Repository::open(dir).unwrap()
    }

    #[test]
    fn auto_disabled_means_never() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = empty_repo(tmp.path(), "[gc]\n\tauto = 0\n");
        let settings = crate::settings::GcSettings::load(&repo).unwrap();
        let mut args = Vec::new();
        assert!(!need_to_gc(&repo, &settings, &mut args).unwrap());
        assert!(args.is_empty());
    }

    #[test]
    fn loose_density_triggers_incremental() {
        let tmp = tempfile::tempdir().unwrap();
        // gc.auto = 256 puts the per-bucket share at exactly 1.
        let repo = empty_repo(tmp.path(), "[gc]\n\tauto = 256\n");
        let bucket = tmp.path().join(".git/objects/17");
        std::fs::create_dir_all(&bucket).unwrap();
        for i in 0..2 {
            std::fs::write(bucket.join(format!("{:038x}", i)), b"").unwrap();
        }

        let settings = crate::settings::GcSettings::load(&repo).unwrap();
        assert!(too_many_loose_objects(&repo, settings.auto_threshold));

        let mut args = Vec::new();
        assert!(need_to_gc(&repo, &settings, &mut args).unwrap());
        assert_eq!(args, vec!["--no-write-bitmap-index"]);
    }

    #[test]
    fn pre_auto_gc_hook_veto() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = empty_repo(tmp.path(), "[gc]\n\tauto = 256\n");
        let bucket = tmp.path().join(".git/objects/17");
        std::fs::create_dir_all(&bucket).unwrap();
        for i in 0..2 {
            std::fs::write(bucket.join(format!("{:038x}", i)), b"").unwrap();
        }
        let hooks = tmp.path().join(".git/hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let hook = hooks.join("pre-auto-gc");
        std::fs::write(&hook, "#!/bin/sh\nexit 1\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let settings = crate::settings::GcSettings::load(&repo).unwrap();
        let mut args = Vec::new();
        assert!(!need_to_gc(&repo, &settings, &mut args).unwrap());
    }
}
