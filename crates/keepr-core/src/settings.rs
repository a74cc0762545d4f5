//! The gc tunables, loaded and validated up front.

use keepr_repo::Repository;
use keepr_utils::Expiry;

use crate::error::{CoreError, Result};

/// An expiry tunable keeps its configured spelling: workers receive the
/// raw string (`--unpack-unreachable=2.weeks.ago`), policies compare
/// the parsed value.
#[derive(Debug, Clone)]
pub struct ExpiryValue {
    pub raw: String,
    pub value: Expiry,
}

impl ExpiryValue {
    /// Parse, failing loudly: a bad expiry is a configuration error.
    pub fn parse(raw: &str, key: &str) -> Result<Self> {
        let value = Expiry::parse(raw).map_err(|_| {
            CoreError::Config(keepr_config::ConfigError::InvalidExpiry {
                key: key.into(),
                value: raw.into(),
            })
        })?;
        Ok(Self {
            raw: raw.to_string(),
            value,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GcSettings {
    /// Run the pack-refs step (`gc.packrefs`, with `notbare` resolved
    /// against the repository).
    pub pack_refs: bool,
    /// Run reflog expiry; off when both reflog expiry knobs are "never".
    pub prune_reflogs: bool,
    pub aggressive_window: i64,
    pub aggressive_depth: i64,
    /// Loose-object auto threshold; <= 0 disables `--auto` entirely.
    pub auto_threshold: i64,
    /// Pack-count auto threshold; <= 0 disables the pack trigger.
    pub auto_pack_limit: i64,
    pub detach_auto: bool,
    pub prune_expire: Option<ExpiryValue>,
    pub worktree_prune_expire: Option<ExpiryValue>,
    pub log_expiry: ExpiryValue,
    /// Packs at or above this size are exempted from repack (0 = off).
    pub big_pack_threshold: u64,
    /// `pack.deltaCacheSize`, a term of the repack memory estimate.
    pub delta_cache_size: u64,
}

impl GcSettings {
    pub fn load(repo: &Repository) -> Result<Self> {
        let config = repo.config();

        // `gc.packrefs` is a boolean with one extra spelling: "notbare"
        // means "only when the repository has a working tree".
        let pack_refs = match config.get_bool("gc.packRefs") {
            Ok(Some(value)) => value,
            Ok(None) => true,
            Err(_) => match config.get_string("gc.packRefs")? {
                Some(value) if value == "notbare" => !repo.is_bare(),
                value => {
                    return Err(keepr_config::ConfigError::InvalidBool {
                        key: "gc.packRefs".into(),
                        value: value.unwrap_or_default(),
                    }
                    .into())
                }
            },
        };

        let reflog_never = expiry_is_never(repo, "gc.reflogExpire")?
            && expiry_is_never(repo, "gc.reflogExpireUnreachable")?;

        let prune_expire = match config.get_string("gc.pruneExpire")? {
            Some(raw) => Some(ExpiryValue::parse(&raw, "gc.pruneExpire")?),
            None => Some(ExpiryValue::parse("2.weeks.ago", "gc.pruneExpire")?),
        };
        let worktree_prune_expire = match config.get_string("gc.worktreePruneExpire")? {
            Some(raw) => Some(ExpiryValue::parse(&raw, "gc.worktreePruneExpire")?),
            None => Some(ExpiryValue::parse("3.months.ago", "gc.worktreePruneExpire")?),
        };
        let log_expiry = match config.get_string("gc.logExpiry")? {
            Some(raw) => ExpiryValue::parse(&raw, "gc.logExpiry")?,
            None => ExpiryValue::parse("1.day.ago", "gc.logExpiry")?,
        };

        Ok(Self {
            pack_refs,
            prune_reflogs: !reflog_never,
            aggressive_window: config.get_int_or("gc.aggressiveWindow", 250)?,
            aggressive_depth: config.get_int_or("gc.aggressiveDepth", 50)?,
            auto_threshold: config.get_int_or("gc.auto", 6700)?,
            auto_pack_limit: config.get_int_or("gc.autoPackLimit", 50)?,
            detach_auto: config.get_bool_or("gc.autoDetach", true)?,
            prune_expire,
            worktree_prune_expire,
            log_expiry,
            big_pack_threshold: config.get_ulong("gc.bigPackThreshold")?.unwrap_or(0),
            delta_cache_size: config
                .get_ulong("pack.deltaCacheSize")?
                .unwrap_or(crate::estimate::DEFAULT_DELTA_CACHE_SIZE),
        })
    }
}

fn expiry_is_never(repo: &Repository, key: &str) -> Result<bool> {
    Ok(repo
        .config()
        .get_expiry(key)?
        .map(|e| e.is_never())
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn repo_with_config(dir: &Path, config: &str) -> Repository {
        let git = dir.join(".git");
        std::fs::create_dir_all(git.join("objects/pack")).unwrap();
        std::fs::create_dir_all(git.join("refs")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(git.join("config"), config).unwrap();
        Repository::open(dir).unwrap()
    }

    #[test]
    fn defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo_with_config(tmp.path(), "");
        let s = GcSettings::load(&repo).unwrap();

        assert!(s.pack_refs);
        assert!(s.prune_reflogs);
        assert_eq!(s.aggressive_window, 250);
        assert_eq!(s.aggressive_depth, 50);
        assert_eq!(s.auto_threshold, 6700);
        assert_eq!(s.auto_pack_limit, 50);
        assert!(s.detach_auto);
        assert_eq!(s.prune_expire.as_ref().unwrap().raw, "2.weeks.ago");
        assert_eq!(
            s.worktree_prune_expire.as_ref().unwrap().raw,
            "3.months.ago"
        );
        assert_eq!(s.log_expiry.raw, "1.day.ago");
        assert_eq!(s.big_pack_threshold, 0);
        assert_eq!(s.delta_cache_size, crate::estimate::DEFAULT_DELTA_CACHE_SIZE);
    }

    #[test]
    fn notbare_pack_refs_follows_repo_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo_with_config(tmp.path(), "[gc]\n\tpackRefs = notbare\n");
        assert!(GcSettings::load(&repo).unwrap().pack_refs);

        let tmp2 = tempfile::tempdir().unwrap();
        let repo = repo_with_config(
            tmp2.path(),
            "[core]\n\tbare = true\n[gc]\n\tpackRefs = notbare\n",
        );
        assert!(!GcSettings::load(&repo).unwrap().pack_refs);
    }

    #[test]
    fn reflog_expiry_never_disables_reflog_step() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo_with_config(
            tmp.path(),
            "[gc]\n\treflogExpire = never\n\treflogExpireUnreachable = never\n",
        );
        assert!(!GcSettings::load(&repo).unwrap().prune_reflogs);

        // One of the two still set keeps the step on.
        let tmp2 = tempfile::tempdir().unwrap();
        let repo = repo_with_config(tmp2.path(), "[gc]\n\treflogExpire = never\n");
        assert!(GcSettings::load(&repo).unwrap().prune_reflogs);
    }

    #[test]
    fn invalid_expiry_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo_with_config(tmp.path(), "[gc]\n\tpruneExpire = whenever\n");
        assert!(GcSettings::load(&repo).is_err());
    }

    #[test]
    fn overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = repo_with_config(
            tmp.path(),
            "[gc]\n\tauto = 0\n\tautoPackLimit = 10\n\tautoDetach = false\n\
             \tbigPackThreshold = 1g\n\taggressiveWindow = 10\n",
        );
        let s = GcSettings::load(&repo).unwrap();
        assert_eq!(s.auto_threshold, 0);
        assert_eq!(s.auto_pack_limit, 10);
        assert!(!s.detach_auto);
        assert_eq!(s.big_pack_threshold, 1024 * 1024 * 1024);
        assert_eq!(s.aggressive_window, 10);
    }
}
