//! Repository discovery and the read-only probes housekeeping runs on.

mod discover;
mod error;
pub mod hooks;
pub mod objects;
mod oid;
pub mod packs;
pub mod refs;
mod remotes;

pub use error::RepoError;
pub use objects::{ObjectStore, ObjectType};
pub use oid::{HashAlgorithm, ObjectId};
pub use packs::{PackInfo, PackScan};
pub use refs::Reference;

use std::path::{Path, PathBuf};

use keepr_config::ConfigSet;

/// Handle to one on-disk repository.
///
/// Deliberately thin: paths, merged configuration and probe
/// constructors. Anything that mutates the store belongs to a child
/// worker, not to this crate.
pub struct Repository {
    git_dir: PathBuf,
    common_dir: PathBuf,
    work_tree: Option<PathBuf>,
    objects_dir: PathBuf,
    config: ConfigSet,
    algo: HashAlgorithm,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("git_dir", &self.git_dir)
            .field("work_tree", &self.work_tree)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open `path` as either a git dir or a working tree root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::from_discovered(discover::open(path.as_ref())?)
    }

    /// Walk up from `start` until a repository appears.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self, RepoError> {
        Self::from_discovered(discover::discover(start.as_ref())?)
    }

    fn from_discovered(found: discover::Discovered) -> Result<Self, RepoError> {
        let discover::Discovered {
            git_dir,
            common_dir,
            work_tree,
        } = found;

        let config = ConfigSet::load(Some(&common_dir))?;

        let algo = match config.get_string("extensions.objectFormat")? {
            Some(name) => HashAlgorithm::from_name(&name).unwrap_or(HashAlgorithm::Sha1),
            None => HashAlgorithm::Sha1,
        };

        let objects_dir = common_dir.join("objects");

        // core.bare overrides what discovery inferred.
        let work_tree = match config.get_bool("core.bare") {
            Ok(Some(true)) => None,
            _ => work_tree,
        };

        Ok(Self {
            git_dir,
            common_dir,
            work_tree,
            objects_dir,
            config,
            algo,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    pub fn work_tree(&self) -> Option<&Path> {
        self.work_tree.as_deref()
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    /// A path inside the git dir, e.g. `git_path("gc.pid")`.
    pub fn git_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    pub fn is_bare(&self) -> bool {
        self.work_tree.is_none()
    }

    pub fn config(&self) -> &ConfigSet {
        &self.config
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    /// A fresh object-store view. Callers keep it scoped so that no
    /// pack or graph stays mapped once destructive workers start.
    pub fn objects(&self) -> ObjectStore {
        ObjectStore::new(&self.objects_dir, self.algo)
    }

    /// One probe cycle over the pack directory (and alternates).
    pub fn scan_packs(&self) -> Result<PackScan, RepoError> {
        packs::scan(&self.objects_dir)
    }

    /// Every ref with its target, peeled where packed-refs says so.
    pub fn references(&self) -> Result<Vec<Reference>, RepoError> {
        refs::enumerate(&self.common_dir)
    }

    pub fn hooks(&self) -> hooks::HookRunner {
        hooks::HookRunner::new(self)
    }
}
