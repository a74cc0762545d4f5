//! Locating the .git directory for a path.

use std::path::{Path, PathBuf};

use crate::error::RepoError;

#[derive(Debug)]
pub(crate) struct Discovered {
    pub git_dir: PathBuf,
    pub common_dir: PathBuf,
    pub work_tree: Option<PathBuf>,
}

/// Does this directory look like a git dir (bare or otherwise)?
fn looks_like_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

/// Resolve a `.git` entry that may be a "gitdir: <path>" file
/// (linked worktrees, submodules).
fn resolve_dot_git(dot_git: &Path, base: &Path) -> Result<PathBuf, RepoError> {
    if dot_git.is_dir() {
        return Ok(dot_git.to_path_buf());
    }
    let contents = std::fs::read_to_string(dot_git)?;
    let target = contents
        .strip_prefix("gitdir:")
        .ok_or_else(|| RepoError::NotARepository(dot_git.to_path_buf()))?
        .trim();
    let target = Path::new(target);
    if target.is_absolute() {
        Ok(target.to_path_buf())
    } else {
        Ok(base.join(target))
    }
}

/// The `commondir` file points linked worktrees at the main git dir.
fn resolve_common_dir(git_dir: &Path) -> PathBuf {
    let common_file = git_dir.join("commondir");
    match std::fs::read_to_string(&common_file) {
        Ok(contents) => {
            let target = Path::new(contents.trim());
            if target.is_absolute() {
                target.to_path_buf()
            } else {
                git_dir.join(target)
            }
        }
        Err(_) => git_dir.to_path_buf(),
    }
}

/// Open `path` as either a git dir or a working tree root.
pub(crate) fn open(path: &Path) -> Result<Discovered, RepoError> {
    let dot_git = path.join(".git");
    if dot_git.exists() {
        let git_dir = resolve_dot_git(&dot_git, path)?;
        if !looks_like_git_dir(&git_dir) && !git_dir.join("commondir").is_file() {
            return Err(RepoError::NotARepository(path.to_path_buf()));
        }
        let common_dir = resolve_common_dir(&git_dir);
        return Ok(Discovered {
            git_dir,
            common_dir,
            work_tree: Some(path.to_path_buf()),
        });
    }
    if looks_like_git_dir(path) {
        let common_dir = resolve_common_dir(path);
        return Ok(Discovered {
            git_dir: path.to_path_buf(),
            common_dir,
            work_tree: None,
        });
    }
    Err(RepoError::NotARepository(path.to_path_buf()))
}

/// Walk up from `start` looking for a repository.
pub(crate) fn discover(start: &Path) -> Result<Discovered, RepoError> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };
    let mut cursor: &Path = &start;
    loop {
        match open(cursor) {
            Ok(found) => return Ok(found),
            Err(RepoError::NotARepository(_)) => {}
            Err(e) => return Err(e),
        }
        cursor = match cursor.parent() {
            Some(parent) => parent,
            None => return Err(RepoError::NotARepository(start)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_git_dir(dir: &Path) {
        std::fs::create_dir_all(dir.join("objects/pack")).unwrap();
        std::fs::create_dir_all(dir.join("refs/heads")).unwrap();
        std::fs::write(dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
    }

    #[test]
    fn open_work_tree() {
        let tmp = tempfile::tempdir().unwrap();
        make_git_dir(&tmp.path().join(".git"));
        let d = open(tmp.path()).unwrap();
        assert_eq!(d.git_dir, tmp.path().join(".git"));
        assert_eq!(d.work_tree.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn open_bare() {
        let tmp = tempfile::tempdir().unwrap();
        make_git_dir(tmp.path());
        let d = open(tmp.path()).unwrap();
        assert_eq!(d.git_dir, tmp.path());
        assert!(d.work_tree.is_none());
    }

    #[test]
    fn discover_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        make_git_dir(&tmp.path().join(".git"));
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let d = discover(&nested).unwrap();
        assert_eq!(d.git_dir, tmp.path().join(".git"));
    }

    #[test]
    fn gitfile_redirection() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real-git");
        make_git_dir(&real);
        let wt = tmp.path().join("wt");
        std::fs::create_dir_all(&wt).unwrap();
        std::fs::write(wt.join(".git"), format!("gitdir: {}\n", real.display())).unwrap();
        let d = open(&wt).unwrap();
        assert_eq!(d.git_dir, real);
    }

    #[test]
    fn not_a_repository() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            open(tmp.path()),
            Err(RepoError::NotARepository(_))
        ));
    }
}
