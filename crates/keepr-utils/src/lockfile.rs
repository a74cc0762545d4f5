use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII hold-for-update lock on a file.
///
/// The protocol is the usual one for repository metadata files:
/// - create `<path>.lock` with O_CREAT|O_EXCL
/// - write the new contents into the lock file
/// - `commit()` renames the lock file onto `<path>` atomically
/// - dropping without commit removes the lock file (rollback)
///
/// Holding the lock file also serves as a mutual-exclusion token even
/// when the target is never rewritten (the maintenance run lock commits
/// nothing and simply rolls back on exit).
pub struct LockFile {
    /// Target file path (no suffix).
    path: PathBuf,
    /// `<path>.lock`.
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Take the lock on `path` by creating `<path>.lock` exclusively.
    ///
    /// Fails with [`LockError::AlreadyLocked`] when another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut name = path.clone().into_os_string();
        name.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Attempt-once acquisition. `Ok(None)` when somebody else holds the lock.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(path) {
            Ok(lk) => Ok(Some(lk)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The target path (without the `.lock` suffix).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The lock file path (with the `.lock` suffix).
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// The open handle on the lock file, for callers that need the fd.
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    /// Flush, fsync and atomically rename the lock file onto the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush().and_then(|_| file.sync_all()).map_err(|e| {
                UtilError::Lock(LockError::Commit {
                    path: self.lock_path.clone(),
                    source: e,
                })
            })?;
        }
        // The handle must be closed before the rename on some platforms.
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;

        self.committed = true;
        Ok(())
    }

    /// Drop the lock file without touching the target.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_write_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gc.pid");

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"1234 myhost").unwrap();
        lock.commit().unwrap();

        assert!(!dir.path().join("gc.pid.lock").exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "1234 myhost");
    }

    #[test]
    fn rollback_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gc.pid");
        fs::write(&target, b"999 otherhost").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"scratch").unwrap();
        lock.rollback().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "999 otherhost");
        assert!(!dir.path().join("gc.pid.lock").exists());
    }

    #[test]
    fn drop_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("maintenance");

        {
            let _lock = LockFile::acquire(&target).unwrap();
            assert!(dir.path().join("maintenance.lock").exists());
        }

        assert!(!dir.path().join("maintenance.lock").exists());
        assert!(!target.exists());
    }

    #[test]
    fn second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gc.pid");

        let _held = LockFile::acquire(&target).unwrap();
        match LockFile::acquire(&target) {
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => {}
            other => panic!("expected AlreadyLocked, got {:?}", other.map(|_| ())),
        }
        assert!(LockFile::try_acquire(&target).unwrap().is_none());
    }
}
