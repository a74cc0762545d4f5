use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::Result;

/// A temporary file with RAII cleanup.
///
/// Created in the same directory as its eventual target so that
/// `persist()` can rename atomically. Deleted on drop unless persisted.
pub struct TempFile {
    inner: Option<::tempfile::NamedTempFile>,
}

impl TempFile {
    /// Create a temporary file with a unique name inside `dir`.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let named = ::tempfile::NamedTempFile::new_in(dir)?;
        Ok(Self { inner: Some(named) })
    }

    /// Create a temporary file in the directory that holds `target`.
    pub fn new_for(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref();
        Self::new_in(target.parent().unwrap_or(Path::new(".")))
    }

    pub fn path(&self) -> &Path {
        self.inner
            .as_ref()
            .map(|n| n.path())
            .unwrap_or(Path::new(""))
    }

    pub fn file_mut(&mut self) -> Option<&mut fs::File> {
        self.inner.as_mut().map(|n| n.as_file_mut())
    }

    /// Rename onto `target`, consuming the temp file.
    pub fn persist(mut self, target: impl AsRef<Path>) -> Result<()> {
        if let Some(named) = self.inner.take() {
            named
                .persist(target.as_ref())
                .map_err(|e| crate::error::UtilError::Io(e.error))?;
        }
        Ok(())
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already closed"))?
            .flush()
    }
}
