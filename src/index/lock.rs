use crate::error::{IndexError, PathContext, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "write.lock";

/// Exclusive writer lock on an index directory.
///
/// Backed by an OS file lock, so it is released when the handle drops or
/// the process dies.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
    path: PathBuf,
}

impl WriteLock {
    /// Take the lock, failing fast if another writer holds it
    pub fn acquire(index_path: &Path) -> Result<Self> {
        let path = index_path.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .at_path(&path)?;

        match file.try_lock() {
            Ok(()) => {
                tracing::debug!(lock = %path.display(), "acquired write lock");
                Ok(Self { file, path })
            }
            Err(TryLockError::WouldBlock) => Err(IndexError::Locked {
                path: index_path.to_path_buf(),
            }),
            Err(TryLockError::Error(e)) => Err(IndexError::io(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release write lock");
        }
    }
}
