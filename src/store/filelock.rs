use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{CtxError, Result};

/// An exclusive advisory lock on a guard file, held until released or dropped.
#[derive(Debug)]
pub struct FileGuard {
    file: File,
    path: PathBuf,
}

impl FileGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly so unlock failures surface; dropping also releases.
    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }
}

/// Try to take the lock on `path` without blocking.
///
/// Contention is `Busy`, naming `purpose` and the guard file; any other
/// failure is an I/O error.
pub fn acquire(path: &Path, purpose: &str) -> Result<FileGuard> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    if let Err(e) = file.try_lock_exclusive() {
        if e.kind() == fs2::lock_contended_error().kind() {
            return Err(CtxError::Busy(format!("{purpose} ({})", path.display())));
        }
        return Err(e.into());
    }

    Ok(FileGuard {
        file,
        path: path.to_path_buf(),
    })
}
