//! Cross-process advisory lock over the storage directory.
//!
//! Two CLI invocations (say `login` and `logout`) may touch the same token
//! files at once. Mutations take an exclusive `flock` on a lock file in the
//! storage directory so they serialize. On non-Unix targets the lock is a
//! no-op and atomic renames are the only protection.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the lock file inside the storage directory. Deliberately outside
/// the token naming convention so the sweeper never looks at it.
pub const LOCK_FILE_NAME: &str = ".passenger.lock";

/// A lock file that can be acquired exclusively.
#[derive(Debug)]
pub struct StorageLock {
    path: PathBuf,
}

/// Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct StorageLockGuard {
    file: File,
}

impl StorageLock {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(LOCK_FILE_NAME),
        }
    }

    /// Block until the exclusive lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Io`] if the lock file cannot be opened or
    /// locked.
    pub fn acquire(&self) -> Result<StorageLockGuard> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options.open(&self.path)?;
        imp::lock_exclusive(&file)?;
        tracing::trace!(path = %self.path.display(), "acquired storage lock");
        Ok(StorageLockGuard { file })
    }
}

impl Drop for StorageLockGuard {
    fn drop(&mut self) {
        let _ = imp::unlock(&self.file);
    }
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;

    const LOCK_EX: c_int = 2;
    const LOCK_UN: c_int = 8;

    unsafe extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    pub(super) fn lock_exclusive(file: &File) -> std::io::Result<()> {
        loop {
            // SAFETY: the descriptor is owned by `file` and open for the call.
            let result = unsafe { flock(file.as_raw_fd(), LOCK_EX) };
            if result == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    pub(super) fn unlock(file: &File) -> std::io::Result<()> {
        // SAFETY: as above.
        let result = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::fs::File;

    pub(super) fn lock_exclusive(_file: &File) -> std::io::Result<()> {
        Ok(())
    }

    pub(super) fn unlock(_file: &File) -> std::io::Result<()> {
        Ok(())
    }
}
