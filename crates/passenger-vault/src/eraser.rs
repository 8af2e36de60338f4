//! Overwrite-then-delete for token files.
//!
//! Removing a file only unlinks it; the old blocks stay readable to simple
//! recovery tools until reused. [`SecureEraser::erase`] first overwrites the
//! full length with random bytes and syncs, then unlinks.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use ring::rand::SecureRandom;

use crate::crypto;
use crate::error::Result;

/// Overwrite chunk size.
const CHUNK_LEN: usize = 4096;

/// Callback that sees a file's bytes after overwrite, before unlink.
pub type EraseInspector = Arc<dyn Fn(&Path, &[u8]) + Send + Sync>;

/// Securely erases files using an injected randomness source.
#[derive(Clone)]
pub struct SecureEraser {
    rng: Arc<dyn SecureRandom + Send + Sync>,
    inspector: Option<EraseInspector>,
}

impl fmt::Debug for SecureEraser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureEraser")
            .field("inspector", &self.inspector.is_some())
            .finish_non_exhaustive()
    }
}

impl SecureEraser {
    pub fn new(rng: Arc<dyn SecureRandom + Send + Sync>) -> Self {
        Self {
            rng,
            inspector: None,
        }
    }

    /// Attach a hook that receives the overwritten contents of every erased
    /// file just before it is removed.
    pub fn with_inspector(mut self, inspector: EraseInspector) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Overwrite `path` with random bytes, flush it to storage, then delete it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VaultError::Io`] if the file cannot be opened,
    /// written, synced or removed, and [`crate::VaultError::Crypto`] if the
    /// randomness source fails.
    pub fn erase(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        let len = file.metadata()?.len();

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK_LEN as u64) as usize;
            let noise = crypto::random_bytes(self.rng.as_ref(), n)?;
            file.write_all(&noise)?;
            remaining -= n as u64;
        }
        file.sync_all()?;
        drop(file);

        if let Some(inspect) = &self.inspector {
            let overwritten = std::fs::read(path)?;
            inspect(path, &overwritten);
        }

        std::fs::remove_file(path)?;
        tracing::debug!(path = %path.display(), bytes = len, "securely erased token file");
        Ok(())
    }
}
