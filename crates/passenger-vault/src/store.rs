//! File-backed, self-expiring session-token store.
//!
//! [`TokenStore`] is the only component that touches token files. It is
//! constructed once at the process entry point with its storage directory,
//! clock and randomness source injected, and passed to whatever needs the
//! session token.
//!
//! # Layout
//!
//! ```text
//! <storage dir>/                      mode 0700
//!   .passenger.lock                   advisory lock for put/clear
//!   pass_<fingerprint>_<random>.tmp   mode 0600, base64(nonce ‖ ciphertext)
//! ```
//!
//! Writes go to a temporary file in the same directory that is renamed into
//! place, so a concurrent reader sees either the old file or the new one,
//! never a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{self, DerivedKey};
use crate::eraser::{EraseInspector, SecureEraser};
use crate::error::{Result, VaultError};
use crate::identity;
use crate::lock::StorageLock;
use crate::record::TokenRecord;
use crate::sweep::{ExpirySweeper, SweepReport};

/// How many random filename suffixes to try before giving up on a collision.
const MAX_NAME_ATTEMPTS: usize = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Non-destructive view of the cached token, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// No token file for this identity.
    Missing,
    /// A token is cached and usable until `expires_at`.
    Valid {
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// A token is cached but past its TTL. The next `get` erases it.
    Expired { expired_at: DateTime<Utc> },
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// Encrypted on-disk cache for a single identity's session token.
///
/// # Example
///
/// ```rust,no_run
/// # fn example() -> passenger_vault::Result<()> {
/// let store = passenger_vault::TokenStore::open_default()?;
///
/// store.store_token("tok-abc123")?;
/// let token = store.get_valid_token()?;
/// assert_eq!(token.as_str(), "tok-abc123");
///
/// store.clear_token()?;
/// # Ok(())
/// # }
/// ```
pub struct TokenStore {
    dir: PathBuf,
    fingerprint: String,
    key: DerivedKey,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn SecureRandom + Send + Sync>,
    eraser: SecureEraser,
    sweeper: ExpirySweeper,
    lock: StorageLock,
}

impl TokenStore {
    /// Open the store for the current user in the default private directory,
    /// with the system clock and system randomness.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if no private storage directory can be
    /// resolved.
    pub fn open_default() -> Result<Self> {
        let identity = identity::current_user();
        let dir = identity::default_storage_dir(&identity)?;
        Self::new(
            dir,
            &identity,
            Arc::new(SystemClock),
            Arc::new(SystemRandom::new()),
        )
    }

    /// Open a store rooted at `dir` for `identity`.
    ///
    /// The directory is created with owner-only permissions if absent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if `dir` cannot be created or
    /// restricted.
    pub fn new(
        dir: impl Into<PathBuf>,
        identity: &str,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn SecureRandom + Send + Sync>,
    ) -> Result<Self> {
        let dir = dir.into();
        identity::ensure_private_dir(&dir).map_err(|e| VaultError::Config {
            reason: format!("cannot prepare {}: {e}", dir.display()),
        })?;

        let key = crypto::derive_key(identity);
        let eraser = SecureEraser::new(Arc::clone(&rng));
        let sweeper = ExpirySweeper::new(key.clone(), Arc::clone(&clock), eraser.clone());

        tracing::debug!(path = %dir.display(), "token store ready");

        Ok(Self {
            lock: StorageLock::new(&dir),
            fingerprint: crypto::identity_fingerprint(identity),
            dir,
            key,
            clock,
            rng,
            eraser,
            sweeper,
        })
    }

    /// Route every erase (clear, expiry, sweep) through `inspector` before
    /// the file is unlinked.
    pub fn with_erase_inspector(mut self, inspector: EraseInspector) -> Self {
        self.eraser = self.eraser.with_inspector(inspector);
        self.sweeper = ExpirySweeper::new(
            self.key.clone(),
            Arc::clone(&self.clock),
            self.eraser.clone(),
        );
        self
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Token files currently on disk for this identity.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the directory cannot be listed.
    pub fn token_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if identity::is_owned_token_file(name, &self.fingerprint)
                && entry.file_type()?.is_file()
            {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    // -- Put ----------------------------------------------------------------

    /// Cache `token` for [`TOKEN_TTL`](crate::TOKEN_TTL) from now.
    ///
    /// Sweeps expired files first (best-effort), writes the new record
    /// atomically with mode 0600, then erases this identity's older files.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the file cannot be written and
    /// [`VaultError::Crypto`] if sealing fails.
    pub fn put(&self, token: &str) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let report: SweepReport = self.sweeper.sweep(&self.dir);
        tracing::trace!(removed = report.removed, "pre-write sweep done");

        let previous = self.token_files()?;

        let record = TokenRecord::issue(token, self.clock.now());
        let encoded = record.seal(&self.key, self.rng.as_ref())?;
        let target = self.fresh_path()?;
        self.write_atomic(&target, encoded.as_bytes())?;

        for old in previous.iter().filter(|p| **p != target) {
            if let Err(e) = self.eraser.erase(old) {
                tracing::warn!(path = %old.display(), error = %e, "failed to erase superseded token file");
            }
        }

        tracing::info!(expires_at = %record.expires_at(), "stored session token");
        Ok(())
    }

    /// Pick an unused `pass_<fingerprint>_<random>.tmp` path.
    fn fresh_path(&self) -> Result<PathBuf> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let suffix = crypto::random_bytes(self.rng.as_ref(), identity::SUFFIX_BYTES)?;
            let path = self
                .dir
                .join(identity::token_file_name(&self.fingerprint, &suffix));
            if !path.exists() {
                return Ok(path);
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "could not find an unused token filename",
        )
        .into())
    }

    fn write_atomic(&self, target: &Path, contents: &[u8]) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".pass-")
            .suffix(".partial")
            .tempfile_in(&self.dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(target).map_err(|e| e.error)?;

        tracing::debug!(path = %target.display(), "wrote token file");
        Ok(())
    }

    // -- Get ----------------------------------------------------------------

    /// Return the cached token if one exists and has not expired.
    ///
    /// An expired token is erased before [`VaultError::Expired`] is returned.
    /// The erase happens under the storage lock after reloading, so a login
    /// from another process that lands in between is returned, not erased.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotFound`] if nothing is cached.
    /// - [`VaultError::Crypto`] if the file fails to decode or authenticate.
    /// - [`VaultError::Expired`] if the token is past its TTL.
    /// - [`VaultError::Io`] if the file cannot be read.
    pub fn get(&self) -> Result<Zeroizing<String>> {
        let (_, record) = self.load_newest()?.ok_or(VaultError::NotFound)?;
        if !record.is_expired_at(self.clock.now()) {
            return Ok(Zeroizing::new(record.token().to_owned()));
        }
        let observed_expiry = record.expires_at();
        drop(record);

        let _guard = self.lock.acquire()?;
        let expired_at = match self.load_newest()? {
            Some((_, current)) if !current.is_expired_at(self.clock.now()) => {
                tracing::debug!("token replaced by a concurrent login");
                return Ok(Zeroizing::new(current.token().to_owned()));
            }
            Some((_, current)) => current.expires_at(),
            None => observed_expiry,
        };

        tracing::info!(%expired_at, "session token expired, erasing");
        self.erase_all_locked()?;
        Err(VaultError::Expired { expired_at })
    }

    /// Inspect the cached token without returning it or erasing anything.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), except that missing and expired tokens are
    /// reported through [`TokenStatus`].
    pub fn status(&self) -> Result<TokenStatus> {
        let Some((_, record)) = self.load_newest()? else {
            return Ok(TokenStatus::Missing);
        };

        if record.is_expired_at(self.clock.now()) {
            Ok(TokenStatus::Expired {
                expired_at: record.expires_at(),
            })
        } else {
            Ok(TokenStatus::Valid {
                created_at: record.created_at(),
                expires_at: record.expires_at(),
            })
        }
    }

    /// Open every file of this identity and keep the newest readable record.
    ///
    /// If files exist but none can be opened, the first failure is returned.
    fn load_newest(&self) -> Result<Option<(PathBuf, TokenRecord)>> {
        let files = self.token_files()?;
        let mut newest: Option<(PathBuf, TokenRecord)> = None;
        let mut first_error = None;

        for path in files {
            let opened = std::fs::read(&path)
                .map_err(VaultError::from)
                .and_then(|content| TokenRecord::open(&self.key, &content));

            match opened {
                Ok(record) => {
                    let newer = newest
                        .as_ref()
                        .is_none_or(|(_, best)| record.created_at() > best.created_at());
                    if newer {
                        newest = Some((path, record));
                    }
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "could not open token file");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (newest, first_error) {
            (Some(found), _) => Ok(Some(found)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }

    // -- Clear --------------------------------------------------------------

    /// Securely erase this identity's cached token. Succeeds if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if a file cannot be overwritten or removed.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        self.erase_all_locked()
    }

    /// Erase every file of this identity. The caller holds the storage lock.
    fn erase_all_locked(&self) -> Result<()> {
        let files = self.token_files()?;
        if files.is_empty() {
            tracing::debug!("no session token to clear");
            return Ok(());
        }

        for path in &files {
            match self.eraser.erase(path) {
                Ok(()) => {}
                // Raced with another process that already removed it.
                Err(VaultError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        tracing::info!(files = files.len(), "cleared session token");
        Ok(())
    }

    // -- CLI-facing names ---------------------------------------------------

    /// Alias for [`put`](Self::put).
    pub fn store_token(&self, token: &str) -> Result<()> {
        self.put(token)
    }

    /// Alias for [`get`](Self::get).
    pub fn get_valid_token(&self) -> Result<Zeroizing<String>> {
        self.get()
    }

    /// Alias for [`clear`](Self::clear).
    pub fn clear_token(&self) -> Result<()> {
        self.clear()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("dir", &self.dir)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
