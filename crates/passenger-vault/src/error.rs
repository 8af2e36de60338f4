//! Vault error types.
//!
//! Every public operation in this crate returns [`VaultError`]. The variants
//! map one-to-one onto the failure kinds the CLI needs to tell apart: a
//! missing token and an expired token are normal steady-state outcomes, not
//! faults, so callers match on them instead of inspecting strings.

use chrono::{DateTime, Utc};

/// Unified error type for the Passenger session-token vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No writable, private storage directory could be resolved.
    #[error("vault configuration error: {reason}")]
    Config { reason: String },

    /// Cipher setup failed, or the stored data could not be authenticated,
    /// decoded or parsed (wrong key, tampering, truncation).
    #[error("crypto error: {reason}")]
    Crypto { reason: String },

    /// No token file exists for the current user.
    #[error("no session token found")]
    NotFound,

    /// A token was present but past its time-to-live. The file has already
    /// been erased by the time this is returned.
    #[error("session token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// Filesystem failure while reading, writing, locking or deleting.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub(crate) fn crypto(reason: impl Into<String>) -> Self {
        Self::Crypto {
            reason: reason.into(),
        }
    }

    /// `true` for the outcomes that simply mean "log in again".
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::NotFound | Self::Expired { .. })
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
