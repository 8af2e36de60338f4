//! The cached token record and its on-disk encoding.
//!
//! File content is `base64(nonce ‖ AES-256-GCM(json(record)))` using the
//! standard alphabet. The JSON is compact:
//!
//! ```text
//! {"token":"…","created_at":"2026-01-01T00:00:00Z","expires_at":"2026-01-01T00:05:00Z"}
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use ring::rand::SecureRandom;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{self, DerivedKey};
use crate::error::{Result, VaultError};

/// How long a cached token stays valid after login.
pub const TOKEN_TTL: Duration = Duration::minutes(5);

/// One cached login result. Never mutated after creation; the token text is
/// wiped when the record is dropped.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenRecord {
    token: String,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A new record issued at `now`, expiring [`TOKEN_TTL`] later.
    pub fn issue(token: &str, now: DateTime<Utc>) -> Self {
        Self {
            token: token.to_owned(),
            created_at: now,
            expires_at: now + TOKEN_TTL,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired strictly after `expires_at`; the boundary instant is valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Serialize, encrypt and base64-encode for writing to disk.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if serialization or sealing fails.
    pub fn seal(&self, key: &DerivedKey, rng: &dyn SecureRandom) -> Result<String> {
        let json = Zeroizing::new(
            serde_json::to_vec(self)
                .map_err(|e| VaultError::crypto(format!("failed to serialize token record: {e}")))?,
        );
        let sealed = crypto::encrypt(key, &json, rng)?;
        Ok(STANDARD.encode(sealed))
    }

    /// Decode, decrypt and parse file content written by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] for invalid base64, failed
    /// authentication, or a plaintext that is not a token record.
    pub fn open(key: &DerivedKey, encoded: &[u8]) -> Result<Self> {
        let sealed = STANDARD
            .decode(encoded.trim_ascii())
            .map_err(|e| VaultError::crypto(format!("token file is not valid base64: {e}")))?;
        let json = crypto::decrypt(key, &sealed)?;
        serde_json::from_slice(&json)
            .map_err(|e| VaultError::crypto(format!("decrypted token record is malformed: {e}")))
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("token", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
