//! Key derivation and AES-256-GCM token sealing using the `ring` crate.
//!
//! - **Key derivation**: SHA-256 over a fixed application salt followed by
//!   the local user identity. The key is recomputed on every run and never
//!   written anywhere, so there is nothing to manage or rotate.
//! - **Sealing**: AES-256-GCM with a fresh random 96-bit nonce per call. The
//!   sealed form is `nonce ‖ ciphertext ‖ tag`, ready to be base64-encoded.
//!
//! # Security Notes
//!
//! - The derived key only isolates users from each other; anyone able to run
//!   code as the same user can recompute it. The TTL and secure erase are what
//!   bound the exposure of a cached token.
//! - Decryption fails closed. A short, truncated or modified input never
//!   yields partial plaintext.

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::digest;
use ring::rand::SecureRandom;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Salt prepended to the identity before hashing it into a key. Changing
/// this makes every cached token unreadable.
const KEY_SALT: &str = "passenger-secret-";

/// Salt for the public filename fingerprint. Distinct from [`KEY_SALT`] so
/// the fingerprint reveals nothing about the key.
const FINGERPRINT_SALT: &str = "passenger-go-cli-";

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// A 256-bit symmetric key derived from a user identity. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derive the vault key for `identity`.
///
/// Deterministic: the same identity always yields the same key.
pub fn derive_key(identity: &str) -> DerivedKey {
    let mut material = Zeroizing::new(Vec::with_capacity(KEY_SALT.len() + identity.len()));
    material.extend_from_slice(KEY_SALT.as_bytes());
    material.extend_from_slice(identity.as_bytes());

    let hash = digest::digest(&digest::SHA256, &material);
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(hash.as_ref());

    tracing::trace!("derived vault key from user identity");
    DerivedKey(key)
}

/// Short hex fingerprint of `identity` used in token filenames.
///
/// Four bytes of SHA-256: enough to keep users on a shared `/tmp` apart,
/// too little to identify anyone.
pub fn identity_fingerprint(identity: &str) -> String {
    let mut material = String::with_capacity(FINGERPRINT_SALT.len() + identity.len());
    material.push_str(FINGERPRINT_SALT);
    material.push_str(identity);

    let hash = digest::digest(&digest::SHA256, material.as_bytes());
    to_hex(&hash.as_ref()[..4])
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// Yields exactly one nonce, then errors. Each sealing or opening key is
/// bound to a single message.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`, returning `nonce ‖ ciphertext ‖ tag`.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if nonce generation or cipher setup fails.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8], rng: &dyn SecureRandom) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| VaultError::crypto("failed to generate random nonce"))?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key.as_bytes())
        .map_err(|_| VaultError::crypto("failed to create AES-256-GCM key"))?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    // Room for the tag up front so appending it never reallocates and
    // leaves a plaintext copy behind in freed memory.
    let mut body = Vec::with_capacity(plaintext.len() + TAG_LEN);
    body.extend_from_slice(plaintext);
    if sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut body)
        .is_err()
    {
        body.zeroize();
        return Err(VaultError::crypto("seal_in_place failed"));
    }

    let mut sealed = Vec::with_capacity(NONCE_LEN_BYTES + body.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&body);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        sealed_len = sealed.len(),
        "sealed token record"
    );

    Ok(sealed)
}

/// Decrypt `nonce ‖ ciphertext ‖ tag` produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the input is shorter than a nonce plus
/// tag, the key is wrong, or any byte was modified.
pub fn decrypt(key: &DerivedKey, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN_BYTES {
        return Err(VaultError::crypto(format!(
            "sealed data too short: {} bytes, nonce alone is {NONCE_LEN_BYTES}",
            sealed.len()
        )));
    }
    if sealed.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(VaultError::crypto("sealed data truncated before tag"));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN_BYTES);
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let unbound_key = UnboundKey::new(AEAD_ALG, key.as_bytes())
        .map_err(|_| VaultError::crypto("failed to create AES-256-GCM key"))?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    // `in_out` holds plaintext after a successful open; wiped either way.
    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::crypto("authentication failed: wrong key or corrupted data"))?;

    Ok(Zeroizing::new(plaintext.to_vec()))
}

/// Fill a fresh buffer of `len` bytes from `rng`.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the randomness source fails.
pub fn random_bytes(rng: &dyn SecureRandom, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::crypto("failed to generate random bytes"))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
