//! Integration tests for the passenger-vault crate.
//!
//! These drive the full put/get/clear lifecycle against a temporary
//! directory with a manually advanced clock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use passenger_vault::{Clock, ManualClock, TokenRecord, TokenStore, VaultError, crypto};
use ring::rand::SystemRandom;

struct Harness {
    dir: tempfile::TempDir,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            clock: Arc::new(ManualClock::new(Utc::now())),
        }
    }

    fn store(&self, identity: &str) -> TokenStore {
        TokenStore::new(
            self.dir.path(),
            identity,
            self.clock.clone(),
            Arc::new(SystemRandom::new()),
        )
        .unwrap()
    }

    fn only_file(&self, store: &TokenStore) -> PathBuf {
        let files = store.token_files().unwrap();
        assert_eq!(files.len(), 1, "expected exactly one token file");
        files.into_iter().next().unwrap()
    }
}

/// Reads a shared [`ManualClock`] and, once armed, runs a callback the
/// first time it is read. Used to interleave another store's work with an
/// operation in progress.
struct HookClock {
    inner: Arc<ManualClock>,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl HookClock {
    fn new(inner: Arc<ManualClock>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    fn arm(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Clock for HookClock {
    fn now(&self) -> DateTime<Utc> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.now()
    }
}

fn decoded(path: &Path) -> Vec<u8> {
    STANDARD.decode(std::fs::read(path).unwrap()).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn roundtrip_for_assorted_tokens() {
    let h = Harness::new();
    let store = h.store("alice");

    let long = "x".repeat(4096);
    for token in ["tok-abc123", "", "ünïcødé-🔑", "with \"quotes\" and \\slashes", long.as_str()] {
        store.put(token).unwrap();
        assert_eq!(store.get().unwrap().as_str(), token);
    }
}

#[test]
fn concrete_login_expire_scenario() {
    let h = Harness::new();
    let store = h.store("alice");

    store.put("tok-abc123").unwrap();
    assert_eq!(store.get().unwrap().as_str(), "tok-abc123");

    h.clock.advance(Duration::seconds(301));
    assert!(matches!(store.get(), Err(VaultError::Expired { .. })));
    assert!(matches!(store.get(), Err(VaultError::NotFound)));
}

#[test]
fn expiry_boundary() {
    let h = Harness::new();
    let store = h.store("alice");
    store.put("tok").unwrap();

    h.clock.advance(Duration::seconds(4 * 60 + 59));
    assert_eq!(store.get().unwrap().as_str(), "tok");

    h.clock.advance(Duration::seconds(2));
    match store.get() {
        Err(VaultError::Expired { expired_at }) => {
            assert!(expired_at < h.clock.now());
        }
        other => panic!("expected Expired, got {other:?}"),
    }
    assert!(store.token_files().unwrap().is_empty());
}

#[test]
fn expired_token_cannot_be_revived() {
    let h = Harness::new();
    let store = h.store("alice");
    store.put("tok").unwrap();

    h.clock.advance(Duration::minutes(10));
    assert!(store.get().is_err());

    // Rewinding the clock does not bring the erased token back.
    h.clock.advance(Duration::minutes(-10));
    assert!(matches!(store.get(), Err(VaultError::NotFound)));
}

#[test]
fn state_survives_a_new_store_instance() {
    let h = Harness::new();
    h.store("alice").put("tok-persisted").unwrap();

    // A later invocation constructs its own store over the same directory.
    let later = h.store("alice");
    assert_eq!(later.get().unwrap().as_str(), "tok-persisted");

    later.clear().unwrap();
    assert!(matches!(h.store("alice").get(), Err(VaultError::NotFound)));
}

// ═══════════════════════════════════════════════════════════════════════
//  Tamper resistance & isolation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn any_single_byte_flip_is_a_crypto_error() {
    let h = Harness::new();
    let store = h.store("alice");
    store.put("tok-abc123").unwrap();

    let path = h.only_file(&store);
    let original = decoded(&path);

    for i in 0..original.len() {
        let mut tampered = original.clone();
        tampered[i] ^= 0x80;
        std::fs::write(&path, STANDARD.encode(&tampered)).unwrap();

        match store.get() {
            Err(VaultError::Crypto { .. }) => {}
            Ok(token) => panic!("byte {i} flip returned token {:?}", token.as_str()),
            Err(other) => panic!("byte {i} flip returned {other:?}"),
        }
    }
}

#[test]
fn truncated_file_is_a_crypto_error() {
    let h = Harness::new();
    let store = h.store("alice");
    store.put("tok").unwrap();

    let path = h.only_file(&store);
    let original = decoded(&path);
    std::fs::write(&path, STANDARD.encode(&original[..5])).unwrap();

    assert!(matches!(store.get(), Err(VaultError::Crypto { .. })));
}

#[test]
fn identities_cannot_read_each_other() {
    let rng = SystemRandom::new();
    let alice = crypto::derive_key("alice");
    let bob = crypto::derive_key("bob");

    let sealed = TokenRecord::issue("alice-token", Utc::now())
        .seal(&alice, &rng)
        .unwrap();
    assert!(matches!(
        TokenRecord::open(&bob, sealed.as_bytes()),
        Err(VaultError::Crypto { .. })
    ));

    let sealed = TokenRecord::issue("bob-token", Utc::now())
        .seal(&bob, &rng)
        .unwrap();
    assert!(matches!(
        TokenRecord::open(&alice, sealed.as_bytes()),
        Err(VaultError::Crypto { .. })
    ));
}

#[test]
fn stores_sharing_a_directory_stay_separate() {
    let h = Harness::new();
    let alice = h.store("alice");
    let bob = h.store("bob");

    alice.put("alice-token").unwrap();
    bob.put("bob-token").unwrap();

    assert_eq!(alice.get().unwrap().as_str(), "alice-token");
    assert_eq!(bob.get().unwrap().as_str(), "bob-token");

    alice.clear().unwrap();
    assert!(matches!(alice.get(), Err(VaultError::NotFound)));
    assert_eq!(bob.get().unwrap().as_str(), "bob-token");
}

#[test]
fn renamed_foreign_file_fails_closed() {
    let h = Harness::new();
    let alice = h.store("alice");
    let bob = h.store("bob");
    bob.put("bob-token").unwrap();

    // Dress bob's file up as alice's.
    let bob_file = h.only_file(&bob);
    let fp = crypto::identity_fingerprint("alice");
    std::fs::rename(&bob_file, h.dir.path().join(format!("pass_{fp}_00000000.tmp"))).unwrap();

    assert!(matches!(alice.get(), Err(VaultError::Crypto { .. })));
}

// ═══════════════════════════════════════════════════════════════════════
//  Erasure
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn clear_overwrites_with_random_bytes_before_removal() {
    let h = Harness::new();
    let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let store = h
        .store("alice")
        .with_erase_inspector(Arc::new(move |_, bytes| {
            sink.lock().unwrap().push(bytes.to_vec());
        }));

    store.put("tok-abc123").unwrap();
    let path = h.only_file(&store);
    let ciphertext = std::fs::read(&path).unwrap();

    store.clear().unwrap();

    assert!(!path.exists());
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), ciphertext.len());
    assert_ne!(seen[0], ciphertext);
    // Overwrite is not the base64 alphabet any more.
    assert!(seen[0].iter().any(|b| !b.is_ascii_alphanumeric() && !b"+/=".contains(b)));
}

#[test]
fn expiry_detection_erases_through_inspector() {
    let h = Harness::new();
    let erased = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&erased);
    let store = h
        .store("alice")
        .with_erase_inspector(Arc::new(move |_, _| *counter.lock().unwrap() += 1));

    store.put("tok").unwrap();
    h.clock.advance(Duration::minutes(6));
    assert!(matches!(store.get(), Err(VaultError::Expired { .. })));

    assert_eq!(*erased.lock().unwrap(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Sweep
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn put_sweeps_stale_files_and_still_works() {
    let h = Harness::new();
    let rng = SystemRandom::new();

    // An already-expired, otherwise valid file from an earlier session that
    // the current naming would never pick up directly.
    let stale = TokenRecord::issue("old", h.clock.now() - Duration::minutes(30))
        .seal(&crypto::derive_key("alice"), &rng)
        .unwrap();
    let stale_path = h.dir.path().join("pass_ffffffff_12345678.tmp");
    std::fs::write(&stale_path, stale).unwrap();

    let store = h.store("alice");
    store.put("fresh").unwrap();

    assert!(!stale_path.exists());
    assert_eq!(store.get().unwrap().as_str(), "fresh");
}

#[test]
fn sweep_leaves_unexpired_foreign_and_garbage_files() {
    let h = Harness::new();
    let bob = h.store("bob");
    bob.put("bob-token").unwrap();
    let garbage = h.dir.path().join("pass_00000000_00000000.tmp");
    std::fs::write(&garbage, b"not even base64 ***").unwrap();

    // Even when bob's token is long expired, alice cannot decrypt it and so
    // must not touch it.
    h.clock.advance(Duration::hours(1));
    h.store("alice").put("alice-token").unwrap();

    assert!(garbage.exists());
    assert_eq!(bob.token_files().unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Storage directory & cross-store serialization
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn plain_file_as_storage_dir_is_a_config_error() {
    let h = Harness::new();
    let path = h.dir.path().join("not-a-dir");
    std::fs::write(&path, b"").unwrap();

    let result = TokenStore::new(&path, "alice", h.clock.clone(), Arc::new(SystemRandom::new()));
    assert!(matches!(result, Err(VaultError::Config { .. })));
}

#[cfg(unix)]
#[test]
fn symlinked_storage_dir_is_a_config_error() {
    let h = Harness::new();
    let target = h.dir.path().join("real");
    std::fs::create_dir(&target).unwrap();
    let link = h.dir.path().join("link");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let result = TokenStore::new(&link, "alice", h.clock.clone(), Arc::new(SystemRandom::new()));
    assert!(matches!(result, Err(VaultError::Config { .. })));
}

#[test]
fn expiry_erase_keeps_a_login_that_lands_concurrently() {
    let h = Harness::new();
    let hooked = Arc::new(HookClock::new(h.clock.clone()));
    let alice = TokenStore::new(
        h.dir.path(),
        "alice",
        hooked.clone(),
        Arc::new(SystemRandom::new()),
    )
    .unwrap();

    alice.put("old-login").unwrap();
    h.clock.advance(Duration::seconds(301));

    // A second process logs in right after this one read the expired file.
    let other = h.store("alice");
    hooked.arm(move || other.put("new-login").unwrap());

    assert_eq!(alice.get().unwrap().as_str(), "new-login");

    let later = h.store("alice");
    assert_eq!(later.get().unwrap().as_str(), "new-login");
    assert_eq!(later.token_files().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn put_waits_for_the_storage_lock() {
    use passenger_vault::lock::StorageLock;

    let h = Harness::new();
    let store = h.store("alice");
    let guard = StorageLock::new(h.dir.path()).acquire().unwrap();

    let writer = std::thread::spawn(move || {
        store.put("tok").unwrap();
        store
    });

    std::thread::sleep(std::time::Duration::from_millis(200));
    assert!(!writer.is_finished(), "put ran while another holder had the lock");

    drop(guard);
    let store = writer.join().unwrap();
    assert_eq!(store.get().unwrap().as_str(), "tok");
}
