//! Local user identity and on-disk layout.
//!
//! Token files live in a per-user private directory and are named
//! `pass_<fingerprint>_<random>.tmp`, where the fingerprint is derived from
//! the identity (see [`crypto::identity_fingerprint`]) and the random suffix
//! keeps names unpredictable. The fingerprint prefix is how a later process
//! finds its own user's file among others in a shared temp directory.

use std::path::{Path, PathBuf};

use crate::crypto;
use crate::error::{Result, VaultError};

/// Identity used when the local username cannot be resolved. All such users
/// share one key, so isolation degrades but the vault keeps working.
pub const FALLBACK_IDENTITY: &str = "passenger";

/// Filename prefix shared by every token file.
pub const FILE_PREFIX: &str = "pass_";

/// Filename suffix shared by every token file.
pub const FILE_SUFFIX: &str = ".tmp";

/// Number of random bytes in a filename suffix.
pub const SUFFIX_BYTES: usize = 4;

const DIR_PREFIX: &str = "passenger-";

/// Resolve the current user's identity.
///
/// The operating-system account wins. `USER`/`USERNAME` are consulted only
/// when the account database has no entry for the process, and
/// [`FALLBACK_IDENTITY`] after that.
pub fn current_user() -> String {
    resolve_user(os_account_name(), |name| std::env::var(name).ok())
}

/// Identity resolution from an account name and an arbitrary variable
/// lookup. Blank values are ignored at every step.
pub fn resolve_user(
    account: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    account
        .into_iter()
        .chain(["USER", "USERNAME"].into_iter().filter_map(|var| lookup(var)))
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| {
            tracing::debug!("local username unavailable, using fallback identity");
            FALLBACK_IDENTITY.to_owned()
        })
}

/// Login name of the real user id, from the account database.
#[cfg(unix)]
pub fn os_account_name() -> Option<String> {
    use std::ffi::CStr;

    const MAX_BUF: usize = 1 << 16;

    // SAFETY: getuid has no preconditions.
    let uid = unsafe { libc::getuid() };
    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    // SAFETY: passwd is a plain C struct; all-zero is a valid placeholder.
    let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::passwd = std::ptr::null_mut();

    loop {
        // SAFETY: every pointer is valid for the duration of the call and
        // `buf.len()` is the true buffer size.
        let rc = unsafe {
            libc::getpwuid_r(uid, &mut entry, buf.as_mut_ptr(), buf.len(), &mut found)
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || found.is_null() || entry.pw_name.is_null() {
            tracing::debug!(uid, rc, "no account entry for current uid");
            return None;
        }
        break;
    }

    // SAFETY: on success pw_name points to a NUL-terminated string inside
    // `buf`, which is still alive.
    let name = unsafe { CStr::from_ptr(entry.pw_name) };
    name.to_str().ok().map(str::to_owned)
}

#[cfg(not(unix))]
pub fn os_account_name() -> Option<String> {
    None
}

/// Directory name for `identity`, with anything unsafe in a path replaced.
fn dir_name(identity: &str) -> String {
    let safe: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{DIR_PREFIX}{safe}")
}

/// Resolve (and create) the private storage directory for `identity`.
///
/// On Unix this is `/tmp/passenger-<identity>`; if that cannot be used the
/// platform temp directory is tried next.
///
/// # Errors
///
/// Returns [`VaultError::Config`] if no candidate can be created with
/// owner-only permissions.
pub fn default_storage_dir(identity: &str) -> Result<PathBuf> {
    let name = dir_name(identity);
    let mut candidates = Vec::with_capacity(2);

    #[cfg(unix)]
    candidates.push(Path::new("/tmp").join(&name));

    let fallback = std::env::temp_dir().join(&name);
    if !candidates.contains(&fallback) {
        candidates.push(fallback);
    }

    let mut failures = Vec::new();
    for dir in candidates {
        match ensure_private_dir(&dir) {
            Ok(()) => {
                tracing::debug!(path = %dir.display(), "resolved token storage directory");
                return Ok(dir);
            }
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "storage directory unusable");
                failures.push(format!("{}: {e}", dir.display()));
            }
        }
    }

    Err(VaultError::Config {
        reason: format!("no private storage directory available ({})", failures.join("; ")),
    })
}

/// Create `dir` if needed and restrict it to its owner (mode 0700 on Unix).
///
/// A symlink in place of the directory is refused.
pub fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let meta = std::fs::symlink_metadata(dir)?;
    if !meta.is_dir() {
        return Err(std::io::Error::other(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Build a token filename from an identity fingerprint and random suffix.
pub fn token_file_name(fingerprint: &str, suffix: &[u8]) -> String {
    format!(
        "{FILE_PREFIX}{fingerprint}_{}{FILE_SUFFIX}",
        crypto::to_hex(suffix)
    )
}

/// Whether `name` follows the token file naming convention.
pub fn is_token_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
}

/// Whether `name` is a token file belonging to `fingerprint`.
pub fn is_owned_token_file(name: &str, fingerprint: &str) -> bool {
    is_token_file(name)
        && name[FILE_PREFIX.len()..]
            .strip_prefix(fingerprint)
            .is_some_and(|rest| rest.starts_with('_'))
}
