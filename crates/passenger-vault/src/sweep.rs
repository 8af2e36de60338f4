//! Opportunistic cleanup of expired token files.
//!
//! Every `put` first sweeps the storage directory: each file following the
//! token naming convention is opened with the caller's key, and those whose
//! record has expired are securely erased. Files that cannot be read,
//! decoded or decrypted are left alone; they may belong to another identity
//! that shares the directory.
//!
//! A sweep never fails its caller. Problems are reported through `tracing`
//! and counted in the returned [`SweepReport`].

use std::path::Path;
use std::sync::Arc;

use crate::clock::Clock;
use crate::crypto::DerivedKey;
use crate::eraser::SecureEraser;
use crate::identity;
use crate::record::TokenRecord;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Token-named files examined.
    pub scanned: usize,
    /// Expired files erased.
    pub removed: usize,
    /// Files left in place because they could not be opened with our key or
    /// could not be erased.
    pub skipped: usize,
}

/// Removes expired token files readable with one identity's key.
pub struct ExpirySweeper {
    key: DerivedKey,
    clock: Arc<dyn Clock>,
    eraser: SecureEraser,
}

impl ExpirySweeper {
    pub fn new(key: DerivedKey, clock: Arc<dyn Clock>, eraser: SecureEraser) -> Self {
        Self { key, clock, eraser }
    }

    /// Scan `dir` and erase every expired token file we can decrypt.
    pub fn sweep(&self, dir: &Path) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "token sweep could not list directory");
                return report;
            }
        };

        let now = self.clock.now();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !identity::is_token_file(name) {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }

            report.scanned += 1;
            let path = entry.path();

            let record = match std::fs::read(&path)
                .map_err(crate::VaultError::from)
                .and_then(|content| TokenRecord::open(&self.key, &content))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(file = name, error = %e, "sweep skipped unreadable token file");
                    report.skipped += 1;
                    continue;
                }
            };

            if !record.is_expired_at(now) {
                continue;
            }
            drop(record);

            match self.eraser.erase(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(file = name, error = %e, "sweep failed to erase expired token file");
                    report.skipped += 1;
                }
            }
        }

        if report.removed > 0 || report.skipped > 0 {
            tracing::debug!(
                scanned = report.scanned,
                removed = report.removed,
                skipped = report.skipped,
                "token sweep finished"
            );
        }
        report
    }
}
